//! Per-chain watermarks
//!
//! A `ChainTracker` records, for every chain an instance (ours or a peer's)
//! knows about, the most recent bundle seen. Its contents are exactly what
//! a Greeting carries.

use crate::error::SyncError;
use prost::Message;
use std::collections::BTreeMap;
use std::time::Duration;
use strand_model::proto::{Greeting, GreetingEntry};
use strand_model::{BundleInfo, ChainKey, ChainStart, Medallion, Timestamp};
use tokio::sync::oneshot;

struct Waiter {
    medallion: Medallion,
    timestamp: Timestamp,
    notify: oneshot::Sender<()>,
}

/// Watermark per `(medallion, chainStart)` plus pending "wait until seen"
/// registrations.
#[derive(Default)]
pub struct ChainTracker {
    chains: BTreeMap<Medallion, BTreeMap<ChainStart, BundleInfo>>,
    waiters: Vec<Waiter>,
}

impl ChainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker from a peer's greeting. Greetings carry no prior
    /// times, so the resulting watermarks only have timestamps.
    pub fn from_greeting(greeting: &Greeting) -> Self {
        let mut tracker = Self::new();
        for entry in &greeting.entries {
            tracker.chains.entry(entry.medallion).or_default().insert(
                entry.chain_start,
                BundleInfo {
                    medallion: entry.medallion,
                    chain_start: entry.chain_start,
                    timestamp: entry.seen_through,
                    prior_time: None,
                    comment: None,
                },
            );
        }
        tracker
    }

    pub fn from_greeting_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        Ok(Self::from_greeting(&Greeting::decode(bytes)?))
    }

    pub fn to_greeting(&self) -> Greeting {
        let entries = self
            .chains
            .values()
            .flat_map(|inner| inner.values())
            .map(|info| GreetingEntry {
                medallion: info.medallion,
                chain_start: info.chain_start,
                seen_through: info.timestamp,
            })
            .collect();
        Greeting { entries }
    }

    pub fn to_greeting_bytes(&self) -> Vec<u8> {
        self.to_greeting().encode_to_vec()
    }

    /// Record `info` if it is newer than what is known for its chain.
    ///
    /// Returns `Ok(true)` when the watermark advanced. With
    /// `check_valid_extension`, refuses bundles that would leave a gap.
    pub fn mark_as_having(
        &mut self,
        info: &BundleInfo,
        check_valid_extension: bool,
    ) -> Result<bool, SyncError> {
        let seen_through = self.get_watermark(info.chain()).map(|w| w.timestamp);
        if info.timestamp <= seen_through.unwrap_or(0) {
            return Ok(false);
        }
        if check_valid_extension {
            let initial_ok = info.timestamp == info.chain_start || info.prior_time.is_some();
            if !initial_ok || info.prior_time != seen_through {
                return Err(SyncError::InvalidChainExtension {
                    chain: info.chain(),
                    seen_through,
                    timestamp: info.timestamp,
                    prior_time: info.prior_time,
                });
            }
        }
        Ok(self.mark_seen(info))
    }

    /// Unchecked variant of [`ChainTracker::mark_as_having`], for
    /// watermarks that come from a trusted source (our own store, acks).
    pub fn mark_seen(&mut self, info: &BundleInfo) -> bool {
        let inner = self.chains.entry(info.medallion).or_default();
        if let Some(existing) = inner.get(&info.chain_start) {
            if info.timestamp <= existing.timestamp {
                return false;
            }
        }
        inner.insert(info.chain_start, info.clone());
        self.notify_waiters(info);
        true
    }

    fn notify_waiters(&mut self, info: &BundleInfo) {
        let mut remaining = Vec::with_capacity(self.waiters.len());
        for waiter in self.waiters.drain(..) {
            let covered = waiter.medallion == info.medallion
                && waiter.timestamp >= info.chain_start
                && waiter.timestamp <= info.timestamp;
            if covered {
                let _ = waiter.notify.send(());
            } else if !waiter.notify.is_closed() {
                remaining.push(waiter);
            }
        }
        self.waiters = remaining;
    }

    /// True if some chain of `medallion` has been seen at or past `timestamp`.
    pub fn has(&self, medallion: Medallion, timestamp: Timestamp) -> bool {
        self.chains.get(&medallion).is_some_and(|inner| {
            inner
                .iter()
                .any(|(start, info)| *start <= timestamp && info.timestamp >= timestamp)
        })
    }

    /// Register interest in `(medallion, timestamp)`. The receiver fires
    /// once a covering bundle is marked (immediately if it already has been).
    /// Dropping the receiver deregisters.
    pub fn wait_till_has(&mut self, medallion: Medallion, timestamp: Timestamp) -> oneshot::Receiver<()> {
        let (notify, rx) = oneshot::channel();
        if self.has(medallion, timestamp) {
            let _ = notify.send(());
        } else {
            self.waiters.push(Waiter { medallion, timestamp, notify });
        }
        rx
    }

    /// Latest bundle seen for a chain.
    pub fn get_watermark(&self, chain: ChainKey) -> Option<&BundleInfo> {
        self.chains.get(&chain.medallion)?.get(&chain.chain_start)
    }

    /// Known chains, optionally restricted to one medallion.
    pub fn get_chains(&self, medallion: Option<Medallion>) -> Vec<ChainKey> {
        self.chains
            .iter()
            .filter(|(m, _)| medallion.map_or(true, |only| only == **m))
            .flat_map(|(m, inner)| inner.keys().map(move |start| ChainKey::new(*m, *start)))
            .collect()
    }

    pub fn pending_waiters(&self) -> usize {
        self.waiters.len()
    }
}

impl PartialEq for ChainTracker {
    fn eq(&self, other: &Self) -> bool {
        let seen = |t: &Self| -> Vec<(ChainKey, Timestamp)> {
            t.chains
                .values()
                .flat_map(|inner| inner.values())
                .map(|info| (info.chain(), info.timestamp))
                .collect()
        };
        seen(self) == seen(other)
    }
}

impl std::fmt::Debug for ChainTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainTracker")
            .field("chains", &self.get_chains(None))
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

/// Await a registration from [`ChainTracker::wait_till_has`], optionally
/// giving up after `timeout`.
pub async fn wait_for(rx: oneshot::Receiver<()>, timeout: Option<Duration>) -> Result<(), SyncError> {
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, rx)
            .await
            .map_err(|_| SyncError::Timeout)?,
        None => rx.await,
    };
    // A dropped sender means the tracker went away first.
    result.map_err(|_| SyncError::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDALLION: Medallion = 425579549941797;
    const START: ChainStart = 1643351021040000;

    fn info(timestamp: Timestamp, prior_time: Option<Timestamp>) -> BundleInfo {
        BundleInfo {
            medallion: MEDALLION,
            chain_start: START,
            timestamp,
            prior_time,
            comment: None,
        }
    }

    #[test]
    fn test_mark_as_having_reports_novelty() {
        let mut tracker = ChainTracker::new();
        assert!(tracker.mark_as_having(&info(START, None), true).unwrap());
        assert!(!tracker.mark_as_having(&info(START, None), true).unwrap());
        assert!(tracker.mark_as_having(&info(START + 1000, Some(START)), true).unwrap());
        assert_eq!(tracker.get_watermark(ChainKey::new(MEDALLION, START)).unwrap().timestamp, START + 1000);
    }

    #[test]
    fn test_gap_is_invalid_extension() {
        let mut tracker = ChainTracker::new();
        tracker.mark_as_having(&info(START, None), true).unwrap();
        tracker.mark_as_having(&info(START + 1000, Some(START)), true).unwrap();
        let err = tracker.mark_as_having(&info(START + 2000, Some(START)), true);
        assert!(matches!(err, Err(SyncError::InvalidChainExtension { .. })));

        // Unchecked marking accepts the jump.
        assert!(tracker.mark_as_having(&info(START + 2000, Some(START)), false).unwrap());
    }

    #[test]
    fn test_non_initial_bundle_without_prior_is_invalid() {
        let mut tracker = ChainTracker::new();
        let err = tracker.mark_as_having(&info(START + 5, None), true);
        assert!(matches!(err, Err(SyncError::InvalidChainExtension { .. })));
        let err = tracker.mark_as_having(&info(START + 5, Some(START)), true);
        assert!(matches!(err, Err(SyncError::InvalidChainExtension { .. })));
    }

    #[test]
    fn test_greeting_round_trip() {
        let mut tracker = ChainTracker::new();
        tracker.mark_as_having(&info(START, None), false).unwrap();
        tracker
            .mark_as_having(
                &BundleInfo {
                    medallion: 7,
                    chain_start: 100,
                    timestamp: 300,
                    prior_time: Some(200),
                    comment: None,
                },
                false,
            )
            .unwrap();

        let copy = ChainTracker::from_greeting_bytes(&tracker.to_greeting_bytes()).unwrap();
        assert_eq!(copy, tracker);
        assert_eq!(copy.get_watermark(ChainKey::new(7, 100)).unwrap().timestamp, 300);
        assert_eq!(copy.get_chains(None).len(), 2);
        assert_eq!(copy.get_chains(Some(7)), vec![ChainKey::new(7, 100)]);
    }

    #[tokio::test]
    async fn test_waiter_resolves_when_marked() {
        let mut tracker = ChainTracker::new();
        let rx = tracker.wait_till_has(MEDALLION, START + 1000);
        assert_eq!(tracker.pending_waiters(), 1);
        tracker.mark_as_having(&info(START, None), true).unwrap();
        assert_eq!(tracker.pending_waiters(), 1);
        tracker.mark_as_having(&info(START + 1000, Some(START)), true).unwrap();
        assert_eq!(tracker.pending_waiters(), 0);
        wait_for(rx, Some(Duration::from_millis(10))).await.unwrap();
    }

    #[tokio::test]
    async fn test_waiter_already_satisfied() {
        let mut tracker = ChainTracker::new();
        tracker.mark_as_having(&info(START, None), true).unwrap();
        let rx = tracker.wait_till_has(MEDALLION, START);
        wait_for(rx, None).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_times_out_and_is_pruned() {
        let mut tracker = ChainTracker::new();
        let rx = tracker.wait_till_has(MEDALLION, START);
        let result = wait_for(rx, Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(SyncError::Timeout)));

        let other = BundleInfo { medallion: 1, ..info(START, None) };
        tracker.mark_as_having(&other, false).unwrap();
        assert_eq!(tracker.pending_waiters(), 0);
    }
}
