//! The instance: one writable chain, one ordering lock, many peers.
//!
//! Local commits and inbound peer messages are applied one at a time under
//! `processing`. Inside the lock the store write is the only blocking step;
//! peer sends are queued by the transport and never awaited.

use crate::bundler::Bundler;
use crate::changes::{self, ChangeKey, Payload};
use crate::error::{ConnectionId, InstanceError};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use strand_model::proto::ChangeProto;
use strand_model::{
    Address, Behavior, BundleInfo, ChainKey, Clock, Medallion, Muid, SystemClock, Timestamp, Value,
};
use strand_storage::EntryStore;
use strand_sync::{wait_for, ChainTracker, Peer, PeerLink, PeerMessage, SyncError};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Real medallions fall in `[2^48, 2^49)`.
const MEDALLION_RANGE: std::ops::Range<Medallion> = (1 << 48)..(1 << 49);
const DEFAULT_SOFTWARE: &str = "strand";
const EVENT_CAPACITY: usize = 256;

pub type Listener = Box<dyn Fn(&BundleInfo) + Send + Sync>;

/// Describes the instance in its chain's startup bundle.
#[derive(Clone)]
pub struct InstanceOptions {
    pub software: Option<String>,
    pub email: Option<String>,
    pub fullname: Option<String>,
    pub clock: Arc<dyn Clock>,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            software: None,
            email: None,
            fullname: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl InstanceOptions {
    pub fn with_software(mut self, software: impl Into<String>) -> Self {
        self.software = Some(software.into());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// State only touched while holding the ordering lock.
struct Processing {
    have: ChainTracker,
    peers: HashMap<ConnectionId, Peer>,
}

pub struct Instance {
    store: Arc<dyn EntryStore>,
    my_chain: ChainKey,
    processing: Mutex<Processing>,
    next_connection: AtomicU64,
    listeners: RwLock<Vec<Listener>>,
    events: broadcast::Sender<BundleInfo>,
    clock: Arc<dyn Clock>,
}

impl Instance {
    /// Resume the first chain this store has claimed, or start a new one.
    pub fn open(store: Arc<dyn EntryStore>, options: InstanceOptions) -> Result<Self, InstanceError> {
        let my_chain = match store.get_claimed_chains()?.first() {
            Some(chain) => {
                info!(chain = %chain, "resuming claimed chain");
                *chain
            }
            None => start_chain(store.as_ref(), &options)?,
        };
        let have = store.get_chain_tracker()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            store,
            my_chain,
            processing: Mutex::new(Processing { have, peers: HashMap::new() }),
            next_connection: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
            events,
            clock: options.clock,
        })
    }

    pub fn my_chain(&self) -> ChainKey {
        self.my_chain
    }

    pub fn medallion(&self) -> Medallion {
        self.my_chain.medallion
    }

    pub fn store(&self) -> &Arc<dyn EntryStore> {
        &self.store
    }

    /// Seal `bundler` onto this instance's chain and apply it.
    pub async fn add_bundler(&self, bundler: &mut Bundler) -> Result<BundleInfo, InstanceError> {
        let mut state = self.processing.lock().await;
        let seen = self
            .store
            .get_seen_through(self.my_chain)?
            .ok_or(InstanceError::NotReady)?;
        let now = self.clock.now_micros();
        let timestamp = if seen >= now { seen + 1 } else { now };
        let info = bundler.seal(BundleInfo {
            medallion: self.my_chain.medallion,
            chain_start: self.my_chain.chain_start,
            timestamp,
            prior_time: Some(seen),
            comment: None,
        })?;
        self.receive_bundle(&mut state, bundler.bytes()?, None)?;
        Ok(info)
    }

    /// Add `change` to `bundler`, or commit it on its own when there is none.
    pub async fn add_change(
        &self,
        change: ChangeProto,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        match bundler {
            Some(bundler) => Ok(bundler.add_change(change)?),
            None => {
                let mut bundler = Bundler::new();
                let address = bundler.add_change(change)?;
                self.add_bundler(&mut bundler).await?;
                Ok(bundler.resolve(address)?.into())
            }
        }
    }

    /// Apply sealed bundle bytes from a local source other than a peer.
    pub async fn receive_commit(&self, bytes: &[u8]) -> Result<(BundleInfo, bool), InstanceError> {
        let mut state = self.processing.lock().await;
        self.receive_bundle(&mut state, bytes, None)
    }

    fn receive_bundle(
        &self,
        state: &mut MutexGuard<'_, Processing>,
        bytes: &[u8],
        from: Option<ConnectionId>,
    ) -> Result<(BundleInfo, bool), InstanceError> {
        let (info, novel) = self.store.add_bundle(bytes)?;
        state.have.mark_seen(&info);
        if let Some(peer) = from.and_then(|id| state.peers.get_mut(&id)) {
            peer.mark_acked(&info);
            peer.send_ack(&info);
        }
        if !novel {
            debug!(bundle = %info, "bundle already applied");
            return Ok((info, false));
        }
        for (id, peer) in state.peers.iter_mut() {
            if Some(*id) == from {
                continue;
            }
            if let Err(e) = peer.send_if_needed(bytes, &info) {
                debug!(connection = id, error = %e, "not forwarding bundle");
            }
        }
        self.notify(&info);
        Ok((info, true))
    }

    fn notify(&self, info: &BundleInfo) {
        match self.listeners.read() {
            Ok(listeners) => listeners.iter().for_each(|listener| listener(info)),
            Err(_) => warn!("listener lock poisoned"),
        }
        // No subscribers is fine.
        let _ = self.events.send(info.clone());
    }

    /// Called with every newly applied bundle, local or remote. Listeners
    /// run under the ordering lock and must not block.
    pub fn add_listener(
        &self,
        listener: impl Fn(&BundleInfo) + Send + Sync + 'static,
    ) -> Result<(), InstanceError> {
        self.listeners
            .write()
            .map_err(|_| InstanceError::LockPoisoned)?
            .push(Box::new(listener));
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BundleInfo> {
        self.events.subscribe()
    }

    /// Register a transport connection. Our greeting is sent right away.
    pub async fn on_connection(&self, link: Arc<dyn PeerLink>) -> ConnectionId {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let mut state = self.processing.lock().await;
        let peer = Peer::new(link);
        peer.send_greeting(&state.have);
        state.peers.insert(id, peer);
        debug!(connection = id, "peer connected");
        id
    }

    /// Handle one framed message from a peer. Any failure closes and
    /// forgets that peer; the instance itself carries on.
    pub async fn on_message(&self, id: ConnectionId, bytes: &[u8]) -> Result<(), InstanceError> {
        let mut state = self.processing.lock().await;
        if !state.peers.contains_key(&id) {
            return Err(InstanceError::UnknownPeer(id));
        }
        let result = self.handle_message(&mut state, id, bytes);
        if let Err(e) = &result {
            warn!(connection = id, error = %e, "closing peer");
            if let Some(mut peer) = state.peers.remove(&id) {
                peer.close();
            }
        }
        result
    }

    fn handle_message(
        &self,
        state: &mut MutexGuard<'_, Processing>,
        id: ConnectionId,
        bytes: &[u8],
    ) -> Result<(), InstanceError> {
        match PeerMessage::decode(bytes)? {
            PeerMessage::Bundle(bundle) => {
                if !state.peers.get(&id).is_some_and(Peer::is_ready) {
                    return Err(SyncError::BundleBeforeGreeting.into());
                }
                self.receive_bundle(state, &bundle, Some(id))?;
            }
            PeerMessage::Greeting(greeting) => {
                let peer = state.peers.get_mut(&id).ok_or(InstanceError::UnknownPeer(id))?;
                peer.receive_greeting(ChainTracker::from_greeting(&greeting))?;
                let mut sent = 0usize;
                self.store.get_commits(&mut |bundle: &[u8], info: &BundleInfo| {
                    match peer.send_if_needed(bundle, info) {
                        Ok(true) => sent += 1,
                        Ok(false) => {}
                        Err(e) => debug!(connection = id, error = %e, "skipping backlog bundle"),
                    }
                })?;
                debug!(connection = id, sent, "sent backlog");
            }
            PeerMessage::Ack(ack) => {
                if let Some(peer) = state.peers.get_mut(&id) {
                    peer.mark_acked(&BundleInfo {
                        medallion: ack.medallion,
                        chain_start: ack.chain_start,
                        timestamp: ack.timestamp,
                        prior_time: None,
                        comment: None,
                    });
                }
            }
        }
        Ok(())
    }

    /// The transport for `id` went away.
    pub async fn on_close(&self, id: ConnectionId) {
        if let Some(mut peer) = self.processing.lock().await.peers.remove(&id) {
            peer.close();
            debug!(connection = id, "peer disconnected");
        }
    }

    pub async fn peer_count(&self) -> usize {
        self.processing.lock().await.peers.len()
    }

    /// Watermark snapshot of everything applied so far.
    pub async fn chain_tracker(&self) -> ChainTracker {
        let state = self.processing.lock().await;
        let mut copy = ChainTracker::new();
        for chain in state.have.get_chains(None) {
            if let Some(info) = state.have.get_watermark(chain) {
                copy.mark_seen(info);
            }
        }
        copy
    }

    /// Resolve once a bundle covering `(medallion, timestamp)` is applied.
    pub async fn wait_till_has(
        &self,
        medallion: Medallion,
        timestamp: Timestamp,
        timeout: Option<Duration>,
    ) -> Result<(), InstanceError> {
        let rx = self.processing.lock().await.have.wait_till_has(medallion, timestamp);
        Ok(wait_for(rx, timeout).await?)
    }

    /// Close every peer connection.
    pub async fn close(&self) {
        let mut state = self.processing.lock().await;
        for (_, mut peer) in state.peers.drain() {
            peer.close();
        }
    }
}

/// Write the self-describing first bundle of a fresh chain and claim it.
fn start_chain(store: &dyn EntryStore, options: &InstanceOptions) -> Result<ChainKey, InstanceError> {
    let medallion = rand::thread_rng().gen_range(MEDALLION_RANGE);
    let chain_start = options.clock.now_micros();
    let software = options.software.as_deref().unwrap_or(DEFAULT_SOFTWARE);
    let mut bundler = Bundler::with_comment(format!("start: {software}")).with_medallion(medallion);

    let about = Address::from(Muid::medallion_container(medallion, Behavior::Directory));
    for (key, value) in [
        ("email", &options.email),
        ("fullname", &options.fullname),
        ("software", &options.software),
    ] {
        if let Some(value) = value {
            bundler.add_change(changes::entry(
                Behavior::Directory,
                about,
                ChangeKey::User(key.into()),
                Payload::Value(Value::from(value.as_str())),
            )?)?;
        }
    }
    bundler.seal(BundleInfo {
        medallion,
        chain_start,
        timestamp: chain_start,
        prior_time: None,
        comment: None,
    })?;
    store.add_bundle(bundler.bytes()?)?;

    let chain = ChainKey::new(medallion, chain_start);
    store.claim_chain(chain)?;
    info!(chain = %chain, software, "started new chain");
    Ok(chain)
}
