//! The entry store interface shared by every backend.

use crate::error::StoreError;
use std::collections::BTreeMap;
use strand_model::{AsOf, Behavior, BundleInfo, ChainKey, Entry, EntryKey, Muid, Timestamp};
use strand_sync::ChainTracker;

/// Durable, queryable storage of bundles and the entries they produce.
///
/// Every method is synchronous; a bundle is applied in one transaction so
/// partial application is never observable.
pub trait EntryStore: Send + Sync {
    /// Apply a sealed bundle. Returns its header and whether it was new.
    /// Replaying a bundle at or below the chain's watermark changes nothing.
    fn add_bundle(&self, bytes: &[u8]) -> Result<(BundleInfo, bool), StoreError>;

    /// Live entry occupying `key` in `container` at the cutoff.
    fn get_entry(
        &self,
        container: Muid,
        key: &EntryKey,
        as_of: Option<AsOf>,
    ) -> Result<Option<Entry>, StoreError>;

    /// Every live slot of a keyed container at the cutoff.
    fn get_keyed_entries(
        &self,
        container: Muid,
        as_of: Option<AsOf>,
    ) -> Result<BTreeMap<EntryKey, Entry>, StoreError>;

    /// Live sequence entries in insertion order. `through >= 0` keeps
    /// indices `0..=through`, `through < 0` keeps the last `|through|`.
    fn get_ordered_entries(
        &self,
        container: Muid,
        through: Option<i64>,
        as_of: Option<AsOf>,
    ) -> Result<Vec<Entry>, StoreError>;

    /// Entries, in any container, that point at `target` and are still
    /// live at the cutoff.
    fn get_back_refs(&self, target: Muid, as_of: Option<AsOf>) -> Result<Vec<Entry>, StoreError>;

    /// Encoded container definition, if the container was created by a bundle.
    fn get_container_bytes(&self, address: Muid) -> Result<Option<Vec<u8>>, StoreError>;

    /// Behavior of a magic or stored container.
    fn container_behavior(&self, address: Muid) -> Result<Option<Behavior>, StoreError>;

    /// Record that this instance writes to `chain`.
    fn claim_chain(&self, chain: ChainKey) -> Result<(), StoreError>;

    /// Claimed chains, oldest claim first.
    fn get_claimed_chains(&self) -> Result<Vec<ChainKey>, StoreError>;

    fn get_seen_through(&self, chain: ChainKey) -> Result<Option<Timestamp>, StoreError>;

    /// Watermarks of every chain the store has applied.
    fn get_chain_tracker(&self) -> Result<ChainTracker, StoreError>;

    /// Visit every stored bundle in `(timestamp, medallion)` order.
    fn get_commits(&self, visit: &mut dyn FnMut(&[u8], &BundleInfo)) -> Result<(), StoreError>;
}
