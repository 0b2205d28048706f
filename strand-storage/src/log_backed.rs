//! Append-only log backed store
//!
//! Keeps the query index in an in-memory `RedbStore` and persists every
//! novel bundle and chain claim to a single log file. Opening the store
//! replays the file from the start, which reproduces the index exactly.
//! A record cut short by a crash at the end of the file is dropped on open.

use crate::error::StoreError;
use crate::log::{append_fragment, LogReader};
use crate::redb_store::RedbStore;
use crate::store::EntryStore;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use strand_model::proto::{ClaimedChain, LogFragment};
use strand_model::{AsOf, Behavior, BundleInfo, ChainKey, Entry, EntryKey, Muid, Timestamp};
use strand_sync::ChainTracker;
use tracing::{error, info, warn};

pub struct LogBackedStore {
    index: RedbStore,
    /// Held for the lifetime of the store; also carries the exclusive lock.
    file: Mutex<File>,
    path: PathBuf,
    bundles_replayed: usize,
}

impl LogBackedStore {
    /// Open (creating if needed) the log at `path`, taking an exclusive
    /// advisory lock. Fails with `StoreLocked` if another process holds it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::StoreLocked(path));
        }

        let index = RedbStore::in_memory()?;
        let mut bundles_replayed = 0;
        file.seek(SeekFrom::Start(0))?;
        let mut torn_at = None;
        let mut reader = LogReader::new(&file);
        while let Some(fragment) = reader.next() {
            let fragment = match fragment {
                Ok(fragment) => fragment,
                Err(StoreError::UnexpectedEof) => {
                    torn_at = Some(reader.position());
                    break;
                }
                Err(e) => return Err(e),
            };
            for bundle in &fragment.bundles {
                index.add_bundle(bundle)?;
                bundles_replayed += 1;
            }
            for claim in &fragment.claims {
                index.claim_chain(ChainKey::new(claim.medallion, claim.chain_start))?;
            }
        }
        if let Some(len) = torn_at {
            warn!(path = %path.display(), offset = len, "dropping torn record at end of log");
            truncate_to(&file, len)?;
        }
        info!(path = %path.display(), bundles = bundles_replayed, "replayed log");

        Ok(Self {
            index,
            file: Mutex::new(file),
            path,
            bundles_replayed,
        })
    }

    /// Bundles applied while replaying the log at open.
    pub fn bundles_replayed(&self) -> usize {
        self.bundles_replayed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop a partial record after a failed append. If even that fails the
    /// tail is left for the next open to discard.
    fn rollback(&self, file: &File, len: u64) {
        if let Err(e) = truncate_to(file, len) {
            error!(path = %self.path.display(), error = %e, "failed to drop partial log record");
        }
    }

    fn file(&self) -> Result<MutexGuard<'_, File>, StoreError> {
        self.file
            .lock()
            .map_err(|_| StoreError::Corrupt("log writer poisoned".into()))
    }
}

/// Cut the log back to `len`, dropping whatever a failed append left.
fn truncate_to(file: &File, len: u64) -> Result<(), StoreError> {
    if file.metadata()?.len() != len {
        file.set_len(len)?;
        file.sync_all()?;
    }
    Ok(())
}

impl Drop for LogBackedStore {
    fn drop(&mut self) {
        if let Ok(file) = self.file.get_mut() {
            let _ = FileExt::unlock(&*file);
        }
    }
}

impl EntryStore for LogBackedStore {
    fn add_bundle(&self, bytes: &[u8]) -> Result<(BundleInfo, bool), StoreError> {
        // Hold the writer so the log order matches application order. The
        // index commits only once the record is on disk.
        let mut file = self.file()?;
        let len = file.metadata()?.len();
        let result = self.index.add_bundle_with(bytes, &mut |_: &BundleInfo| {
            let fragment = LogFragment {
                bundles: vec![bytes.to_vec()],
                claims: Vec::new(),
            };
            append_fragment(&mut file, &fragment)
        });
        if result.is_err() {
            self.rollback(&file, len);
        }
        result
    }

    fn get_entry(&self, container: Muid, key: &EntryKey, as_of: Option<AsOf>) -> Result<Option<Entry>, StoreError> {
        self.index.get_entry(container, key, as_of)
    }

    fn get_keyed_entries(&self, container: Muid, as_of: Option<AsOf>) -> Result<BTreeMap<EntryKey, Entry>, StoreError> {
        self.index.get_keyed_entries(container, as_of)
    }

    fn get_ordered_entries(
        &self,
        container: Muid,
        through: Option<i64>,
        as_of: Option<AsOf>,
    ) -> Result<Vec<Entry>, StoreError> {
        self.index.get_ordered_entries(container, through, as_of)
    }

    fn get_back_refs(&self, target: Muid, as_of: Option<AsOf>) -> Result<Vec<Entry>, StoreError> {
        self.index.get_back_refs(target, as_of)
    }

    fn get_container_bytes(&self, address: Muid) -> Result<Option<Vec<u8>>, StoreError> {
        self.index.get_container_bytes(address)
    }

    fn container_behavior(&self, address: Muid) -> Result<Option<Behavior>, StoreError> {
        self.index.container_behavior(address)
    }

    fn claim_chain(&self, chain: ChainKey) -> Result<(), StoreError> {
        let mut file = self.file()?;
        let len = file.metadata()?.len();
        let result = self.index.claim_chain_with(chain, &mut || {
            let fragment = LogFragment {
                bundles: Vec::new(),
                claims: vec![ClaimedChain {
                    medallion: chain.medallion,
                    chain_start: chain.chain_start,
                }],
            };
            append_fragment(&mut file, &fragment)
        });
        if result.is_err() {
            self.rollback(&file, len);
        }
        result
    }

    fn get_claimed_chains(&self) -> Result<Vec<ChainKey>, StoreError> {
        self.index.get_claimed_chains()
    }

    fn get_seen_through(&self, chain: ChainKey) -> Result<Option<Timestamp>, StoreError> {
        self.index.get_seen_through(chain)
    }

    fn get_chain_tracker(&self) -> Result<ChainTracker, StoreError> {
        self.index.get_chain_tracker()
    }

    fn get_commits(&self, visit: &mut dyn FnMut(&[u8], &BundleInfo)) -> Result<(), StoreError> {
        self.index.get_commits(visit)
    }
}
