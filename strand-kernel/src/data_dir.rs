//! Data directory layout
//!
//! - `state.redb`: redb entry store
//! - `strand.log`: append-only bundle log for the log-backed store

use std::path::{Path, PathBuf};
use std::sync::Arc;
use strand_model::StorageConfig;
use strand_storage::{EntryStore, LogBackedStore, RedbStore, StoreError};

const APP_NAME: &str = "strand";

/// Which entry store implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Redb,
    /// Append-only log replayed into an in-memory index at open.
    Log,
    Memory,
}

#[derive(Debug, Clone)]
pub struct DataDir {
    base: PathBuf,
}

impl DataDir {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Platform data directory, e.g. `~/.local/share/strand/` on Linux.
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|d| Self::new(d.join(APP_NAME)))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn state_db(&self) -> PathBuf {
        self.base.join("state.redb")
    }

    pub fn log_file(&self) -> PathBuf {
        self.base.join("strand.log")
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::File(self.state_db())
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)
    }

    /// Open the chosen backend, creating the directory first if it
    /// needs one.
    pub fn open_store(&self, backend: Backend) -> Result<Arc<dyn EntryStore>, StoreError> {
        Ok(match backend {
            Backend::Redb => {
                self.ensure_dirs()?;
                Arc::new(RedbStore::open(&self.storage_config())?)
            }
            Backend::Log => Arc::new(LogBackedStore::open(self.log_file())?),
            Backend::Memory => Arc::new(RedbStore::in_memory()?),
        })
    }
}

impl Default for DataDir {
    fn default() -> Self {
        Self::default_location().unwrap_or_else(|| Self::new("./data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_path() {
        let dd = DataDir::new("/custom/path");
        assert_eq!(dd.base(), Path::new("/custom/path"));
        assert_eq!(dd.state_db(), PathBuf::from("/custom/path/state.redb"));
        assert_eq!(dd.log_file(), PathBuf::from("/custom/path/strand.log"));
        assert_eq!(
            dd.storage_config(),
            StorageConfig::File(PathBuf::from("/custom/path/state.redb"))
        );
    }

    #[test]
    fn test_default_impl() {
        let dd = DataDir::default();
        assert!(dd.base().to_str().is_some());
    }

    #[test]
    fn test_open_store_creates_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dd = DataDir::new(tmp.path().join("nested"));
        let store = dd.open_store(Backend::Redb).unwrap();
        assert!(store.get_claimed_chains().unwrap().is_empty());
        assert!(dd.state_db().exists());
        drop(store);

        let log = dd.open_store(Backend::Log).unwrap();
        assert!(log.get_claimed_chains().unwrap().is_empty());
        assert!(dd.log_file().exists());
    }
}
