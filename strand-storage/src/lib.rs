//! Strand Storage
//!
//! The entry store: raw bundles, chain watermarks, container definitions
//! and the entry/exit/pointee indexes that answer point-in-time queries.
//!
//! Two backends implement [`EntryStore`]:
//! - [`RedbStore`]: a redb database on disk or in memory
//! - [`LogBackedStore`]: an append-only log replayed into an in-memory index

pub mod error;
pub mod keys;
pub mod log;
pub mod log_backed;
pub mod redb_store;
pub mod store;

pub use error::{BackendError, StoreError};
pub use log_backed::LogBackedStore;
pub use redb_store::RedbStore;
pub use store::EntryStore;

// Re-export for convenience; canonical home is strand_model::StorageConfig
pub use strand_model::StorageConfig;
