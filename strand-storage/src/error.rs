use std::path::PathBuf;
use strand_model::{ChainKey, CodecError, Timestamp};
use thiserror::Error;

/// Failures of the underlying database or file.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("bundle {timestamp} (prior {prior_time:?}) does not extend {chain} seen through {seen_through}")]
    InvalidChainExtension {
        chain: ChainKey,
        seen_through: Timestamp,
        timestamp: Timestamp,
        prior_time: Option<Timestamp>,
    },

    #[error("bundle {timestamp} (prior {prior_time:?}) arrived before the start of {chain}")]
    MissingPriorLink {
        chain: ChainKey,
        timestamp: Timestamp,
        prior_time: Option<Timestamp>,
    },

    #[error("store at {0} is locked by another process")]
    StoreLocked(PathBuf),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] BackendError),

    #[error("only {available} bundles stored, cannot go back {requested}")]
    AsOfOutOfRange { requested: u32, available: u32 },

    #[error("unsupported change: {0}")]
    UnsupportedChange(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Fragment too large: {0} bytes")]
    FragmentTooLarge(usize),

    #[error("Unexpected EOF while reading log")]
    UnexpectedEof,

    #[error("Hash mismatch: stored hash does not match computed hash")]
    HashMismatch,

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Chain-linkage violations (as opposed to environment failures).
    pub fn is_chain_violation(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidChainExtension { .. } | StoreError::MissingPriorLink { .. }
        )
    }
}

macro_rules! backend_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for StoreError {
                fn from(e: $t) -> Self {
                    StoreError::StorageUnavailable(e.into())
                }
            }
        )*
    };
}

backend_from!(
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::CommitError,
    redb::StorageError,
    std::io::Error
);
