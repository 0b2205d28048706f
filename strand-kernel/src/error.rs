use strand_model::{CodecError, Medallion, Muid};
use strand_storage::StoreError;
use strand_sync::SyncError;
use thiserror::Error;

/// Identifies one transport connection to a peer.
pub type ConnectionId = u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BundlerError {
    #[error("bundler has already been sealed")]
    AlreadySealed,
    #[error("bundler pre-assigned medallion {expected} but was sealed for {got}")]
    MedallionMismatch { expected: Medallion, got: Medallion },
    #[error("bundler has not been sealed yet")]
    NotSealed,
}

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Bundler error: {0}")]
    Bundler(#[from] BundlerError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("no peer for connection {0}")]
    UnknownPeer(ConnectionId),

    #[error("instance chain has no watermark")]
    NotReady,

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("{address} is a {actual}, not a {expected}")]
    WrongBehavior {
        address: Muid,
        expected: strand_model::Behavior,
        actual: strand_model::Behavior,
    },

    #[error("container {0} does not exist")]
    UnknownContainer(Muid),
}
