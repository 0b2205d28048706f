use strand_model::{ChainKey, Timestamp};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("bundle {timestamp} (prior {prior_time:?}) is not a valid extension of {chain} seen through {seen_through:?}")]
    InvalidChainExtension {
        chain: ChainKey,
        seen_through: Option<Timestamp>,
        timestamp: Timestamp,
        prior_time: Option<Timestamp>,
    },
    #[error("peer sent a second greeting")]
    DuplicateGreeting,
    #[error("peer sent a bundle before its greeting")]
    BundleBeforeGreeting,
    #[error("timed out waiting for bundle")]
    Timeout,
    #[error("sync message carried no contents")]
    EmptyMessage,
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}
