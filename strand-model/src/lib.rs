//! Strand Model
//!
//! Pure data types for the strand system: addresses, chains, entries,
//! values and their wire encodings. No storage or networking here.

pub mod behavior;
pub mod bundle;
pub mod clock;
pub mod entry;
pub mod key;
pub mod proto;
pub mod storage_config;
pub mod types;
pub mod value;

// Re-exports
pub use behavior::{Behavior, KeyKind};
pub use bundle::ParsedBundle;
pub use clock::{Clock, MockClock, SystemClock};
pub use entry::{AsOf, Entry};
pub use key::{EntryKey, UserKey};
pub use storage_config::StorageConfig;
pub use types::{Address, BundleInfo, ChainKey, ChainStart, Medallion, Muid, Offset, Timestamp};
pub use value::{CodecError, Value};
