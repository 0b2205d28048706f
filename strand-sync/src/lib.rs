//! Strand Sync
//!
//! Chain watermarks and the peer side of the handshake/forwarding protocol.
//!
//! ## Protocol
//!
//! 1. On connect both sides send a Greeting listing every chain they have
//!    and how far they have seen it.
//! 2. On a Greeting, a side streams every stored bundle the peer lacks,
//!    in `(timestamp, medallion)` order, skipping anything that would
//!    leave a gap in the peer's chains.
//! 3. Each applied bundle is acked and forwarded to the other peers.

pub mod chain_tracker;
pub mod error;
pub mod message;
pub mod peer;

pub use chain_tracker::{wait_for, ChainTracker};
pub use error::SyncError;
pub use message::{bundle_message, PeerMessage};
pub use peer::{Peer, PeerLink};
