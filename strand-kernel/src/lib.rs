//! Strand kernel: bundling changes and running an instance.
//!
//! An [`Instance`] owns one writable chain over an [`EntryStore`](strand_storage::EntryStore),
//! seals [`Bundler`]s onto it, and exchanges bundles with connected peers.

pub mod bundler;
pub mod changes;
pub mod containers;
pub mod data_dir;
pub mod error;
pub mod instance;

pub use bundler::Bundler;
pub use changes::{ChangeKey, Payload};
pub use containers::{
    Directory, Group, KeySet, PairMap, PairSet, Position, Property, Sequence, ValueBox,
};
pub use data_dir::{Backend, DataDir};
pub use error::{BundlerError, ConnectionId, InstanceError};
pub use instance::{Instance, InstanceOptions, Listener};
