//! Addresses and chain identifiers
//!
//! A `Muid` names a container or a change: the bundle that produced it
//! (medallion + timestamp) and its 1-based offset inside that bundle.

use crate::behavior::Behavior;
use crate::proto::{ChainInfoProto, MuidProto};
use std::fmt;

/// Random per-instance identifier (between 2^48 and 2^49 for real chains).
pub type Medallion = i64;
/// Microseconds since the Unix epoch.
pub type Timestamp = i64;
/// Timestamp of a chain's first bundle.
pub type ChainStart = Timestamp;
/// Position of a change within its bundle, starting at 1.
pub type Offset = i32;

/// Medallion/timestamp value used by the reserved "magic" containers.
pub const MAGIC: i64 = -1;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Muid {
    // Field order gives the (timestamp, medallion, offset) sort used everywhere.
    pub timestamp: Timestamp,
    pub medallion: Medallion,
    pub offset: Offset,
}

impl Muid {
    pub const fn new(timestamp: Timestamp, medallion: Medallion, offset: Offset) -> Self {
        Self { timestamp, medallion, offset }
    }

    /// The always-present global container with the given behavior.
    pub const fn global(behavior: Behavior) -> Self {
        Self::new(MAGIC, MAGIC, behavior.code())
    }

    /// The per-chain container owned by `medallion` (e.g. its info directory).
    pub const fn medallion_container(medallion: Medallion, behavior: Behavior) -> Self {
        Self::new(MAGIC, medallion, behavior.code())
    }

    /// True for reserved addresses that need no creation bundle.
    pub fn is_magic(&self) -> bool {
        self.timestamp < 0
    }

    /// Resolve a wire address that may be relative to its bundle.
    pub fn from_proto(proto: &MuidProto, bundle: (Medallion, Timestamp)) -> Self {
        Self {
            timestamp: if proto.timestamp == 0 { bundle.1 } else { proto.timestamp },
            medallion: if proto.medallion == 0 { bundle.0 } else { proto.medallion },
            offset: proto.offset,
        }
    }

    /// Absolute wire form.
    pub fn to_proto(&self) -> MuidProto {
        MuidProto {
            timestamp: self.timestamp,
            medallion: self.medallion,
            offset: self.offset,
        }
    }
}

impl fmt::Display for Muid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:x}-{}", self.timestamp, self.medallion, self.offset)
    }
}

impl fmt::Debug for Muid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Muid({})", self)
    }
}

/// Address handed out by a bundler before its bundle is sealed.
///
/// Pending addresses know only their offset; they become concrete once the
/// bundler is sealed (see `Bundler::resolve`). On the wire a pending address
/// is written relative to its own bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Address {
    Pending { offset: Offset },
    Resolved(Muid),
}

impl Address {
    pub fn offset(&self) -> Offset {
        match self {
            Address::Pending { offset } => *offset,
            Address::Resolved(muid) => muid.offset,
        }
    }

    pub fn resolved(&self) -> Option<Muid> {
        match self {
            Address::Pending { .. } => None,
            Address::Resolved(muid) => Some(*muid),
        }
    }

    pub fn to_proto(&self) -> MuidProto {
        match self {
            Address::Pending { offset } => MuidProto { timestamp: 0, medallion: 0, offset: *offset },
            Address::Resolved(muid) => muid.to_proto(),
        }
    }
}

impl From<Muid> for Address {
    fn from(muid: Muid) -> Self {
        Address::Resolved(muid)
    }
}

/// Identifies one chain: `(medallion, chainStart)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainKey {
    pub medallion: Medallion,
    pub chain_start: ChainStart,
}

impl ChainKey {
    pub const fn new(medallion: Medallion, chain_start: ChainStart) -> Self {
        Self { medallion, chain_start }
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chain({:x}@{})", self.medallion, self.chain_start)
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}@{}", self.medallion, self.chain_start)
    }
}

/// Header metadata of one sealed bundle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BundleInfo {
    pub medallion: Medallion,
    pub chain_start: ChainStart,
    pub timestamp: Timestamp,
    pub prior_time: Option<Timestamp>,
    pub comment: Option<String>,
}

impl BundleInfo {
    pub fn chain(&self) -> ChainKey {
        ChainKey::new(self.medallion, self.chain_start)
    }

    /// True for the first bundle of a chain.
    pub fn is_chain_start(&self) -> bool {
        self.timestamp == self.chain_start && self.prior_time.is_none()
    }

    pub fn to_proto(&self) -> ChainInfoProto {
        ChainInfoProto {
            medallion: self.medallion,
            chain_start: self.chain_start,
            timestamp: self.timestamp,
            prior_time: self.prior_time.unwrap_or(0),
            comment: self.comment.clone().unwrap_or_default(),
        }
    }

    pub fn from_proto(proto: &ChainInfoProto) -> Self {
        Self {
            medallion: proto.medallion,
            chain_start: proto.chain_start,
            timestamp: proto.timestamp,
            prior_time: (proto.prior_time != 0).then_some(proto.prior_time),
            comment: (!proto.comment.is_empty()).then(|| proto.comment.clone()),
        }
    }
}

impl fmt::Display for BundleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain(), self.timestamp)?;
        if let Some(prior) = self.prior_time {
            write!(f, " (prior {})", prior)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_muid_resolves_against_bundle() {
        let proto = MuidProto { timestamp: 0, medallion: 0, offset: 3 };
        let muid = Muid::from_proto(&proto, (42, 1000));
        assert_eq!(muid, Muid::new(1000, 42, 3));

        let absolute = MuidProto { timestamp: 7, medallion: 9, offset: 1 };
        assert_eq!(Muid::from_proto(&absolute, (42, 1000)), Muid::new(7, 9, 1));
    }

    #[test]
    fn test_muid_orders_by_timestamp_first() {
        let early = Muid::new(10, 999, 5);
        let late = Muid::new(11, 1, 1);
        assert!(early < late);
    }

    #[test]
    fn test_magic_addresses() {
        let global = Muid::global(Behavior::Directory);
        assert!(global.is_magic());
        assert_eq!(global.offset, Behavior::Directory.code());
        assert!(!Muid::new(1, 1, 1).is_magic());
    }

    #[test]
    fn test_chain_info_proto_drops_empty_optionals() {
        let info = BundleInfo {
            medallion: 5,
            chain_start: 100,
            timestamp: 100,
            prior_time: None,
            comment: None,
        };
        assert!(info.is_chain_start());
        assert_eq!(BundleInfo::from_proto(&info.to_proto()), info);
    }
}
