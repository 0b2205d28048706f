//! Wire and storage messages.
//!
//! Declared with `prost` derives instead of generated code so the schema
//! lives next to the types that convert to and from it. Tag numbers are part
//! of the wire format: never reuse one.

use std::collections::BTreeMap;

/// Address of a container or change. Zero medallion/timestamp means
/// "same as the enclosing bundle".
#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct MuidProto {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(int64, tag = "2")]
    pub medallion: i64,
    #[prost(int32, tag = "3")]
    pub offset: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum BehaviorProto {
    Unspecified = 0,
    Box = 1,
    Sequence = 2,
    KeySet = 3,
    Directory = 4,
    PairSet = 5,
    PairMap = 6,
    Group = 7,
    Property = 8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Special {
    Missing = 0,
    Null = 1,
    True = 2,
    False = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValueProto {
    #[prost(oneof = "value_proto::Kind", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub kind: Option<value_proto::Kind>,
}

pub mod value_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(string, tag = "1")]
        Characters(String),
        #[prost(message, tag = "2")]
        Number(super::NumberProto),
        #[prost(enumeration = "super::Special", tag = "3")]
        Special(i32),
        #[prost(bytes = "vec", tag = "4")]
        Octets(Vec<u8>),
        /// Microseconds since the Unix epoch.
        #[prost(int64, tag = "5")]
        Timestamp(i64),
        #[prost(message, tag = "6")]
        Tuple(super::TupleProto),
        #[prost(message, tag = "7")]
        Document(super::DocumentProto),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NumberProto {
    #[prost(oneof = "number_proto::Encoding", tags = "1, 2")]
    pub encoding: Option<number_proto::Encoding>,
}

pub mod number_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Encoding {
        #[prost(double, tag = "1")]
        Doubled(f64),
        /// Reserved for an integer fast path; decoded but never produced.
        #[prost(sint64, tag = "2")]
        Integer(i64),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TupleProto {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<ValueProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DocumentProto {
    #[prost(message, repeated, tag = "1")]
    pub keys: Vec<ValueProto>,
    #[prost(message, repeated, tag = "2")]
    pub values: Vec<ValueProto>,
}

/// A string or number key of a Directory or KeySet entry.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyProto {
    #[prost(oneof = "key_proto::Kind", tags = "1, 2")]
    pub kind: Option<key_proto::Kind>,
}

pub mod key_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(string, tag = "1")]
        Characters(String),
        #[prost(double, tag = "2")]
        Number(f64),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct PairProto {
    #[prost(message, optional, tag = "1")]
    pub left: Option<MuidProto>,
    #[prost(message, optional, tag = "2")]
    pub rite: Option<MuidProto>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ContainerProto {
    #[prost(enumeration = "BehaviorProto", tag = "1")]
    pub behavior: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntryProto {
    #[prost(enumeration = "BehaviorProto", tag = "1")]
    pub behavior: i32,
    #[prost(message, optional, tag = "2")]
    pub container: Option<MuidProto>,
    #[prost(message, optional, tag = "3")]
    pub key: Option<KeyProto>,
    #[prost(message, optional, tag = "4")]
    pub describing: Option<MuidProto>,
    #[prost(message, optional, tag = "5")]
    pub pair: Option<PairProto>,
    #[prost(message, optional, tag = "6")]
    pub pointee: Option<MuidProto>,
    #[prost(message, optional, tag = "7")]
    pub value: Option<ValueProto>,
    #[prost(int64, tag = "8")]
    pub expiry: i64,
    #[prost(bool, tag = "9")]
    pub deletion: bool,
}

/// Removal (dest == 0) or repositioning (dest is the new sort position)
/// of a previously placed sequence entry.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct MovementProto {
    #[prost(message, optional, tag = "1")]
    pub entry: Option<MuidProto>,
    #[prost(message, optional, tag = "2")]
    pub container: Option<MuidProto>,
    #[prost(int64, tag = "3")]
    pub dest: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChangeProto {
    #[prost(oneof = "change_proto::Kind", tags = "1, 2, 3")]
    pub kind: Option<change_proto::Kind>,
}

pub mod change_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Container(super::ContainerProto),
        #[prost(message, tag = "2")]
        Entry(super::EntryProto),
        #[prost(message, tag = "3")]
        Movement(super::MovementProto),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BundleProto {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(int64, tag = "2")]
    pub previous_timestamp: i64,
    #[prost(int64, tag = "3")]
    pub chain_start: i64,
    #[prost(int64, tag = "4")]
    pub medallion: i64,
    #[prost(string, tag = "5")]
    pub comment: String,
    #[prost(btree_map = "uint32, message", tag = "6")]
    pub changes: BTreeMap<u32, ChangeProto>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GreetingEntry {
    #[prost(int64, tag = "1")]
    pub medallion: i64,
    #[prost(int64, tag = "2")]
    pub chain_start: i64,
    #[prost(int64, tag = "3")]
    pub seen_through: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Greeting {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<GreetingEntry>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Ack {
    #[prost(int64, tag = "1")]
    pub medallion: i64,
    #[prost(int64, tag = "2")]
    pub chain_start: i64,
    #[prost(int64, tag = "3")]
    pub timestamp: i64,
}

/// Envelope for everything exchanged between peers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncMessage {
    #[prost(oneof = "sync_message::Contents", tags = "1, 2, 3")]
    pub contents: Option<sync_message::Contents>,
}

pub mod sync_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Contents {
        /// Sealed bundle bytes, forwarded without re-encoding.
        #[prost(bytes = "vec", tag = "1")]
        Bundle(Vec<u8>),
        #[prost(message, tag = "2")]
        Greeting(super::Greeting),
        #[prost(message, tag = "3")]
        Ack(super::Ack),
    }
}

/// Watermark row persisted per chain.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChainInfoProto {
    #[prost(int64, tag = "1")]
    pub medallion: i64,
    #[prost(int64, tag = "2")]
    pub chain_start: i64,
    #[prost(int64, tag = "3")]
    pub timestamp: i64,
    #[prost(int64, tag = "4")]
    pub prior_time: i64,
    #[prost(string, tag = "5")]
    pub comment: String,
}

/// Materialized entry row, with every address made absolute.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntryRecord {
    #[prost(enumeration = "BehaviorProto", tag = "1")]
    pub behavior: i32,
    #[prost(message, optional, tag = "2")]
    pub container: Option<MuidProto>,
    #[prost(message, optional, tag = "3")]
    pub key: Option<KeyProto>,
    #[prost(message, optional, tag = "4")]
    pub describing: Option<MuidProto>,
    #[prost(message, optional, tag = "5")]
    pub pair: Option<PairProto>,
    #[prost(message, optional, tag = "6")]
    pub entry_id: Option<MuidProto>,
    #[prost(message, optional, tag = "7")]
    pub pointee: Option<MuidProto>,
    #[prost(message, optional, tag = "8")]
    pub value: Option<ValueProto>,
    #[prost(int64, tag = "9")]
    pub expiry: i64,
    #[prost(bool, tag = "10")]
    pub deleting: bool,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ClaimedChain {
    #[prost(int64, tag = "1")]
    pub medallion: i64,
    #[prost(int64, tag = "2")]
    pub chain_start: i64,
}

/// One append to the log-backed store's file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogFragment {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub bundles: Vec<Vec<u8>>,
    #[prost(message, repeated, tag = "2")]
    pub claims: Vec<ClaimedChain>,
}

/// Framed record on disk: payload is an encoded `LogFragment`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogRecord {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub fragment_bytes: Vec<u8>,
}
