//! Hand-built bundles for store tests.

#![allow(dead_code)]

use prost::Message;
use std::collections::BTreeMap;
use strand_model::proto::{
    change_proto, BundleProto, ChangeProto, ContainerProto, EntryProto, MovementProto, MuidProto,
};
use strand_model::{value, Behavior, Muid, UserKey, Value};

pub const MEDALLION: i64 = 425579549941797;
pub const CHAIN_START: i64 = 1643351021040000;

/// A chain under construction: each `commit` links to the previous one.
pub struct ChainWriter {
    pub medallion: i64,
    pub chain_start: i64,
    pub last: Option<i64>,
}

impl ChainWriter {
    pub fn new(medallion: i64, chain_start: i64) -> Self {
        Self { medallion, chain_start, last: None }
    }

    /// Bundle at `timestamp` linking to the previous commit.
    pub fn commit(&mut self, timestamp: i64, changes: Vec<ChangeProto>) -> Vec<u8> {
        let bytes = bundle(self.medallion, self.chain_start, timestamp, self.last, changes);
        self.last = Some(timestamp);
        bytes
    }
}

pub fn bundle(
    medallion: i64,
    chain_start: i64,
    timestamp: i64,
    prior: Option<i64>,
    changes: Vec<ChangeProto>,
) -> Vec<u8> {
    let changes: BTreeMap<u32, ChangeProto> = changes
        .into_iter()
        .enumerate()
        .map(|(i, c)| (i as u32 + 1, c))
        .collect();
    BundleProto {
        timestamp,
        previous_timestamp: prior.unwrap_or(0),
        chain_start,
        medallion,
        comment: String::new(),
        changes,
    }
    .encode_to_vec()
}

pub fn create(behavior: Behavior) -> ChangeProto {
    ChangeProto {
        kind: Some(change_proto::Kind::Container(ContainerProto { behavior: behavior.code() })),
    }
}

fn entry(proto: EntryProto) -> ChangeProto {
    ChangeProto { kind: Some(change_proto::Kind::Entry(proto)) }
}

pub fn set(container: Muid, key: &str, val: Value) -> ChangeProto {
    entry(EntryProto {
        behavior: Behavior::Directory.code(),
        container: Some(container.to_proto()),
        key: Some(UserKey::from(key).to_proto()),
        value: Some(value::to_proto(&val).unwrap()),
        ..Default::default()
    })
}

pub fn point(container: Muid, key: &str, target: Muid) -> ChangeProto {
    entry(EntryProto {
        behavior: Behavior::Directory.code(),
        container: Some(container.to_proto()),
        key: Some(UserKey::from(key).to_proto()),
        pointee: Some(target.to_proto()),
        ..Default::default()
    })
}

pub fn delete(container: Muid, key: &str) -> ChangeProto {
    entry(EntryProto {
        behavior: Behavior::Directory.code(),
        container: Some(container.to_proto()),
        key: Some(UserKey::from(key).to_proto()),
        deletion: true,
        ..Default::default()
    })
}

pub fn push(sequence: Muid, val: Value) -> ChangeProto {
    entry(EntryProto {
        behavior: Behavior::Sequence.code(),
        container: Some(sequence.to_proto()),
        value: Some(value::to_proto(&val).unwrap()),
        ..Default::default()
    })
}

pub fn remove(sequence: Muid, entry_id: Muid) -> ChangeProto {
    move_to(sequence, entry_id, 0)
}

/// Movement of `entry_id` to sort position `dest`; zero removes it.
pub fn move_to(sequence: Muid, entry_id: Muid, dest: i64) -> ChangeProto {
    ChangeProto {
        kind: Some(change_proto::Kind::Movement(MovementProto {
            entry: Some(entry_id.to_proto()),
            container: Some(sequence.to_proto()),
            dest,
        })),
    }
}

/// Address of a container created at `offset` of the bundle itself.
pub fn relative(offset: i32) -> Muid {
    let proto = MuidProto { timestamp: 0, medallion: 0, offset };
    Muid::from_proto(&proto, (0, 0))
}

pub fn string(s: &str) -> Value {
    Value::from(s)
}
