//! Materialized entries and point-in-time cutoffs

use crate::behavior::{Behavior, KeyKind};
use crate::key::{EntryKey, UserKey};
use crate::proto::{EntryProto, EntryRecord, MuidProto, PairProto};
use crate::types::{Medallion, Muid, Timestamp};
use crate::value::{self, CodecError, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// One value (or inclusion, or tombstone) recorded into a container.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub behavior: Behavior,
    pub container: Muid,
    pub key: EntryKey,
    /// Address of the change that created this entry.
    pub entry_id: Muid,
    /// Container this entry refers to, if any.
    pub pointee: Option<Muid>,
    pub value: Option<Value>,
    pub expiry: Option<Timestamp>,
    pub deleting: bool,
}

fn required(proto: Option<&MuidProto>, field: &'static str) -> Result<MuidProto, CodecError> {
    proto.copied().ok_or(CodecError::MissingField(field))
}

fn pair_from_proto(
    pair: Option<&PairProto>,
    bundle: (Medallion, Timestamp),
) -> Result<EntryKey, CodecError> {
    let pair = pair.ok_or(CodecError::MissingField("pair"))?;
    let left = required(pair.left.as_ref(), "pair.left")?;
    let rite = required(pair.rite.as_ref(), "pair.rite")?;
    Ok(EntryKey::Pair(
        Muid::from_proto(&left, bundle),
        Muid::from_proto(&rite, bundle),
    ))
}

impl Entry {
    /// Build an entry from a change inside a bundle, resolving any
    /// bundle-relative addresses.
    pub fn from_change(
        change: &EntryProto,
        entry_id: Muid,
        bundle: (Medallion, Timestamp),
    ) -> Result<Self, CodecError> {
        let behavior =
            Behavior::from_code(change.behavior).ok_or(CodecError::UnknownBehavior(change.behavior))?;
        let container = Muid::from_proto(&required(change.container.as_ref(), "container")?, bundle);
        let key = match behavior.key_kind() {
            KeyKind::None => EntryKey::None,
            KeyKind::User => EntryKey::User(UserKey::from_proto(
                change.key.as_ref().ok_or(CodecError::MissingField("key"))?,
            )?),
            KeyKind::Describing => EntryKey::Describing(Muid::from_proto(
                &required(change.describing.as_ref(), "describing")?,
                bundle,
            )),
            KeyKind::Pair => pair_from_proto(change.pair.as_ref(), bundle)?,
        };
        Ok(Self {
            behavior,
            container,
            key,
            entry_id,
            pointee: change.pointee.as_ref().map(|p| Muid::from_proto(p, bundle)),
            value: change.value.as_ref().map(value::from_proto).transpose()?,
            expiry: (change.expiry != 0).then_some(change.expiry),
            deleting: change.deletion,
        })
    }

    pub fn to_record(&self) -> Result<EntryRecord, CodecError> {
        let mut record = EntryRecord {
            behavior: self.behavior.code(),
            container: Some(self.container.to_proto()),
            entry_id: Some(self.entry_id.to_proto()),
            pointee: self.pointee.map(|p| p.to_proto()),
            value: self.value.as_ref().map(value::to_proto).transpose()?,
            expiry: self.expiry.unwrap_or(0),
            deleting: self.deleting,
            ..Default::default()
        };
        match &self.key {
            EntryKey::None => {}
            EntryKey::User(k) => record.key = Some(k.to_proto()),
            EntryKey::Describing(m) => record.describing = Some(m.to_proto()),
            EntryKey::Pair(l, r) => record.pair = Some(EntryKey::pair_to_proto(*l, *r)),
        }
        Ok(record)
    }

    /// Inverse of [`Entry::to_record`]; record addresses are already absolute.
    pub fn from_record(record: &EntryRecord) -> Result<Self, CodecError> {
        let entry_id = required(record.entry_id.as_ref(), "entry_id")?;
        let absolute = (entry_id.medallion, entry_id.timestamp);
        let change = EntryProto {
            behavior: record.behavior,
            container: record.container,
            key: record.key.clone(),
            describing: record.describing,
            pair: record.pair,
            pointee: record.pointee,
            value: record.value.clone(),
            expiry: record.expiry,
            deletion: record.deleting,
        };
        Self::from_change(&change, Muid::from_proto(&entry_id, absolute), absolute)
    }
}

/// Bounds below which an integer passed to `AsOf::from` means "commits back".
pub const COMMITS_BACK_LIMIT: i64 = 1000;

/// Point in time a query should observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsOf {
    /// Absolute microsecond timestamp; entries at exactly this time are visible.
    Timestamp(Timestamp),
    Time(SystemTime),
    /// State just before the n-th most recent bundle was applied.
    CommitsBack(u32),
}

impl AsOf {
    /// The absolute cutoff, when it can be known without the store.
    pub fn absolute(&self) -> Option<Timestamp> {
        match self {
            AsOf::Timestamp(ts) => Some(*ts),
            AsOf::Time(time) => Some(match time.duration_since(UNIX_EPOCH) {
                Ok(d) => d.as_micros() as i64,
                Err(e) => -(e.duration().as_micros() as i64),
            }),
            AsOf::CommitsBack(_) => None,
        }
    }
}

impl From<i64> for AsOf {
    /// Small negative numbers count commits back; anything else is a timestamp.
    fn from(n: i64) -> Self {
        if n < 0 && n > -COMMITS_BACK_LIMIT {
            AsOf::CommitsBack((-n) as u32)
        } else {
            AsOf::Timestamp(n)
        }
    }
}

impl From<SystemTime> for AsOf {
    fn from(time: SystemTime) -> Self {
        AsOf::Time(time)
    }
}
