//! Entry keys
//!
//! Which key an entry is filed under depends on its container's behavior:
//! boxes and sequences have none, directories and key sets use a user key,
//! properties and groups describe another address, and pair containers
//! use an ordered pair of addresses.

use crate::proto::{key_proto, KeyProto, PairProto};
use crate::types::Muid;
use crate::value::{CodecError, Value};
use std::cmp::Ordering;
use std::fmt;

/// A string or number supplied by the application.
#[derive(Debug, Clone)]
pub enum UserKey {
    String(String),
    Number(f64),
}

impl UserKey {
    pub fn to_proto(&self) -> KeyProto {
        let kind = match self {
            UserKey::String(s) => key_proto::Kind::Characters(s.clone()),
            UserKey::Number(n) => key_proto::Kind::Number(*n),
        };
        KeyProto { kind: Some(kind) }
    }

    pub fn from_proto(proto: &KeyProto) -> Result<Self, CodecError> {
        match &proto.kind {
            Some(key_proto::Kind::Characters(s)) => Ok(UserKey::String(s.clone())),
            Some(key_proto::Kind::Number(n)) => Ok(UserKey::Number(*n)),
            None => Err(CodecError::MissingField("key")),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            UserKey::String(s) => Value::String(s.clone()),
            UserKey::Number(n) => Value::Number(*n),
        }
    }
}

// Numbers sort before strings; numbers use IEEE total order so NaN keys
// still have a stable slot.
impl Ord for UserKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (UserKey::Number(a), UserKey::Number(b)) => a.total_cmp(b),
            (UserKey::Number(_), UserKey::String(_)) => Ordering::Less,
            (UserKey::String(_), UserKey::Number(_)) => Ordering::Greater,
            (UserKey::String(a), UserKey::String(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for UserKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for UserKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for UserKey {}

impl std::hash::Hash for UserKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            UserKey::String(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            UserKey::Number(n) => {
                1u8.hash(state);
                n.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserKey::String(s) => write!(f, "{:?}", s),
            UserKey::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for UserKey {
    fn from(s: &str) -> Self {
        UserKey::String(s.to_owned())
    }
}

impl From<String> for UserKey {
    fn from(s: String) -> Self {
        UserKey::String(s)
    }
}

impl From<f64> for UserKey {
    fn from(n: f64) -> Self {
        UserKey::Number(n)
    }
}

/// The semantic key of an entry within its container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKey {
    None,
    User(UserKey),
    Describing(Muid),
    Pair(Muid, Muid),
}

impl EntryKey {
    pub fn user(key: impl Into<UserKey>) -> Self {
        EntryKey::User(key.into())
    }

    pub fn pair_to_proto(left: Muid, rite: Muid) -> PairProto {
        PairProto {
            left: Some(left.to_proto()),
            rite: Some(rite.to_proto()),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::None => f.write_str("-"),
            EntryKey::User(k) => write!(f, "{}", k),
            EntryKey::Describing(m) => write!(f, "{}", m),
            EntryKey::Pair(l, r) => write!(f, "({}, {})", l, r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_sort_before_strings() {
        let mut keys = vec![
            UserKey::from("b"),
            UserKey::from(2.0),
            UserKey::from("a"),
            UserKey::from(-1.0),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                UserKey::from(-1.0),
                UserKey::from(2.0),
                UserKey::from("a"),
                UserKey::from("b"),
            ]
        );
    }

    #[test]
    fn test_missing_key_kind_is_error() {
        let proto = KeyProto { kind: None };
        assert_eq!(UserKey::from_proto(&proto), Err(CodecError::MissingField("key")));
    }
}
