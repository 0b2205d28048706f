//! Container behaviors

use crate::proto::BehaviorProto;
use std::fmt;

/// What kind of container an address refers to, and therefore how its
/// entries are keyed and interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Behavior {
    /// Holds a single value.
    Box,
    /// Ordered list; order is insertion order of entries.
    Sequence,
    /// Set of string/number keys.
    KeySet,
    /// String/number key to value.
    Directory,
    /// Set of (muid, muid) pairs.
    PairSet,
    /// (muid, muid) pair to value.
    PairMap,
    /// Membership set of muids.
    Group,
    /// Muid to value annotation.
    Property,
}

/// How entries of a behavior are keyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    None,
    User,
    Describing,
    Pair,
}

impl Behavior {
    pub const ALL: [Behavior; 8] = [
        Behavior::Box,
        Behavior::Sequence,
        Behavior::KeySet,
        Behavior::Directory,
        Behavior::PairSet,
        Behavior::PairMap,
        Behavior::Group,
        Behavior::Property,
    ];

    /// Stable numeric code (also the offset of the magic global container).
    pub const fn code(self) -> i32 {
        match self {
            Behavior::Box => 1,
            Behavior::Sequence => 2,
            Behavior::KeySet => 3,
            Behavior::Directory => 4,
            Behavior::PairSet => 5,
            Behavior::PairMap => 6,
            Behavior::Group => 7,
            Behavior::Property => 8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match BehaviorProto::try_from(code).ok()? {
            BehaviorProto::Unspecified => None,
            BehaviorProto::Box => Some(Behavior::Box),
            BehaviorProto::Sequence => Some(Behavior::Sequence),
            BehaviorProto::KeySet => Some(Behavior::KeySet),
            BehaviorProto::Directory => Some(Behavior::Directory),
            BehaviorProto::PairSet => Some(Behavior::PairSet),
            BehaviorProto::PairMap => Some(Behavior::PairMap),
            BehaviorProto::Group => Some(Behavior::Group),
            BehaviorProto::Property => Some(Behavior::Property),
        }
    }

    pub fn key_kind(self) -> KeyKind {
        match self {
            Behavior::Box | Behavior::Sequence => KeyKind::None,
            Behavior::KeySet | Behavior::Directory => KeyKind::User,
            Behavior::Group | Behavior::Property => KeyKind::Describing,
            Behavior::PairSet | Behavior::PairMap => KeyKind::Pair,
        }
    }

    /// Set-like behaviors record inclusion without a value.
    pub fn is_set(self) -> bool {
        matches!(self, Behavior::KeySet | Behavior::PairSet | Behavior::Group)
    }

    pub fn is_ordered(self) -> bool {
        matches!(self, Behavior::Sequence)
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Behavior::Box => "box",
            Behavior::Sequence => "sequence",
            Behavior::KeySet => "key_set",
            Behavior::Directory => "directory",
            Behavior::PairSet => "pair_set",
            Behavior::PairMap => "pair_map",
            Behavior::Group => "group",
            Behavior::Property => "property",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for behavior in Behavior::ALL {
            assert_eq!(Behavior::from_code(behavior.code()), Some(behavior));
        }
        assert_eq!(Behavior::from_code(0), None);
        assert_eq!(Behavior::from_code(99), None);
    }
}
