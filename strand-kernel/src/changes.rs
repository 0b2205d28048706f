//! Constructors for the changes a bundle carries.

use strand_model::proto::{change_proto, ChangeProto, ContainerProto, EntryProto, MovementProto};
use strand_model::{value, Address, Behavior, CodecError, EntryKey, Muid, UserKey, Value};

/// Slot an entry occupies, with addresses that may still be pending.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKey {
    None,
    User(UserKey),
    Describing(Address),
    Pair(Address, Address),
}

impl From<EntryKey> for ChangeKey {
    fn from(key: EntryKey) -> Self {
        match key {
            EntryKey::None => ChangeKey::None,
            EntryKey::User(k) => ChangeKey::User(k),
            EntryKey::Describing(m) => ChangeKey::Describing(m.into()),
            EntryKey::Pair(l, r) => ChangeKey::Pair(l.into(), r.into()),
        }
    }
}

/// What an entry puts into its slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Value(Value),
    Pointee(Address),
    /// Membership with no value (sets and groups).
    Inclusion,
    Deletion,
}

pub fn container(behavior: Behavior) -> ChangeProto {
    ChangeProto {
        kind: Some(change_proto::Kind::Container(ContainerProto { behavior: behavior.code() })),
    }
}

pub fn entry(
    behavior: Behavior,
    container: Address,
    key: ChangeKey,
    payload: Payload,
) -> Result<ChangeProto, CodecError> {
    let mut proto = EntryProto {
        behavior: behavior.code(),
        container: Some(container.to_proto()),
        ..Default::default()
    };
    match key {
        ChangeKey::None => {}
        ChangeKey::User(k) => proto.key = Some(k.to_proto()),
        ChangeKey::Describing(a) => proto.describing = Some(a.to_proto()),
        ChangeKey::Pair(l, r) => {
            proto.pair = Some(strand_model::proto::PairProto {
                left: Some(l.to_proto()),
                rite: Some(r.to_proto()),
            })
        }
    }
    match payload {
        Payload::Value(v) => proto.value = Some(value::to_proto(&v)?),
        Payload::Pointee(a) => proto.pointee = Some(a.to_proto()),
        Payload::Inclusion => {}
        Payload::Deletion => proto.deletion = true,
    }
    Ok(ChangeProto { kind: Some(change_proto::Kind::Entry(proto)) })
}

/// Removal of a sequence entry.
pub fn removal(container: Address, entry_id: Muid) -> ChangeProto {
    ChangeProto {
        kind: Some(change_proto::Kind::Movement(MovementProto {
            entry: Some(entry_id.to_proto()),
            container: Some(container.to_proto()),
            dest: 0,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_model::Entry;

    #[test]
    fn test_pending_references_resolve_against_bundle() {
        let change = entry(
            Behavior::Property,
            Address::Pending { offset: 1 },
            ChangeKey::Describing(Address::Pending { offset: 2 }),
            Payload::Value(Value::from("note")),
        )
        .unwrap();
        let Some(change_proto::Kind::Entry(proto)) = change.kind else {
            panic!("expected entry change");
        };
        let entry = Entry::from_change(&proto, Muid::new(50, 3, 3), (3, 50)).unwrap();
        assert_eq!(entry.container, Muid::new(50, 3, 1));
        assert_eq!(entry.key, EntryKey::Describing(Muid::new(50, 3, 2)));
    }

    #[test]
    fn test_deletion_has_no_value() {
        let change = entry(
            Behavior::Directory,
            Muid::global(Behavior::Directory).into(),
            ChangeKey::User("gone".into()),
            Payload::Deletion,
        )
        .unwrap();
        let Some(change_proto::Kind::Entry(proto)) = change.kind else {
            panic!("expected entry change");
        };
        assert!(proto.deletion);
        assert!(proto.value.is_none());
    }
}
