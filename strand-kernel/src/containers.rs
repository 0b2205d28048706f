//! Typed handles over the containers of an instance.
//!
//! Mutations take an optional bundler: with one, the change joins that
//! bundle and a pending address comes back; without one, the change is
//! committed on its own. Reads go straight to the store.

use crate::bundler::Bundler;
use crate::changes::{self, ChangeKey, Payload};
use crate::error::InstanceError;
use crate::instance::Instance;
use std::collections::BTreeMap;
use strand_model::{Address, AsOf, Behavior, Entry, EntryKey, Muid, UserKey, Value};

/// Which sequence entry `Sequence::pop` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Index from the front (`>= 0`) or back (`< 0`).
    Index(i64),
    Entry(Muid),
}

impl Default for Position {
    fn default() -> Self {
        Position::Index(-1)
    }
}

impl Instance {
    /// Create a container, committed now or as part of `bundler`.
    pub async fn create_container(
        &self,
        behavior: Behavior,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        self.add_change(changes::container(behavior), bundler).await
    }

    async fn create<'a>(&'a self, behavior: Behavior) -> Result<Handle<'a>, InstanceError> {
        let address = self.create_container(behavior, None).await?;
        let address = address.resolved().ok_or(InstanceError::NotReady)?;
        Ok(Handle { instance: self, address, behavior })
    }

    fn handle(&self, address: Muid, expected: Behavior) -> Result<Handle<'_>, InstanceError> {
        let actual = self
            .store()
            .container_behavior(address)?
            .ok_or(InstanceError::UnknownContainer(address))?;
        if actual != expected {
            return Err(InstanceError::WrongBehavior { address, expected, actual });
        }
        Ok(Handle { instance: self, address, behavior: actual })
    }

    /// The global directory every instance shares.
    pub fn root(&self) -> Directory<'_> {
        Directory(Handle {
            instance: self,
            address: Muid::global(Behavior::Directory),
            behavior: Behavior::Directory,
        })
    }

    /// Directory describing this instance's chain.
    pub fn medallion_info(&self) -> Directory<'_> {
        Directory(Handle {
            instance: self,
            address: Muid::medallion_container(self.medallion(), Behavior::Directory),
            behavior: Behavior::Directory,
        })
    }

    pub async fn create_directory(&self) -> Result<Directory<'_>, InstanceError> {
        Ok(Directory(self.create(Behavior::Directory).await?))
    }

    pub async fn create_box(&self) -> Result<ValueBox<'_>, InstanceError> {
        Ok(ValueBox(self.create(Behavior::Box).await?))
    }

    pub async fn create_sequence(&self) -> Result<Sequence<'_>, InstanceError> {
        Ok(Sequence(self.create(Behavior::Sequence).await?))
    }

    pub async fn create_key_set(&self) -> Result<KeySet<'_>, InstanceError> {
        Ok(KeySet(self.create(Behavior::KeySet).await?))
    }

    pub async fn create_group(&self) -> Result<Group<'_>, InstanceError> {
        Ok(Group(self.create(Behavior::Group).await?))
    }

    pub async fn create_property(&self) -> Result<Property<'_>, InstanceError> {
        Ok(Property(self.create(Behavior::Property).await?))
    }

    pub async fn create_pair_set(&self) -> Result<PairSet<'_>, InstanceError> {
        Ok(PairSet(self.create(Behavior::PairSet).await?))
    }

    pub async fn create_pair_map(&self) -> Result<PairMap<'_>, InstanceError> {
        Ok(PairMap(self.create(Behavior::PairMap).await?))
    }

    pub fn directory(&self, address: Muid) -> Result<Directory<'_>, InstanceError> {
        Ok(Directory(self.handle(address, Behavior::Directory)?))
    }

    pub fn value_box(&self, address: Muid) -> Result<ValueBox<'_>, InstanceError> {
        Ok(ValueBox(self.handle(address, Behavior::Box)?))
    }

    pub fn sequence(&self, address: Muid) -> Result<Sequence<'_>, InstanceError> {
        Ok(Sequence(self.handle(address, Behavior::Sequence)?))
    }

    pub fn key_set(&self, address: Muid) -> Result<KeySet<'_>, InstanceError> {
        Ok(KeySet(self.handle(address, Behavior::KeySet)?))
    }

    pub fn group(&self, address: Muid) -> Result<Group<'_>, InstanceError> {
        Ok(Group(self.handle(address, Behavior::Group)?))
    }

    pub fn property(&self, address: Muid) -> Result<Property<'_>, InstanceError> {
        Ok(Property(self.handle(address, Behavior::Property)?))
    }

    pub fn pair_set(&self, address: Muid) -> Result<PairSet<'_>, InstanceError> {
        Ok(PairSet(self.handle(address, Behavior::PairSet)?))
    }

    pub fn pair_map(&self, address: Muid) -> Result<PairMap<'_>, InstanceError> {
        Ok(PairMap(self.handle(address, Behavior::PairMap)?))
    }
}

/// Shared plumbing of every typed handle.
#[derive(Clone, Copy)]
struct Handle<'a> {
    instance: &'a Instance,
    address: Muid,
    behavior: Behavior,
}

impl<'a> Handle<'a> {
    async fn put(
        &self,
        key: ChangeKey,
        payload: Payload,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        let change = changes::entry(self.behavior, self.address.into(), key, payload)?;
        self.instance.add_change(change, bundler).await
    }

    fn entry(&self, key: &EntryKey, as_of: Option<AsOf>) -> Result<Option<Entry>, InstanceError> {
        Ok(self.instance.store().get_entry(self.address, key, as_of)?)
    }

    fn entries(&self, as_of: Option<AsOf>) -> Result<BTreeMap<EntryKey, Entry>, InstanceError> {
        Ok(self.instance.store().get_keyed_entries(self.address, as_of)?)
    }

    fn value(&self, key: &EntryKey, as_of: Option<AsOf>) -> Result<Option<Value>, InstanceError> {
        Ok(self.entry(key, as_of)?.and_then(|e| e.value))
    }
}

macro_rules! handle_address {
    ($($name:ident),*) => {
        $(impl<'a> $name<'a> {
            pub fn address(&self) -> Muid {
                self.0.address
            }

            /// Entries elsewhere that point at this container.
            pub fn back_refs(&self, as_of: Option<AsOf>) -> Result<Vec<Entry>, InstanceError> {
                Ok(self.0.instance.store().get_back_refs(self.0.address, as_of)?)
            }
        })*
    };
}

pub struct Directory<'a>(Handle<'a>);
pub struct ValueBox<'a>(Handle<'a>);
pub struct Sequence<'a>(Handle<'a>);
pub struct KeySet<'a>(Handle<'a>);
pub struct Group<'a>(Handle<'a>);
pub struct Property<'a>(Handle<'a>);
pub struct PairSet<'a>(Handle<'a>);
pub struct PairMap<'a>(Handle<'a>);

handle_address!(Directory, ValueBox, Sequence, KeySet, Group, Property, PairSet, PairMap);

impl<'a> Directory<'a> {
    pub async fn set(
        &self,
        key: impl Into<UserKey>,
        value: impl Into<Value>,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        self.0
            .put(ChangeKey::User(key.into()), Payload::Value(value.into()), bundler)
            .await
    }

    /// Point `key` at another container.
    pub async fn set_pointer(
        &self,
        key: impl Into<UserKey>,
        target: impl Into<Address>,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        self.0
            .put(ChangeKey::User(key.into()), Payload::Pointee(target.into()), bundler)
            .await
    }

    pub async fn delete(
        &self,
        key: impl Into<UserKey>,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        self.0.put(ChangeKey::User(key.into()), Payload::Deletion, bundler).await
    }

    pub fn get(&self, key: impl Into<UserKey>, as_of: Option<AsOf>) -> Result<Option<Value>, InstanceError> {
        self.0.value(&EntryKey::User(key.into()), as_of)
    }

    pub fn get_pointer(&self, key: impl Into<UserKey>, as_of: Option<AsOf>) -> Result<Option<Muid>, InstanceError> {
        Ok(self.0.entry(&EntryKey::User(key.into()), as_of)?.and_then(|e| e.pointee))
    }

    pub fn has(&self, key: impl Into<UserKey>, as_of: Option<AsOf>) -> Result<bool, InstanceError> {
        Ok(self.0.entry(&EntryKey::User(key.into()), as_of)?.is_some())
    }

    /// Every key holding a value.
    pub fn to_map(&self, as_of: Option<AsOf>) -> Result<BTreeMap<UserKey, Value>, InstanceError> {
        Ok(self
            .0
            .entries(as_of)?
            .into_iter()
            .filter_map(|(key, entry)| match (key, entry.value) {
                (EntryKey::User(k), Some(v)) => Some((k, v)),
                _ => None,
            })
            .collect())
    }

    pub fn size(&self, as_of: Option<AsOf>) -> Result<usize, InstanceError> {
        Ok(self.0.entries(as_of)?.len())
    }
}

impl<'a> ValueBox<'a> {
    pub async fn set(&self, value: impl Into<Value>, bundler: Option<&mut Bundler>) -> Result<Address, InstanceError> {
        self.0.put(ChangeKey::None, Payload::Value(value.into()), bundler).await
    }

    pub async fn clear(&self, bundler: Option<&mut Bundler>) -> Result<Address, InstanceError> {
        self.0.put(ChangeKey::None, Payload::Deletion, bundler).await
    }

    pub fn get(&self, as_of: Option<AsOf>) -> Result<Option<Value>, InstanceError> {
        self.0.value(&EntryKey::None, as_of)
    }

    pub fn is_empty(&self, as_of: Option<AsOf>) -> Result<bool, InstanceError> {
        Ok(self.0.entry(&EntryKey::None, as_of)?.is_none())
    }
}

impl<'a> Sequence<'a> {
    /// Append a value. Returns the address of the new entry.
    pub async fn push(&self, value: impl Into<Value>, bundler: Option<&mut Bundler>) -> Result<Address, InstanceError> {
        self.0.put(ChangeKey::None, Payload::Value(value.into()), bundler).await
    }

    /// Entry at `index`, counting from the back when negative.
    pub fn entry_at(&self, index: i64, as_of: Option<AsOf>) -> Result<Option<Entry>, InstanceError> {
        let mut entries = self
            .0
            .instance
            .store()
            .get_ordered_entries(self.0.address, Some(index), as_of)?;
        let wanted = if index >= 0 { index.saturating_add(1) } else { index.saturating_neg() };
        if (entries.len() as i64) < wanted {
            return Ok(None);
        }
        Ok(if index >= 0 { entries.pop() } else { entries.into_iter().next() })
    }

    pub fn at(&self, index: i64, as_of: Option<AsOf>) -> Result<Option<Value>, InstanceError> {
        Ok(self.entry_at(index, as_of)?.and_then(|e| e.value))
    }

    /// Remove an entry and return its value. Nothing is written if the
    /// position is empty.
    pub async fn pop(&self, what: Position, bundler: Option<&mut Bundler>) -> Result<Option<Value>, InstanceError> {
        let entry = match what {
            Position::Index(index) => self.entry_at(index, None)?,
            Position::Entry(id) => self
                .0
                .instance
                .store()
                .get_ordered_entries(self.0.address, None, None)?
                .into_iter()
                .find(|e| e.entry_id == id),
        };
        let Some(entry) = entry else {
            return Ok(None);
        };
        let change = changes::removal(self.0.address.into(), entry.entry_id);
        self.0.instance.add_change(change, bundler).await?;
        Ok(entry.value)
    }

    pub fn to_vec(&self, through: Option<i64>, as_of: Option<AsOf>) -> Result<Vec<Value>, InstanceError> {
        Ok(self
            .0
            .instance
            .store()
            .get_ordered_entries(self.0.address, through, as_of)?
            .into_iter()
            .filter_map(|e| e.value)
            .collect())
    }

    pub fn len(&self, as_of: Option<AsOf>) -> Result<usize, InstanceError> {
        Ok(self
            .0
            .instance
            .store()
            .get_ordered_entries(self.0.address, None, as_of)?
            .len())
    }

    pub fn is_empty(&self, as_of: Option<AsOf>) -> Result<bool, InstanceError> {
        Ok(self.len(as_of)? == 0)
    }
}

impl<'a> KeySet<'a> {
    pub async fn add(&self, key: impl Into<UserKey>, bundler: Option<&mut Bundler>) -> Result<Address, InstanceError> {
        self.0.put(ChangeKey::User(key.into()), Payload::Inclusion, bundler).await
    }

    pub async fn remove(&self, key: impl Into<UserKey>, bundler: Option<&mut Bundler>) -> Result<Address, InstanceError> {
        self.0.put(ChangeKey::User(key.into()), Payload::Deletion, bundler).await
    }

    pub fn contains(&self, key: impl Into<UserKey>, as_of: Option<AsOf>) -> Result<bool, InstanceError> {
        Ok(self.0.entry(&EntryKey::User(key.into()), as_of)?.is_some())
    }

    pub fn members(&self, as_of: Option<AsOf>) -> Result<Vec<UserKey>, InstanceError> {
        Ok(self
            .0
            .entries(as_of)?
            .into_keys()
            .filter_map(|key| match key {
                EntryKey::User(k) => Some(k),
                _ => None,
            })
            .collect())
    }
}

impl<'a> Group<'a> {
    pub async fn include(&self, member: impl Into<Address>, bundler: Option<&mut Bundler>) -> Result<Address, InstanceError> {
        self.0.put(ChangeKey::Describing(member.into()), Payload::Inclusion, bundler).await
    }

    pub async fn exclude(&self, member: impl Into<Address>, bundler: Option<&mut Bundler>) -> Result<Address, InstanceError> {
        self.0.put(ChangeKey::Describing(member.into()), Payload::Deletion, bundler).await
    }

    pub fn contains(&self, member: Muid, as_of: Option<AsOf>) -> Result<bool, InstanceError> {
        Ok(self.0.entry(&EntryKey::Describing(member), as_of)?.is_some())
    }

    pub fn members(&self, as_of: Option<AsOf>) -> Result<Vec<Muid>, InstanceError> {
        Ok(self
            .0
            .entries(as_of)?
            .into_keys()
            .filter_map(|key| match key {
                EntryKey::Describing(m) => Some(m),
                _ => None,
            })
            .collect())
    }
}

impl<'a> Property<'a> {
    pub async fn set(
        &self,
        subject: impl Into<Address>,
        value: impl Into<Value>,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        self.0
            .put(ChangeKey::Describing(subject.into()), Payload::Value(value.into()), bundler)
            .await
    }

    pub async fn delete(&self, subject: impl Into<Address>, bundler: Option<&mut Bundler>) -> Result<Address, InstanceError> {
        self.0.put(ChangeKey::Describing(subject.into()), Payload::Deletion, bundler).await
    }

    pub fn get(&self, subject: Muid, as_of: Option<AsOf>) -> Result<Option<Value>, InstanceError> {
        self.0.value(&EntryKey::Describing(subject), as_of)
    }
}

impl<'a> PairSet<'a> {
    pub async fn include(
        &self,
        left: impl Into<Address>,
        rite: impl Into<Address>,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        self.0
            .put(ChangeKey::Pair(left.into(), rite.into()), Payload::Inclusion, bundler)
            .await
    }

    pub async fn exclude(
        &self,
        left: impl Into<Address>,
        rite: impl Into<Address>,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        self.0
            .put(ChangeKey::Pair(left.into(), rite.into()), Payload::Deletion, bundler)
            .await
    }

    pub fn contains(&self, left: Muid, rite: Muid, as_of: Option<AsOf>) -> Result<bool, InstanceError> {
        Ok(self.0.entry(&EntryKey::Pair(left, rite), as_of)?.is_some())
    }

    pub fn size(&self, as_of: Option<AsOf>) -> Result<usize, InstanceError> {
        Ok(self.0.entries(as_of)?.len())
    }
}

impl<'a> PairMap<'a> {
    pub async fn set(
        &self,
        left: impl Into<Address>,
        rite: impl Into<Address>,
        value: impl Into<Value>,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        self.0
            .put(ChangeKey::Pair(left.into(), rite.into()), Payload::Value(value.into()), bundler)
            .await
    }

    pub async fn delete(
        &self,
        left: impl Into<Address>,
        rite: impl Into<Address>,
        bundler: Option<&mut Bundler>,
    ) -> Result<Address, InstanceError> {
        self.0
            .put(ChangeKey::Pair(left.into(), rite.into()), Payload::Deletion, bundler)
            .await
    }

    pub fn get(&self, left: Muid, rite: Muid, as_of: Option<AsOf>) -> Result<Option<Value>, InstanceError> {
        self.0.value(&EntryKey::Pair(left, rite), as_of)
    }
}
