//! Assembling changes into a sealed bundle
//!
//! A bundler is open until `seal` fixes its header. Changes added while
//! open get their offset immediately; their full address is only known
//! after sealing (see [`Bundler::resolve`]).

use crate::error::BundlerError;
use prost::Message;
use std::collections::BTreeMap;
use strand_model::proto::{change_proto, BundleProto, ChangeProto, ContainerProto};
use strand_model::{Address, Behavior, BundleInfo, Medallion, Muid, Offset};

#[derive(Debug, Default)]
pub struct Bundler {
    comment: Option<String>,
    medallion: Option<Medallion>,
    changes: BTreeMap<u32, ChangeProto>,
    count: Offset,
    sealed: Option<Sealed>,
}

#[derive(Debug)]
struct Sealed {
    info: BundleInfo,
    bytes: Vec<u8>,
}

impl Bundler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// Bundler that may only be sealed for `medallion`.
    pub fn with_medallion(mut self, medallion: Medallion) -> Self {
        self.medallion = Some(medallion);
        self
    }

    fn require_open(&self) -> Result<(), BundlerError> {
        match self.sealed {
            Some(_) => Err(BundlerError::AlreadySealed),
            None => Ok(()),
        }
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<(), BundlerError> {
        self.require_open()?;
        self.comment = Some(comment.into());
        Ok(())
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Pre-assigned medallion, or the sealed one.
    pub fn medallion(&self) -> Option<Medallion> {
        self.medallion.or(self.sealed.as_ref().map(|s| s.info.medallion))
    }

    pub fn add_change(&mut self, change: ChangeProto) -> Result<Address, BundlerError> {
        self.require_open()?;
        self.count += 1;
        self.changes.insert(self.count as u32, change);
        Ok(Address::Pending { offset: self.count })
    }

    pub fn add_container(&mut self, behavior: Behavior) -> Result<Address, BundlerError> {
        self.add_change(ChangeProto {
            kind: Some(change_proto::Kind::Container(ContainerProto {
                behavior: behavior.code(),
            })),
        })
    }

    /// Drop a change added earlier. Offsets of other changes are unaffected.
    pub fn remove_change(&mut self, address: Address) -> Result<(), BundlerError> {
        self.require_open()?;
        if let Ok(offset) = u32::try_from(address.offset()) {
            self.changes.remove(&offset);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    /// Fix the header and serialize. The bundle's comment is the
    /// bundler's; any comment in `info` is ignored.
    pub fn seal(&mut self, info: BundleInfo) -> Result<BundleInfo, BundlerError> {
        self.require_open()?;
        if let Some(expected) = self.medallion {
            if expected != info.medallion {
                return Err(BundlerError::MedallionMismatch {
                    expected,
                    got: info.medallion,
                });
            }
        }
        let info = BundleInfo {
            comment: self.comment.clone(),
            ..info
        };
        let proto = BundleProto {
            timestamp: info.timestamp,
            previous_timestamp: info.prior_time.unwrap_or(0),
            chain_start: info.chain_start,
            medallion: info.medallion,
            comment: info.comment.clone().unwrap_or_default(),
            changes: std::mem::take(&mut self.changes),
        };
        let bytes = proto.encode_to_vec();
        self.changes = proto.changes;
        self.sealed = Some(Sealed {
            info: info.clone(),
            bytes,
        });
        Ok(info)
    }

    pub fn bytes(&self) -> Result<&[u8], BundlerError> {
        self.sealed
            .as_ref()
            .map(|s| s.bytes.as_slice())
            .ok_or(BundlerError::NotSealed)
    }

    pub fn info(&self) -> Option<&BundleInfo> {
        self.sealed.as_ref().map(|s| &s.info)
    }

    /// Concrete address of a change from this bundler.
    pub fn resolve(&self, address: Address) -> Result<Muid, BundlerError> {
        match address {
            Address::Resolved(muid) => Ok(muid),
            Address::Pending { offset } => {
                let sealed = self.sealed.as_ref().ok_or(BundlerError::NotSealed)?;
                Ok(Muid::new(sealed.info.timestamp, sealed.info.medallion, offset))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_model::ParsedBundle;

    fn info(medallion: Medallion) -> BundleInfo {
        BundleInfo {
            medallion,
            chain_start: 100,
            timestamp: 200,
            prior_time: Some(100),
            comment: None,
        }
    }

    #[test]
    fn test_offsets_start_at_one() {
        let mut bundler = Bundler::new();
        assert_eq!(bundler.add_container(Behavior::Box).unwrap(), Address::Pending { offset: 1 });
        assert_eq!(bundler.add_container(Behavior::Sequence).unwrap(), Address::Pending { offset: 2 });
        assert_eq!(bundler.len(), 2);
    }

    #[test]
    fn test_seal_fixes_header_and_addresses() {
        let mut bundler = Bundler::with_comment("hello");
        let first = bundler.add_container(Behavior::Directory).unwrap();
        assert_eq!(bundler.resolve(first), Err(BundlerError::NotSealed));
        assert_eq!(bundler.bytes(), Err(BundlerError::NotSealed));

        let sealed = bundler.seal(info(77)).unwrap();
        assert_eq!(sealed.comment.as_deref(), Some("hello"));
        assert_eq!(bundler.resolve(first).unwrap(), Muid::new(200, 77, 1));

        let parsed = ParsedBundle::decode(bundler.bytes().unwrap()).unwrap();
        assert_eq!(parsed.info, sealed);
        assert_eq!(parsed.proto.changes.len(), 1);
    }

    #[test]
    fn test_seal_is_one_shot() {
        let mut bundler = Bundler::new();
        bundler.seal(info(1)).unwrap();
        assert_eq!(bundler.seal(info(1)), Err(BundlerError::AlreadySealed));
        assert_eq!(bundler.add_container(Behavior::Box), Err(BundlerError::AlreadySealed));
        assert_eq!(
            bundler.remove_change(Address::Pending { offset: 1 }),
            Err(BundlerError::AlreadySealed)
        );
    }

    #[test]
    fn test_medallion_mismatch() {
        let mut bundler = Bundler::new().with_medallion(5);
        assert_eq!(bundler.medallion(), Some(5));
        assert_eq!(
            bundler.seal(info(6)),
            Err(BundlerError::MedallionMismatch { expected: 5, got: 6 })
        );
        assert!(!bundler.is_sealed());
        assert!(bundler.seal(info(5)).is_ok());
    }

    #[test]
    fn test_remove_change_keeps_other_offsets() {
        let mut bundler = Bundler::new();
        let a = bundler.add_container(Behavior::Box).unwrap();
        bundler.add_container(Behavior::Box).unwrap();
        bundler.remove_change(a).unwrap();
        let c = bundler.add_container(Behavior::Box).unwrap();
        assert_eq!(c.offset(), 3);

        bundler.seal(info(1)).unwrap();
        let parsed = ParsedBundle::decode(bundler.bytes().unwrap()).unwrap();
        assert_eq!(parsed.proto.changes.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    }
}
