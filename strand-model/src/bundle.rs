//! Parsing sealed bundles

use crate::proto::BundleProto;
use crate::types::BundleInfo;
use crate::value::CodecError;
use prost::Message;

/// A decoded bundle together with its header summary.
#[derive(Debug, Clone)]
pub struct ParsedBundle {
    pub info: BundleInfo,
    pub proto: BundleProto,
}

impl ParsedBundle {
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let proto = BundleProto::decode(bytes)?;
        Ok(Self { info: BundleInfo::from_bundle(&proto), proto })
    }

    pub fn medallion_and_timestamp(&self) -> (i64, i64) {
        (self.info.medallion, self.info.timestamp)
    }
}

impl BundleInfo {
    pub fn from_bundle(proto: &BundleProto) -> Self {
        Self {
            medallion: proto.medallion,
            chain_start: proto.chain_start,
            timestamp: proto.timestamp,
            prior_time: (proto.previous_timestamp != 0).then_some(proto.previous_timestamp),
            comment: (!proto.comment.is_empty()).then(|| proto.comment.clone()),
        }
    }
}
