//! Sync message envelope

use crate::error::SyncError;
use prost::Message;
use strand_model::proto::{sync_message, Ack, Greeting, SyncMessage};
use strand_model::BundleInfo;

/// One message exchanged between peers.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    /// Sealed bundle bytes, passed through untouched.
    Bundle(Vec<u8>),
    Greeting(Greeting),
    Ack(Ack),
}

impl PeerMessage {
    pub fn ack(info: &BundleInfo) -> Self {
        PeerMessage::Ack(Ack {
            medallion: info.medallion,
            chain_start: info.chain_start,
            timestamp: info.timestamp,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let contents = match self {
            PeerMessage::Bundle(bytes) => sync_message::Contents::Bundle(bytes.clone()),
            PeerMessage::Greeting(g) => sync_message::Contents::Greeting(g.clone()),
            PeerMessage::Ack(a) => sync_message::Contents::Ack(*a),
        };
        SyncMessage { contents: Some(contents) }.encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        match SyncMessage::decode(bytes)?.contents {
            Some(sync_message::Contents::Bundle(b)) => Ok(PeerMessage::Bundle(b)),
            Some(sync_message::Contents::Greeting(g)) => Ok(PeerMessage::Greeting(g)),
            Some(sync_message::Contents::Ack(a)) => Ok(PeerMessage::Ack(a)),
            None => Err(SyncError::EmptyMessage),
        }
    }
}

/// Encode a bundle message without copying through `PeerMessage`.
pub fn bundle_message(bundle: &[u8]) -> Vec<u8> {
    SyncMessage {
        contents: Some(sync_message::Contents::Bundle(bundle.to_vec())),
    }
    .encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_model::proto::GreetingEntry;

    #[test]
    fn test_envelope_variants() {
        let greeting = PeerMessage::Greeting(Greeting {
            entries: vec![GreetingEntry { medallion: 1, chain_start: 2, seen_through: 3 }],
        });
        assert_eq!(PeerMessage::decode(&greeting.encode()).unwrap(), greeting);

        let bundle = vec![8, 1, 16, 2];
        assert_eq!(
            PeerMessage::decode(&bundle_message(&bundle)).unwrap(),
            PeerMessage::Bundle(bundle)
        );
    }

    #[test]
    fn test_empty_envelope_is_rejected() {
        assert!(matches!(PeerMessage::decode(&[]), Err(SyncError::EmptyMessage)));
        assert!(matches!(PeerMessage::decode(&[0xff]), Err(SyncError::Decode(_))));
    }
}
