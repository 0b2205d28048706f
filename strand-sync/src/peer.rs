//! Per-connection peer state

use crate::chain_tracker::ChainTracker;
use crate::error::SyncError;
use crate::message::{bundle_message, PeerMessage};
use std::sync::Arc;
use strand_model::BundleInfo;
use tracing::debug;

/// Send/close capability supplied by the transport.
///
/// `send` must not block: implementations queue the bytes and return.
pub trait PeerLink: Send + Sync {
    fn send(&self, bytes: Vec<u8>);
    fn close(&self);
}

/// What we know about one remote instance.
pub struct Peer {
    link: Arc<dyn PeerLink>,
    remote: Option<ChainTracker>,
    closed: bool,
}

impl Peer {
    pub fn new(link: Arc<dyn PeerLink>) -> Self {
        Self { link, remote: None, closed: false }
    }

    /// True once the remote's greeting has arrived.
    pub fn is_ready(&self) -> bool {
        self.remote.is_some()
    }

    pub fn remote(&self) -> Option<&ChainTracker> {
        self.remote.as_ref()
    }

    pub fn receive_greeting(&mut self, tracker: ChainTracker) -> Result<(), SyncError> {
        if self.remote.is_some() {
            return Err(SyncError::DuplicateGreeting);
        }
        self.remote = Some(tracker);
        Ok(())
    }

    pub fn send_greeting(&self, ours: &ChainTracker) {
        self.send(PeerMessage::Greeting(ours.to_greeting()).encode());
    }

    /// Forward a bundle if the remote lacks it and it extends what the
    /// remote has without a gap. Returns whether it was sent.
    pub fn send_if_needed(&mut self, bundle: &[u8], info: &BundleInfo) -> Result<bool, SyncError> {
        let Some(remote) = self.remote.as_mut() else {
            return Ok(false);
        };
        if !remote.mark_as_having(info, true)? {
            return Ok(false);
        }
        debug!(bundle = %info, "forwarding bundle");
        self.send(bundle_message(bundle));
        Ok(true)
    }

    pub fn send_ack(&self, info: &BundleInfo) {
        self.send(PeerMessage::ack(info).encode());
    }

    /// The remote confirmed it has `info`.
    pub fn mark_acked(&mut self, info: &BundleInfo) -> bool {
        match self.remote.as_mut() {
            Some(remote) => remote.mark_seen(info),
            None => false,
        }
    }

    fn send(&self, bytes: Vec<u8>) {
        if !self.closed {
            self.link.send(bytes);
        }
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.remote = None;
            self.link.close();
        }
    }
}
