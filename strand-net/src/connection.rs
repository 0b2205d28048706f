//! Driving one peer connection.

use crate::error::NetError;
use crate::framing::{MessageSink, MessageStream};
use std::sync::Arc;
use strand_kernel::Instance;
use strand_sync::PeerLink;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Frames queued for one peer before it is treated as stalled and dropped.
pub const OUTBOUND_CAPACITY: usize = 1024;

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// Queues frames for the connection's writer task. A full queue cancels
/// the connection rather than blocking the instance.
struct ChannelLink {
    tx: mpsc::Sender<Outbound>,
    shutdown: CancellationToken,
}

impl ChannelLink {
    fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();
        (Self { tx, shutdown: shutdown.clone() }, rx, shutdown)
    }
}

impl PeerLink for ChannelLink {
    fn send(&self, bytes: Vec<u8>) {
        match self.tx.try_send(Outbound::Frame(bytes)) {
            Ok(()) => {}
            // The writer is gone once the connection is closing.
            Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                if !self.shutdown.is_cancelled() {
                    warn!(capacity = self.tx.max_capacity(), "outbound queue full, dropping peer");
                }
                self.shutdown.cancel();
            }
        }
    }

    fn close(&self) {
        if self.tx.try_send(Outbound::Close).is_err() {
            self.shutdown.cancel();
        }
    }
}

async fn write_frames<W>(
    mut sink: MessageSink<W>,
    mut rx: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = rx.recv() => message,
        };
        match message {
            Some(Outbound::Frame(frame)) => sink.send(frame).await?,
            Some(Outbound::Close) | None => break,
        }
    }
    sink.close().await
}

/// Attach a byte stream to `instance` and run it until either side closes.
///
/// Protocol errors close the connection and are returned; a clean remote
/// close returns `Ok`. A peer that lets `OUTBOUND_CAPACITY` frames pile up
/// is disconnected.
pub async fn serve_connection<R, W>(instance: Arc<Instance>, reader: R, writer: W) -> Result<(), NetError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (link, rx, shutdown) = ChannelLink::new(OUTBOUND_CAPACITY);
    let writer = tokio::spawn(write_frames(MessageSink::new(writer), rx, shutdown.clone()));
    let id = instance.on_connection(Arc::new(link)).await;

    let mut stream = MessageStream::new(reader);
    let result = loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => {
                break Err(NetError::Connection("peer fell behind on outbound frames".into()));
            }
            received = stream.recv() => received,
        };
        match received {
            Ok(Some(frame)) => {
                if let Err(e) = instance.on_message(id, &frame).await {
                    break Err(NetError::from(e));
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    instance.on_close(id).await;

    match writer.await {
        Ok(Err(e)) => debug!(connection = id, error = %e, "writer stopped"),
        Err(e) => warn!(connection = id, error = %e, "writer task failed"),
        Ok(Ok(())) => {}
    }
    debug!(connection = id, ok = result.is_ok(), "connection finished");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_queue_cancels_connection() {
        let (link, mut rx, shutdown) = ChannelLink::new(2);
        link.send(vec![1]);
        link.send(vec![2]);
        assert!(!shutdown.is_cancelled());

        link.send(vec![3]);
        assert!(shutdown.is_cancelled());

        // Frames queued before the overflow are still there; the extra one is not.
        assert!(matches!(rx.recv().await, Some(Outbound::Frame(f)) if f == vec![1]));
        assert!(matches!(rx.recv().await, Some(Outbound::Frame(f)) if f == vec![2]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_queues_after_pending_frames() {
        let (link, mut rx, shutdown) = ChannelLink::new(4);
        link.send(vec![7]);
        link.close();
        assert!(!shutdown.is_cancelled());
        assert!(matches!(rx.recv().await, Some(Outbound::Frame(_))));
        assert!(matches!(rx.recv().await, Some(Outbound::Close)));
    }

    #[tokio::test]
    async fn test_writer_stops_on_cancel() {
        let (link, rx, shutdown) = ChannelLink::new(1);
        let (near, far) = tokio::io::duplex(1024);
        let writer = tokio::spawn(write_frames(MessageSink::new(near), rx, shutdown.clone()));

        link.send(vec![1]);
        link.send(vec![2]);
        link.send(vec![3]);
        assert!(shutdown.is_cancelled());
        writer.await.unwrap().unwrap();

        // The stream ends once the writer is gone.
        let mut stream = MessageStream::new(far);
        while let Some(_frame) = stream.recv().await.unwrap() {}
    }
}
