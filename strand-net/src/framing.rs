//! Length-prefixed frames over any ordered byte stream.
//!
//! Each frame carries one encoded sync message; decoding is left to the
//! instance so bundles pass through as raw bytes.

use crate::error::NetError;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

pub struct MessageSink<W> {
    inner: FramedWrite<W, LengthDelimitedCodec>,
}

impl<W: AsyncWrite + Unpin> MessageSink<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: FramedWrite::new(writer, codec()) }
    }

    pub async fn send(&mut self, frame: Vec<u8>) -> Result<(), NetError> {
        self.inner.send(Bytes::from(frame)).await?;
        Ok(())
    }

    /// Flush and shut down the write half.
    pub async fn close(mut self) -> Result<(), NetError> {
        SinkExt::<Bytes>::close(&mut self.inner).await?;
        Ok(())
    }
}

pub struct MessageStream<R> {
    inner: FramedRead<R, LengthDelimitedCodec>,
}

impl<R: AsyncRead + Unpin> MessageStream<R> {
    pub fn new(reader: R) -> Self {
        Self { inner: FramedRead::new(reader, codec()) }
    }

    /// Next frame, or `None` once the remote has closed.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, NetError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes.to_vec())),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}
