//! Strand networking
//!
//! Carries sync messages between instances as length-delimited frames over
//! TCP or any other `AsyncRead`/`AsyncWrite` pair.

pub mod connection;
pub mod error;
pub mod framing;
pub mod tcp;

pub use connection::{serve_connection, OUTBOUND_CAPACITY};
pub use error::NetError;
pub use framing::{MessageSink, MessageStream, MAX_FRAME_LENGTH};
pub use tcp::{connect, serve};
