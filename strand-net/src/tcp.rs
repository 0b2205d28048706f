//! TCP listener and dialer.

use crate::connection::serve_connection;
use crate::error::NetError;
use std::net::SocketAddr;
use std::sync::Arc;
use strand_kernel::Instance;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{info, warn};

fn spawn_stream(instance: Arc<Instance>, stream: TcpStream, remote: SocketAddr) -> JoinHandle<Result<(), NetError>> {
    tokio::spawn(async move {
        let (reader, writer) = stream.into_split();
        let result = serve_connection(instance, reader, writer).await;
        if let Err(e) = &result {
            warn!(%remote, error = %e, "connection closed with error");
        }
        result
    })
}

/// Accept peers forever, one task per connection.
pub async fn serve(listener: TcpListener, instance: Arc<Instance>) -> Result<(), NetError> {
    info!(addr = %listener.local_addr()?, "accepting peers");
    loop {
        let (stream, remote) = listener.accept().await?;
        info!(%remote, "peer connected");
        spawn_stream(instance.clone(), stream, remote);
    }
}

/// Dial a peer and serve the connection in the background.
pub async fn connect(
    addr: impl ToSocketAddrs,
    instance: Arc<Instance>,
) -> Result<JoinHandle<Result<(), NetError>>, NetError> {
    let stream = TcpStream::connect(addr).await?;
    let remote = stream.peer_addr()?;
    info!(%remote, "connected to peer");
    Ok(spawn_stream(instance, stream, remote))
}
