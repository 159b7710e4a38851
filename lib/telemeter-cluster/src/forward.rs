//! The reliable, point-to-point side of cluster forwarding: a small TCP
//! server that accepts one framed message per connection and queues it for
//! the local dispatcher, and a client that opens one such connection to
//! push a batch to a peer. Gossip (membership) and forwarding (data) are
//! deliberately separate transports here — UDP gossip tolerates lost
//! packets by design, but a forwarded batch is exactly the data the spec
//! asks to deliver reliably, so it rides TCP instead of piggybacking on
//! foca's best-effort datagrams.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::protocol::{self, MetricMessage};

/// Bound on how many forwarded batches may be queued for the local
/// dispatcher before new ones are dropped.
pub const DISPATCH_QUEUE_CAPACITY: usize = 100;

const MAX_FORWARD_MESSAGE_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Debug, snafu::Snafu)]
pub enum ForwardTransportError {
    #[snafu(display("failed to connect to peer {addr}: {source}"))]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("failed to send the forwarded batch to {addr}: {source}"))]
    Send {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Sends one framed batch to `addr` over a fresh TCP connection, per the
/// `0x01 | msgpack(header) | snappy(proto-delim)` wire format.
pub async fn send(addr: SocketAddr, wire: &[u8]) -> Result<(), ForwardTransportError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ForwardTransportError::Connect { addr, source })?;
    let len = wire.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|source| ForwardTransportError::Send { addr, source })?;
    stream
        .write_all(wire)
        .await
        .map_err(|source| ForwardTransportError::Send { addr, source })?;
    stream
        .shutdown()
        .await
        .map_err(|source| ForwardTransportError::Send { addr, source })?;
    Ok(())
}

/// Counters the receiving side exposes for observability.
#[derive(Debug, Default)]
pub struct ReceiveCounters {
    pub dropped_queue_full: std::sync::atomic::AtomicU64,
    pub decode_errors: std::sync::atomic::AtomicU64,
}

/// Binds `addr` and spawns the accept loop, returning the dispatcher's
/// receiving half. The dispatcher task itself (which calls `Store::write`)
/// is the caller's responsibility, kept separate so the store type doesn't
/// have to be known by this module.
pub async fn spawn_receiver(
    addr: SocketAddr,
    counters: std::sync::Arc<ReceiveCounters>,
) -> std::io::Result<mpsc::Receiver<MetricMessage>> {
    let listener = TcpListener::bind(addr).await?;
    let (tx, rx) = mpsc::channel(DISPATCH_QUEUE_CAPACITY);

    tokio::spawn(async move {
        loop {
            let (stream, _peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::warn!(%error, "cluster forward listener accept failed");
                    continue;
                }
            };
            let tx = tx.clone();
            let counters = counters.clone();
            tokio::spawn(async move {
                if let Err(error) = handle_connection(stream, &tx, &counters).await {
                    tracing::debug!(%error, "cluster forward connection ended with an error");
                }
            });
        }
    });

    Ok(rx)
}

async fn handle_connection(
    mut stream: TcpStream,
    tx: &mpsc::Sender<MetricMessage>,
    counters: &ReceiveCounters,
) -> std::io::Result<()> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FORWARD_MESSAGE_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "forwarded message exceeds the maximum accepted size",
        ));
    }

    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;

    match protocol::decode(&body) {
        Ok(message) => {
            if tx.try_send(message).is_err() {
                counters
                    .dropped_queue_full
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
        Err(error) => {
            counters
                .decode_errors
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::warn!(%error, "failed to decode a forwarded cluster message");
        }
    }
    Ok(())
}
