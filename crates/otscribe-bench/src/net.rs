//! Channel establishment and the readiness barrier.
//!
//! Party 1 listens on `port + i` for each channel `i`; party 2 connects
//! to the same ports, retrying while party 1 comes up.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use otscribe_core::{TcpTransport, Transport};
use otscribe_engine::Role;

use crate::config::NetworkConfig;
use crate::harness::BenchError;

/// Bytes party 1 writes once it is ready to start timing.
pub const READY: &[u8; 2] = b"OK";

/// Open `count` channels on consecutive ports starting at `port`.
pub async fn open_channels(
    role: Role,
    port: u16,
    count: usize,
    net: &NetworkConfig,
) -> Result<Vec<TcpTransport>, BenchError> {
    let ports = port_range(port, count)?;
    match role {
        Role::Alice => {
            let mut listeners = Vec::with_capacity(count);
            for p in ports {
                let listener = TcpListener::bind((net.listen_host.as_str(), p))
                    .await
                    .map_err(|source| BenchError::Listen {
                        addr: format!("{}:{p}", net.listen_host),
                        source,
                    })?;
                listeners.push(listener);
            }
            tracing::info!(port, count, "listening for party 2");
            accept_all(listeners, net.nodelay).await
        }
        Role::Bob => connect_all(&net.peer_host, ports, net).await,
    }
}

/// Accept one connection on each listener, in order.
pub async fn accept_all(
    listeners: Vec<TcpListener>,
    nodelay: bool,
) -> Result<Vec<TcpTransport>, BenchError> {
    let mut channels = Vec::with_capacity(listeners.len());
    for (index, listener) in listeners.into_iter().enumerate() {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(nodelay)?;
        tracing::debug!(index, %peer, "channel accepted");
        channels.push(TcpTransport::new(stream));
    }
    Ok(channels)
}

/// Connect to `host` on each port, in order.
pub async fn connect_all(
    host: &str,
    ports: impl IntoIterator<Item = u16>,
    net: &NetworkConfig,
) -> Result<Vec<TcpTransport>, BenchError> {
    let mut channels = Vec::new();
    for (index, port) in ports.into_iter().enumerate() {
        let stream = connect_with_retry(host, port, net).await?;
        stream.set_nodelay(net.nodelay)?;
        tracing::debug!(index, host, port, "channel connected");
        channels.push(TcpTransport::new(stream));
    }
    Ok(channels)
}

async fn connect_with_retry(
    host: &str,
    port: u16,
    net: &NetworkConfig,
) -> Result<TcpStream, BenchError> {
    let retry = Duration::from_millis(net.connect_retry_ms);
    let mut attempt = 1;
    loop {
        match TcpStream::connect((host, port)).await {
            Ok(stream) => return Ok(stream),
            Err(source) if attempt >= net.connect_attempts => {
                return Err(BenchError::Connect {
                    addr: format!("{host}:{port}"),
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => {
                tracing::trace!(host, port, attempt, error = %e, "connect failed, retrying");
                attempt += 1;
                tokio::time::sleep(retry).await;
            }
        }
    }
}

fn port_range(base: u16, count: usize) -> Result<Vec<u16>, BenchError> {
    (0..count)
        .map(|i| {
            u16::try_from(i)
                .ok()
                .and_then(|i| base.checked_add(i))
                .ok_or(BenchError::PortRange { base, count })
        })
        .collect()
}

/// Party 1 signals readiness, party 2 waits for it. Runs on an unhashed
/// transport so the barrier stays out of the transcript.
pub async fn sync_ready<T: Transport>(role: Role, raw: &mut T) -> Result<(), BenchError> {
    match role {
        Role::Alice => {
            raw.send(READY).await?;
            raw.flush().await?;
        }
        Role::Bob => {
            let mut buf = [0u8; 2];
            raw.receive(&mut buf).await?;
            if &buf != READY {
                return Err(BenchError::Handshake(buf));
            }
        }
    }
    tracing::debug!(party = role.party(), "peer ready");
    Ok(())
}
