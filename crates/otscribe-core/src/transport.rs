//! Transport capability — the byte pipe a protocol engine talks through.
//!
//! Anything that can send, receive and flush whole buffers is a
//! [`Transport`]. [`HashingChannel`](crate::HashingChannel) is itself a
//! transport, so it drops in wherever the engine expects one.
//!
//! Failures are plain `std::io::Error`. Nothing in this layer retries: a
//! broken pipe ends the run.

use std::future::Future;
use std::io;

use tokio::io::{
    duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream, DuplexStream,
};
use tokio::net::TcpStream;

/// Read/write buffer size for [`IoTransport`], per direction.
pub const IO_BUFFER_SIZE: usize = 64 * 1024;

/// A reliable, ordered, bidirectional byte transport.
///
/// `send` and `receive` move exactly `data.len()` bytes or fail.
/// `flush` pushes anything buffered locally onto the wire.
pub trait Transport: Send {
    fn send(&mut self, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    fn receive(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<()>> + Send;

    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

// ── IoTransport ───────────────────────────────────────────────────────────────

/// Buffered transport over any tokio stream.
///
/// Writes collect in a local buffer until `flush`, or until the next
/// `receive`: a party never waits for a reply while its own request is
/// still sitting in the buffer.
pub struct IoTransport<S> {
    io: BufStream<S>,
    unflushed: bool,
}

pub type TcpTransport = IoTransport<TcpStream>;

impl<S> IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            io: BufStream::with_capacity(IO_BUFFER_SIZE, IO_BUFFER_SIZE, stream),
            unflushed: false,
        }
    }
}

impl<S> Transport for IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.io.write_all(data).await?;
        self.unflushed = true;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.unflushed {
            self.flush().await?;
        }
        self.io.read_exact(buf).await?;
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.io.flush().await?;
        self.unflushed = false;
        Ok(())
    }
}

/// Two connected in-memory transports. `capacity` bounds the bytes in
/// flight per direction, like a socket buffer.
pub fn duplex_pair(capacity: usize) -> (IoTransport<DuplexStream>, IoTransport<DuplexStream>) {
    let (a, b) = duplex(capacity);
    (IoTransport::new(a), IoTransport::new(b))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
