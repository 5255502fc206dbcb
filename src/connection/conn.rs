//! Persistent Request/Reply Connection
//!
//! A [`Connection`] owns one socket to the server and a read buffer. It
//! writes a [`Command`], then reads until [`parse_response`] yields a
//! complete reply. TCP is a stream protocol, so a read may return part of a
//! reply or more than one; the `BytesMut` buffer accumulates data across
//! reads and only the consumed prefix is dropped.
//!
//! Connections are checked in and out of the [`Pool`](super::Pool). A
//! connection whose exchange failed half-way is never returned to the pool:
//! its buffer state is unknown, so it is dropped and the socket closed.

use crate::error::{Error, Result};
use crate::protocol::{parse_response, Command, ParseError, Response};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::trace;

/// Maximum size for the read buffer (a reply may carry one full item)
const MAX_BUFFER_SIZE: usize = 130 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Client-side counters shared by every connection to one server.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections opened
    pub connections_opened: AtomicU64,
    /// Currently open connections (idle or in use)
    pub active_connections: AtomicU64,
    /// Total commands sent
    pub commands_sent: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// One request/reply connection to the server.
pub struct Connection<S = TcpStream> {
    stream: BufWriter<S>,
    peer: String,
    buffer: BytesMut,
    stats: Arc<ConnectionStats>,
}

impl Connection<TcpStream> {
    /// Connects to `addr`. The caller bounds this with its connect timeout.
    pub async fn connect(addr: &str, stats: Arc<ConnectionStats>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|a: SocketAddr| a.to_string())
            .unwrap_or_else(|_| addr.to_string());
        Ok(Connection::new(stream, peer, stats))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already-connected stream.
    pub fn new(stream: S, peer: impl Into<String>, stats: Arc<ConnectionStats>) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            peer: peer.into(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            stats,
        }
    }

    /// The remote address, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Sends `command` and waits for its complete reply.
    pub async fn request(&mut self, command: &Command<'_>) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    async fn send_command(&mut self, command: &Command<'_>) -> Result<()> {
        let bytes = command.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.command_sent();
        self.stats.bytes_written(bytes.len());
        trace!(server = %self.peer, command = %command, bytes = bytes.len(), "Sent command");
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if !self.buffer.is_empty() {
                if let Some((response, consumed)) = parse_response(&self.buffer)? {
                    self.buffer.advance(consumed);
                    trace!(
                        server = %self.peer,
                        consumed = consumed,
                        remaining = self.buffer.len(),
                        "Parsed reply"
                    );
                    return Ok(response);
                }
            }
            self.read_more_data().await?;
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<()> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            return Err(Error::Protocol(ParseError::ValueTooLarge {
                size: self.buffer.len(),
                max: MAX_BUFFER_SIZE,
            }));
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }

        self.stats.bytes_read(n);
        trace!(server = %self.peer, bytes = n, "Read data");
        Ok(())
    }

    /// True when no unconsumed reply bytes remain, the condition for reuse.
    pub fn is_clean(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}
