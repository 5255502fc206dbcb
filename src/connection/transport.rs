//! Raw Text-Protocol Transport
//!
//! Some commands are not request/reply exchanges a pooled connection can
//! serve: `stats` returns an open-ended list and `lru_crawler metadump`
//! streams for as long as the crawler runs. These go over a fresh socket
//! that is opened, used for exactly one command, and closed.
//!
//! ```text
//! connect (connect_timeout)
//!    │
//!    ▼
//! write "<command>\r\n" ─┐
//!    │                   │ one deadline:
//!    ▼                   │ min(now + timeout, scope deadline)
//! read lines until END ──┘
//! ```
//!
//! Cancellation and the deadline are checked alongside every socket
//! operation; whichever fires first wins over a pending I/O result.

use crate::address::ServerAddress;
use crate::error::{Error, Result};
use crate::protocol::{is_error_line, ParseError, CRLF, END};
use crate::scope::CancelScope;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

/// Longest reply line accepted, terminator included
pub(crate) const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Configuration for the raw transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on establishing the TCP connection (default: 3s)
    pub connect_timeout: Duration,

    /// Bound on writing the command and reading the whole reply (default: 3s)
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            timeout: Duration::from_secs(3),
        }
    }
}

/// Single-request transport: one fresh socket per command.
#[derive(Debug, Clone, Default)]
pub struct RawTransport {
    config: TransportConfig,
}

impl RawTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Runs `command` and returns the reply lines.
    ///
    /// Lines come back with `\r` stripped; empty lines and the closing `END`
    /// are elided. An `ERROR`/`CLIENT_ERROR`/`SERVER_ERROR` line ends the
    /// exchange with [`Error::Server`] carrying that line.
    pub async fn execute(
        &self,
        addr: &ServerAddress,
        command: &str,
        scope: &CancelScope,
    ) -> Result<Vec<String>> {
        if command.contains(['\r', '\n']) {
            return Err(Error::InvalidArgument(
                "command must be a single line".to_string(),
            ));
        }
        if let Some(reason) = scope.reason() {
            return Err(Error::Cancelled(reason));
        }

        let stream = dial(addr, self.config.connect_timeout, scope).await?;
        let deadline = scope.effective_deadline(self.config.timeout);
        let lines = interruptible(exchange(stream, command), deadline, scope).await?;

        debug!(server = %addr, command, lines = lines.len(), "Raw command complete");
        Ok(lines)
    }
}

async fn exchange(stream: TcpStream, command: &str) -> Result<Vec<String>> {
    let mut reader = BufReader::new(stream);

    let mut request = Vec::with_capacity(command.len() + 2);
    request.extend_from_slice(command.as_bytes());
    request.extend_from_slice(CRLF);
    reader.get_mut().write_all(&request).await?;
    reader.get_mut().flush().await?;

    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        let line = match read_line(&mut reader, &mut buf).await? {
            Some(line) => line,
            None => return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into())),
        };

        if line.is_empty() {
            continue;
        }
        if line == END {
            return Ok(lines);
        }
        if is_error_line(&line) {
            return Err(Error::Server(line));
        }
        lines.push(line);
    }
}

/// Opens a TCP connection bounded by `connect_timeout` and the scope.
pub(crate) async fn dial(
    addr: &ServerAddress,
    connect_timeout: Duration,
    scope: &CancelScope,
) -> Result<TcpStream> {
    let deadline = scope.effective_deadline(connect_timeout);
    let stream = interruptible(
        async { Ok::<_, Error>(TcpStream::connect(addr.as_str()).await?) },
        deadline,
        scope,
    )
    .await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Races `fut` against the scope and `deadline`.
///
/// Cancellation is polled first, then the deadline, so an interrupt always
/// takes precedence over an I/O result that becomes ready at the same time.
pub(crate) async fn interruptible<F, T>(fut: F, deadline: Instant, scope: &CancelScope) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        reason = scope.cancelled() => Err(Error::Cancelled(reason)),
        _ = tokio::time::sleep_until(deadline) => Err(Error::Timeout),
        result = fut => result,
    }
}

/// Reads one line, stripping the trailing `\n` and `\r`. `None` at EOF.
///
/// A line longer than [`MAX_LINE_LENGTH`] is a protocol error.
pub(crate) async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut limited = (&mut *reader).take(MAX_LINE_LENGTH as u64);
    let n = limited.read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if n == MAX_LINE_LENGTH && buf.last() != Some(&b'\n') {
        return Err(Error::Protocol(ParseError::ProtocolError(format!(
            "reply line exceeds {} bytes",
            MAX_LINE_LENGTH
        ))));
    }

    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    Ok(Some(String::from_utf8_lossy(&buf[..end]).into_owned()))
}
