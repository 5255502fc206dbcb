//! Incremental Storage-Reply Parser
//!
//! This module parses the replies to `get`, `gets`, `set`, `cas`, `delete`
//! and `version` as they arrive on a pooled connection.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((response, consumed)))` - Parsed a complete reply, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the reply is incomplete
//! - `Err(ParseError)` - Data that does not match the protocol
//!
//! The caller appends network data to a buffer, calls [`parse_response`],
//! and advances the buffer by `consumed` on success.
//!
//! ## Reply Shapes
//!
//! ```text
//! VALUE <key> <flags> <bytes> [<cas unique>]\r\n<data>\r\n ... END\r\n
//! STORED | NOT_STORED | EXISTS | NOT_FOUND | DELETED | TOUCHED | OK\r\n
//! VERSION <version>\r\n
//! ERROR | CLIENT_ERROR <msg> | SERVER_ERROR <msg>\r\n
//! ```

use crate::protocol::types::{is_error_line, CRLF, END};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing a server reply.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Invalid integer in a reply header
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a reply line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Reply line not recognised at all
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Metadump line without a usable key
    #[error("metadump line has no key")]
    MissingKey,

    /// Protocol violation (missing CRLF, malformed header, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The value exceeds the maximum accepted size
    #[error("value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single value block (the server caps items well below this)
pub const MAX_VALUE_SIZE: usize = 128 * 1024 * 1024;

/// Status-only replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Touched,
    Ok,
    /// `ERROR`, `CLIENT_ERROR ...` or `SERVER_ERROR ...`, kept verbatim
    Error(String),
}

impl Status {
    /// The reply line as the server sent it.
    pub fn as_line(&self) -> &str {
        match self {
            Status::Stored => "STORED",
            Status::NotStored => "NOT_STORED",
            Status::Exists => "EXISTS",
            Status::NotFound => "NOT_FOUND",
            Status::Deleted => "DELETED",
            Status::Touched => "TOUCHED",
            Status::Ok => "OK",
            Status::Error(line) => line,
        }
    }
}

/// One `VALUE` block of a retrieval reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub key: String,
    pub flags: u32,
    /// Present only in replies to `gets`
    pub cas: Option<u64>,
    pub data: Bytes,
}

/// A complete server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Zero or more values terminated by `END`
    Values(Vec<Value>),
    Status(Status),
    Version(String),
}

/// Attempts to parse one complete reply from the buffer.
pub fn parse_response(buf: &[u8]) -> ParseResult<Option<(Response, usize)>> {
    let pos = match find_crlf(buf) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let line = &buf[..pos];
    if line.starts_with(b"VALUE ") || line == END.as_bytes() {
        return parse_values(buf);
    }

    let text = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    let consumed = pos + 2;

    let status = match text {
        "STORED" => Status::Stored,
        "NOT_STORED" => Status::NotStored,
        "EXISTS" => Status::Exists,
        "NOT_FOUND" => Status::NotFound,
        "DELETED" => Status::Deleted,
        "TOUCHED" => Status::Touched,
        "OK" => Status::Ok,
        t if t.starts_with("VERSION ") => {
            return Ok(Some((Response::Version(t[8..].trim().to_string()), consumed)));
        }
        t if is_error_line(t) => Status::Error(t.to_string()),
        other => return Err(ParseError::UnexpectedReply(other.to_string())),
    };

    Ok(Some((Response::Status(status), consumed)))
}

/// Parses `VALUE` blocks up to and including the closing `END`.
fn parse_values(buf: &[u8]) -> ParseResult<Option<(Response, usize)>> {
    let mut values = Vec::new();
    let mut offset = 0;

    loop {
        let pos = match find_crlf(&buf[offset..]) {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let line = &buf[offset..offset + pos];

        if line == END.as_bytes() {
            return Ok(Some((Response::Values(values), offset + pos + 2)));
        }

        let header = parse_value_header(line)?;
        if header.len > MAX_VALUE_SIZE {
            return Err(ParseError::ValueTooLarge {
                size: header.len,
                max: MAX_VALUE_SIZE,
            });
        }

        let data_start = offset + pos + 2;
        let total_needed = data_start + header.len + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + header.len..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "value block missing trailing CRLF".to_string(),
            ));
        }

        values.push(Value {
            key: header.key,
            flags: header.flags,
            cas: header.cas,
            data: Bytes::copy_from_slice(&buf[data_start..data_start + header.len]),
        });
        offset = total_needed;
    }
}

struct ValueHeader {
    key: String,
    flags: u32,
    len: usize,
    cas: Option<u64>,
}

/// `VALUE <key> <flags> <bytes> [<cas unique>]`
fn parse_value_header(line: &[u8]) -> ParseResult<ValueHeader> {
    let text = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    let mut parts = text.split(' ');

    if parts.next() != Some("VALUE") {
        return Err(ParseError::ProtocolError(format!(
            "expected VALUE header, got {:?}",
            text
        )));
    }

    let key = parts
        .next()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ParseError::ProtocolError("VALUE header missing key".to_string()))?;
    let flags = parse_int::<u32>(parts.next(), "flags")?;
    let len = parse_int::<usize>(parts.next(), "bytes")?;
    let cas = match parts.next() {
        Some(raw) => Some(parse_int::<u64>(Some(raw), "cas")?),
        None => None,
    };

    Ok(ValueHeader {
        key: key.to_string(),
        flags,
        len,
        cas,
    })
}

fn parse_int<T: std::str::FromStr>(field: Option<&str>, name: &str) -> ParseResult<T> {
    let raw = field
        .ok_or_else(|| ParseError::ProtocolError(format!("VALUE header missing {}", name)))?;
    raw.parse()
        .map_err(|_| ParseError::InvalidInteger(format!("{}={}", name, raw)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
