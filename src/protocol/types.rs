//! Memcached ASCII Protocol Command Types
//!
//! This module defines the commands the client writes to the server and
//! their wire encoding. Every command is a single line terminated by CRLF;
//! storage commands are followed by a data block and another CRLF.
//!
//! ## Wire Format
//!
//! ```text
//! get <key>\r\n
//! gets <key>\r\n
//! set <key> <flags> <exptime> <bytes>\r\n<data>\r\n
//! cas <key> <flags> <exptime> <bytes> <cas unique>\r\n<data>\r\n
//! delete <key>\r\n
//! version\r\n
//! stats\r\n
//! lru_crawler metadump all\r\n
//! ```

use std::fmt;

/// The CRLF terminator used by the text protocol
pub const CRLF: &[u8] = b"\r\n";

/// Terminator line for multi-line replies
pub const END: &str = "END";

/// Largest seconds value the server treats as relative (30 days).
pub const MAX_RELATIVE_EXPIRATION: i32 = 2_592_000;

/// A command issued by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `get <key>`
    Get { key: &'a str },

    /// `gets <key>`, returns the CAS unique alongside the value
    Gets { key: &'a str },

    /// `set <key> <flags> <exptime> <bytes>`
    Set {
        key: &'a str,
        flags: u32,
        exptime: i32,
        data: &'a [u8],
    },

    /// `cas <key> <flags> <exptime> <bytes> <cas unique>`
    Cas {
        key: &'a str,
        flags: u32,
        exptime: i32,
        data: &'a [u8],
        cas: u64,
    },

    /// `delete <key>`
    Delete { key: &'a str },

    /// `version`
    Version,

    /// `stats`
    Stats,

    /// `lru_crawler metadump all`
    MetadumpAll,
}

impl Command<'_> {
    /// Serializes the command to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the command into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Command::Get { key } => {
                buf.extend_from_slice(b"get ");
                buf.extend_from_slice(key.as_bytes());
            }
            Command::Gets { key } => {
                buf.extend_from_slice(b"gets ");
                buf.extend_from_slice(key.as_bytes());
            }
            Command::Set {
                key,
                flags,
                exptime,
                data,
            } => {
                buf.extend_from_slice(
                    format!("set {} {} {} {}", key, flags, exptime, data.len()).as_bytes(),
                );
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
            }
            Command::Cas {
                key,
                flags,
                exptime,
                data,
                cas,
            } => {
                buf.extend_from_slice(
                    format!("cas {} {} {} {} {}", key, flags, exptime, data.len(), cas)
                        .as_bytes(),
                );
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
            }
            Command::Delete { key } => {
                buf.extend_from_slice(b"delete ");
                buf.extend_from_slice(key.as_bytes());
            }
            Command::Version => buf.extend_from_slice(b"version"),
            Command::Stats => buf.extend_from_slice(b"stats"),
            Command::MetadumpAll => buf.extend_from_slice(b"lru_crawler metadump all"),
        }
        buf.extend_from_slice(CRLF);
    }

    /// The command verb, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Gets { .. } => "gets",
            Command::Set { .. } => "set",
            Command::Cas { .. } => "cas",
            Command::Delete { .. } => "delete",
            Command::Version => "version",
            Command::Stats => "stats",
            Command::MetadumpAll => "lru_crawler metadump",
        }
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Get { key }
            | Command::Gets { key }
            | Command::Delete { key } => write!(f, "{} {}", self.name(), key),
            Command::Set { key, data, .. } | Command::Cas { key, data, .. } => {
                write!(f, "{} {} ({} bytes)", self.name(), key, data.len())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Returns true when `line` is one of the server's error replies.
pub fn is_error_line(line: &str) -> bool {
    line.starts_with("ERROR")
        || line.starts_with("CLIENT_ERROR")
        || line.starts_with("SERVER_ERROR")
}
