//! Error types shared by every component of the crate.

use crate::codec::Compression;
use crate::protocol::ParseError;
use thiserror::Error;

/// Errors surfaced by the server-interaction layer.
///
/// Nothing in the crate retries or recovers silently: every variant reaches
/// the immediate caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed `host:port` string
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    /// Connect/read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Deadline exceeded
    #[error("operation timed out")]
    Timeout,

    /// The caller's cancellation scope fired
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Key absent on the server
    #[error("cache miss")]
    CacheMiss,

    /// The item changed or disappeared between the bound read and the write
    #[error("compare-and-swap conflict on key {0:?}")]
    CasConflict(String),

    /// Caller supplied something the operation cannot use
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The server answered with an `ERROR`, `CLIENT_ERROR` or `SERVER_ERROR` line
    #[error("server error: {0}")]
    Server(String),

    /// Magic bytes matched but the decoder rejected the body
    #[error("{format} decompression failed: {source}")]
    DecompressionFailed {
        format: Compression,
        #[source]
        source: std::io::Error,
    },

    /// Detected server version is older than the metadump minimum
    #[error("unsupported server version {0} (lru_crawler metadump requires 1.4.31+)")]
    UnsupportedVersion(String),

    /// The `stats` reply carried no usable version line
    #[error("version detection failed: {0}")]
    DetectionFailed(String),

    /// Reply on a pooled connection did not match the protocol
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// Profile-store validation failure
    #[error("config error: {0}")]
    Config(String),

    /// Profile file could not be parsed or serialized
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Returns true for timeout and cancellation, the errors that take
    /// precedence over I/O failures.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Error::Timeout | Error::Cancelled(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
