//! Items as seen by the viewer and editor.

use crate::codec::{self, Compression};
use crate::error::{Error, Result};
use crate::protocol::{Value, MAX_RELATIVE_EXPIRATION};
use bytes::Bytes;
use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Set-time expiration, passed to the server unchanged.
///
/// The server reads the number in one of three ways:
/// - `0`: never expires
/// - `1..=2_592_000`: seconds from now
/// - anything larger: absolute Unix timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExpirationSpec(pub i32);

/// How the server interprets an [`ExpirationSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationKind {
    Never,
    Relative(i32),
    Absolute(i64),
}

impl ExpirationSpec {
    pub const NEVER: ExpirationSpec = ExpirationSpec(0);

    pub fn kind(self) -> ExpirationKind {
        match self.0 {
            0 => ExpirationKind::Never,
            // negative values expire immediately on the server
            n if n <= MAX_RELATIVE_EXPIRATION => ExpirationKind::Relative(n),
            n => ExpirationKind::Absolute(i64::from(n)),
        }
    }

    /// Absolute expiry in Unix seconds, with relative values anchored at `reference_unix`.
    pub fn resolve(self, reference_unix: i64) -> Option<i64> {
        match self.kind() {
            ExpirationKind::Never => None,
            ExpirationKind::Relative(secs) => Some(reference_unix + i64::from(secs)),
            ExpirationKind::Absolute(at) => Some(at),
        }
    }

    /// The spec that reproduces a metadump `exp` value: `0` stays never,
    /// anything else is sent back as the same absolute timestamp.
    ///
    /// `None` when the instant cannot be written as an absolute value
    /// (beyond `i32`, or small enough to read as relative).
    pub fn from_unix(expiration_unix: i64) -> Option<ExpirationSpec> {
        if expiration_unix == 0 {
            return Some(ExpirationSpec::NEVER);
        }
        let at = i32::try_from(expiration_unix).ok()?;
        (at > MAX_RELATIVE_EXPIRATION).then_some(ExpirationSpec(at))
    }
}

impl From<i32> for ExpirationSpec {
    fn from(value: i32) -> Self {
        ExpirationSpec(value)
    }
}

/// The token captured by `gets`. Only the crate can create one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CasToken(pub(crate) u64);

/// A value read from or destined for the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    pub value: Bytes,
    /// Opaque client flags stored alongside the value
    pub flags: u32,
    /// `None` for fetched items: `get` and `gets` do not report it.
    pub expiration: Option<ExpirationSpec>,
    cas_id: u64,
    binding: Option<CasToken>,
    read_at_unix: i64,
}

impl Item {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            flags: 0,
            expiration: Some(ExpirationSpec::NEVER),
            cas_id: 0,
            binding: None,
            read_at_unix: unix_now(),
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_expiration(mut self, expiration: impl Into<ExpirationSpec>) -> Self {
        self.expiration = Some(expiration.into());
        self
    }

    pub(crate) fn from_value(value: Value) -> Self {
        let mut item = Item::new(value.key, value.data).with_flags(value.flags);
        item.expiration = None;
        if let Some(cas) = value.cas {
            item.cas_id = cas;
            item.binding = Some(CasToken(cas));
        }
        item
    }

    /// Server version captured at read time, for display. Zero when unknown.
    pub fn cas_id(&self) -> u64 {
        self.cas_id
    }

    /// True if the item came from `get_with_token` and can be used for compare-and-swap.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub(crate) fn token(&self) -> Option<CasToken> {
        self.binding
    }

    pub fn size(&self) -> usize {
        self.value.len()
    }

    /// The `exptime` to write. Writing with an unknown expiration would
    /// silently make the key permanent, so it is refused.
    pub(crate) fn exptime(&self) -> Result<i32> {
        self.expiration.map(|spec| spec.0).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "expiration of {:?} is unknown; set item.expiration before writing",
                self.key
            ))
        })
    }

    fn expires_at(&self) -> Option<i64> {
        self.expiration?.resolve(self.read_at_unix)
    }

    /// Seconds until expiry (clamped at zero).
    ///
    /// `None` if the item never expires or its expiration is unknown; check
    /// [`expiration`](Self::expiration) to tell the two apart.
    pub fn ttl_remaining(&self, now_unix: i64) -> Option<i64> {
        self.expires_at().map(|at| (at - now_unix).max(0))
    }

    pub fn is_expired(&self, now_unix: i64) -> bool {
        matches!(self.expires_at(), Some(at) if at < now_unix)
    }

    /// Sniffed compression format of the stored bytes.
    pub fn compression(&self) -> Compression {
        codec::detect(&self.value)
    }

    /// The value with any gzip/zlib/zstd layer removed.
    pub fn decoded_value(&self) -> Result<Cow<'_, [u8]>> {
        codec::decompress(&self.value)
    }
}
