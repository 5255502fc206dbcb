//! LRU Metadump Records
//!
//! `lru_crawler metadump all` streams one line per live item:
//!
//! ```text
//! key=user%3A1 exp=0 la=1700000000 cas=7 fetch=yes cls=1 size=42
//! ```
//!
//! Fields arrive as whitespace-separated `name=value` pairs in any order.
//! Only `key exp la cas fetch cls size` are recognised; anything else is
//! ignored so newer servers can add fields without breaking the parser.
//!
//! Parsing is lenient: a numeric field that fails to parse becomes zero and
//! a key that fails to percent-decode is kept as it appeared on the wire.
//! The one hard requirement is a non-empty key.

use crate::protocol::parser::{ParseError, ParseResult};
use std::cmp::Ordering;
use tracing::trace;

/// Metadata for one live item, as reported by the LRU crawler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyMetadata {
    /// Percent-decoded key
    pub key: String,
    /// Absolute Unix seconds, `0` if the item never expires
    pub expiration_unix: i64,
    /// Last access, Unix seconds
    pub last_access_unix: i64,
    /// Server-assigned version
    pub cas_id: u64,
    /// Whether the item has been fetched since it was stored
    pub fetched: bool,
    pub slab_class: u32,
    pub size_bytes: u64,
}

impl KeyMetadata {
    /// Parses one metadump line.
    ///
    /// Returns [`ParseError::MissingKey`] when the line carries no key; the
    /// enumerator drops such lines.
    pub fn parse_line(line: &str) -> ParseResult<Self> {
        let mut meta = KeyMetadata::default();

        for pair in line.split_whitespace() {
            let (name, value) = match pair.split_once('=') {
                Some(split) => split,
                None => continue,
            };

            match name {
                "key" => meta.key = decode_key(value),
                "exp" => meta.expiration_unix = lenient(name, value),
                "la" => meta.last_access_unix = lenient(name, value),
                "cas" => meta.cas_id = lenient(name, value),
                "fetch" => meta.fetched = value == "yes",
                "cls" => meta.slab_class = lenient(name, value),
                "size" => meta.size_bytes = lenient(name, value),
                _ => {}
            }
        }

        if meta.key.is_empty() {
            return Err(ParseError::MissingKey);
        }
        Ok(meta)
    }

    /// True if the item never expires.
    pub fn is_permanent(&self) -> bool {
        self.expiration_unix == 0
    }

    /// True if the item has an expiration strictly before `now_unix`.
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expiration_unix != 0 && self.expiration_unix < now_unix
    }

    /// Seconds until expiry (clamped at zero), or `None` for permanent items.
    pub fn ttl_remaining(&self, now_unix: i64) -> Option<i64> {
        if self.is_permanent() {
            None
        } else {
            Some((self.expiration_unix - now_unix).max(0))
        }
    }
}

/// Percent-decodes a key, falling back to the raw text on failure.
fn decode_key(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            trace!(key = raw, "Key is not valid percent-encoded UTF-8, keeping raw form");
            raw.to_string()
        }
    }
}

fn lenient<T: std::str::FromStr + Default>(name: &str, value: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        trace!(field = name, value, "Unparseable metadump field, using zero");
        T::default()
    })
}

/// Columns a key list can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Key,
    Size,
    Expiration,
    LastAccess,
    SlabClass,
    Cas,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortField {
    fn compare(self, a: &KeyMetadata, b: &KeyMetadata) -> Ordering {
        match self {
            SortField::Key => a.key.cmp(&b.key),
            SortField::Size => a.size_bytes.cmp(&b.size_bytes),
            // permanent items sort after every expiring one
            SortField::Expiration => match (a.is_permanent(), b.is_permanent()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => a.expiration_unix.cmp(&b.expiration_unix),
            },
            SortField::LastAccess => a.last_access_unix.cmp(&b.last_access_unix),
            SortField::SlabClass => a.slab_class.cmp(&b.slab_class),
            SortField::Cas => a.cas_id.cmp(&b.cas_id),
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "key" => Ok(SortField::Key),
            "size" => Ok(SortField::Size),
            "exp" | "expiration" => Ok(SortField::Expiration),
            "la" | "last_access" => Ok(SortField::LastAccess),
            "cls" | "slab_class" => Ok(SortField::SlabClass),
            "cas" => Ok(SortField::Cas),
            other => Err(ParseError::UnexpectedReply(format!("unknown sort field {:?}", other))),
        }
    }
}

/// Stable sort by `field`, ties broken by key.
pub fn sort_keys(keys: &mut [KeyMetadata], field: SortField, order: SortOrder) {
    keys.sort_by(|a, b| {
        let primary = field.compare(a, b).then_with(|| a.key.cmp(&b.key));
        match order {
            SortOrder::Ascending => primary,
            SortOrder::Descending => primary.reverse(),
        }
    });
}

/// Case-insensitive substring filter on the key. An empty needle matches everything.
pub fn filter_keys<'a>(keys: &'a [KeyMetadata], needle: &str) -> Vec<&'a KeyMetadata> {
    if needle.is_empty() {
        return keys.iter().collect();
    }
    let needle = needle.to_lowercase();
    keys.iter()
        .filter(|meta| meta.key.to_lowercase().contains(&needle))
        .collect()
}
