//! Memcached Text Protocol
//!
//! This module implements the parts of Memcached's ASCII protocol the
//! inspector speaks.
//!
//! ## Modules
//!
//! - `types`: The `Command` enum and its wire encoding
//! - `parser`: Incremental parser for storage and retrieval replies
//! - `metadump`: `KeyMetadata` records from `lru_crawler metadump`
//! - `stats`: Typed view of the `stats` reply
//!
//! ## Example
//!
//! ```
//! use mcinspect::protocol::{parse_response, Command, Response};
//!
//! let bytes = Command::Gets { key: "user:1" }.serialize();
//! assert_eq!(bytes, b"gets user:1\r\n");
//!
//! let (reply, consumed) = parse_response(b"END\r\n").unwrap().unwrap();
//! assert_eq!(reply, Response::Values(vec![]));
//! assert_eq!(consumed, 5);
//! ```

pub mod metadump;
pub mod parser;
pub mod stats;
pub mod types;

// Re-export commonly used types for convenience
pub use metadump::{filter_keys, sort_keys, KeyMetadata, SortField, SortOrder};
pub use parser::{parse_response, ParseError, ParseResult, Response, Status, Value};
pub use stats::Stats;
pub use types::{is_error_line, Command, CRLF, END, MAX_RELATIVE_EXPIRATION};
