//! Transparent Value Decompression
//!
//! Values fetched for the viewer may have been compressed by the
//! application that stored them. This module sniffs the leading magic bytes
//! and decompresses gzip, zlib and zstd payloads; everything else passes
//! through untouched.
//!
//! ```text
//! 1F 8B            gzip
//! 28 B5 2F FD      zstd
//! 78 01|5E|9C|DA   zlib
//! ```
//!
//! Gzip and zstd are checked first because zlib's signature is only two
//! bytes with a common first byte.

pub mod decompress;

pub use decompress::{decompress, detect, Compression, MAX_DECOMPRESSED_SIZE};
