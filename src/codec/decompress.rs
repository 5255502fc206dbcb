use crate::error::{Error, Result};
use flate2::read::{GzDecoder, ZlibDecoder};
use std::borrow::Cow;
use std::fmt;
use std::io::Read;

/// Upper bound on decompressed output (512 MB).
pub const MAX_DECOMPRESSED_SIZE: u64 = 512 * 1024 * 1024;

const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];
const ZLIB_SECOND_BYTES: &[u8] = &[0x01, 0x5E, 0x9C, 0xDA];

/// Compression format detected from a value's prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    Gzip,
    Zlib,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gzip"),
            Self::Zlib => write!(f, "zlib"),
            Self::Zstd => write!(f, "zstd"),
        }
    }
}

/// Sniffs the compression format from the first bytes of `data`.
pub fn detect(data: &[u8]) -> Compression {
    if data.starts_with(GZIP_MAGIC) {
        Compression::Gzip
    } else if data.starts_with(ZSTD_MAGIC) {
        Compression::Zstd
    } else if data.len() >= 2 && data[0] == 0x78 && ZLIB_SECOND_BYTES.contains(&data[1]) {
        Compression::Zlib
    } else {
        Compression::None
    }
}

/// Decompresses `data` if it carries a recognised magic, otherwise returns it borrowed.
///
/// # Errors
///
/// [`Error::DecompressionFailed`] when the magic matched but the body did
/// not decode, or when the output would exceed [`MAX_DECOMPRESSED_SIZE`].
pub fn decompress(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    let format = detect(data);
    let decoded = match format {
        Compression::None => return Ok(Cow::Borrowed(data)),
        Compression::Gzip => read_bounded(GzDecoder::new(data)),
        Compression::Zlib => read_bounded(ZlibDecoder::new(data)),
        Compression::Zstd => zstd::stream::read::Decoder::new(data).and_then(read_bounded),
    };

    decoded
        .map(Cow::Owned)
        .map_err(|source| Error::DecompressionFailed { format, source })
}

fn read_bounded<R: Read>(reader: R) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader
        .take(MAX_DECOMPRESSED_SIZE + 1)
        .read_to_end(&mut out)?;
    if out.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decompressed size exceeds {} bytes", MAX_DECOMPRESSED_SIZE),
        ));
    }
    Ok(out)
}
