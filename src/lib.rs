//! # mcinspect - Server-Interaction Layer for a Memcached Inspector
//!
//! mcinspect speaks memcached's text protocol on behalf of an interactive
//! inspector: it probes what a server supports, walks every live key through
//! the LRU crawler, reads and edits values with compare-and-swap, and parses
//! server statistics.
//!
//! ## Features
//!
//! - **Key Enumeration**: Streams `lru_crawler metadump all` through a bounded channel
//! - **Optimistic Updates**: `gets`/`cas` with the token bound to the item read
//! - **Cancellation**: Every networked call takes a [`CancelScope`] with an optional deadline
//! - **Transparent Decompression**: gzip, zlib and zstd values are sniffed and decoded
//! - **Server Profiles**: Named servers persisted as YAML
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              mcinspect                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Client    │───>│    Pool     │───>│ Connection  │──> get/gets/set  │
//! │  │ (+ CAS ops) │    │ (idle <= N) │    │  BytesMut   │    cas/delete    │
//! │  └──────┬──────┘    └─────────────┘    └─────────────┘    version       │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────────┐    ┌─────────────┐                                     │
//! │  │RawTransport │───>│ Stats parser│    stats, one socket per command    │
//! │  └─────────────┘    └─────────────┘                                     │
//! │         ▲                                                               │
//! │         │                                                               │
//! │  ┌──────┴──────┐    ┌─────────────────────────────────────────────────┐ │
//! │  │ Capability  │    │ KeyEnumerator                                   │ │
//! │  │   Probe     │    │  producer task ──mpsc(100)──> KeyStream         │ │
//! │  └─────────────┘    └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcinspect::{
//!     CancelScope, CapabilityProbe, Client, ExpirationSpec, KeyEnumerator, ServerAddress,
//! };
//!
//! #[tokio::main]
//! async fn main() -> mcinspect::Result<()> {
//!     let addr = ServerAddress::parse("127.0.0.1:11211")?;
//!     CapabilityProbe::default().verify(&addr).await?;
//!
//!     let (_handle, scope) = CancelScope::new();
//!     let enumerator = KeyEnumerator::new(addr.as_str())?;
//!     let mut keys = enumerator.enumerate(&scope);
//!     while let Some(meta) = keys.next().await {
//!         println!("{} ({} bytes)", meta.key, meta.size_bytes);
//!     }
//!     keys.finish().await?;
//!
//!     let client = Client::new(addr.as_str())?;
//!     let mut item = client.get_with_token("user:1").await?;
//!     // gets does not report the expiration; keep the stored one
//!     if let Some(meta) = enumerator.find("user:1", &scope).await? {
//!         item.expiration = ExpirationSpec::from_unix(meta.expiration_unix);
//!     }
//!     item.value = "updated".into();
//!     client.compare_and_swap(&item).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Reply parsers, metadump records and stats
//! - [`connection`]: Raw transport, pooled connections
//! - [`client`]: Client facade, CAS engine, capability probe
//! - [`enumerator`]: Streaming key walk
//! - [`codec`]: Value decompression
//! - [`profiles`]: Server profile store
//! - [`scope`]: Cancellation and deadlines
//!
//! ## Design Highlights
//!
//! ### Interrupts Beat I/O
//!
//! Every socket operation is raced against the caller's scope and the
//! effective deadline in a biased `select!`. When cancellation and an I/O
//! result are ready together, the caller sees the cancellation.
//!
//! ### Unforgeable CAS Tokens
//!
//! The `gets` token lives in a crate-private field of [`Item`]. An item built
//! by hand cannot be passed to `compare_and_swap`.

pub mod address;
pub mod client;
pub mod codec;
pub mod connection;
pub mod enumerator;
pub mod error;
pub mod profiles;
pub mod protocol;
pub mod scope;

#[cfg(test)]
mod test_server;

// Re-export commonly used types for convenience
pub use address::ServerAddress;
pub use client::{
    CapabilityProbe, Client, ClientConfig, ExpirationSpec, Item, ProbeConfig, ServerCapability,
    Version as ServerVersion,
};
pub use codec::{decompress, Compression};
pub use enumerator::{EnumeratorConfig, KeyEnumerator, KeyStream};
pub use error::{Error, Result};
pub use profiles::{ProfileSet, ProfileStore, ServerProfile};
pub use protocol::{KeyMetadata, SortField, SortOrder, Stats};
pub use scope::{CancelHandle, CancelScope};

/// The port memcached listens on by default
pub use address::DEFAULT_PORT;

/// Directory name used under the user's config dir
pub const APP_NAME: &str = "mcinspect";

/// Version of mcinspect
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
