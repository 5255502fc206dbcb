//! Connection Module
//!
//! This module owns every socket the crate opens:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Client                                │
//! │                                                              │
//! │   get / set / delete / gets / cas        stats / metadump    │
//! │              │                                  │           │
//! │              ▼                                  ▼           │
//! │   ┌────────────────────┐          ┌─────────────────────┐   │
//! │   │ Pool (idle stack)  │          │ RawTransport        │   │
//! │   │  Connection ...    │          │  fresh socket per   │   │
//! │   └────────────────────┘          │  command            │   │
//! │                                   └─────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - `conn`: one persistent request/reply connection with a `BytesMut` buffer
//! - `pool`: bounded stack of idle connections to one server
//! - `transport`: one-shot line-oriented exchanges with a deadline
//!
//! ## Example
//!
//! ```ignore
//! use mcinspect::connection::RawTransport;
//! use mcinspect::{CancelScope, ServerAddress};
//!
//! let addr = ServerAddress::parse("127.0.0.1:11211")?;
//! let lines = RawTransport::default()
//!     .execute(&addr, "stats", &CancelScope::background())
//!     .await?;
//! ```

pub mod conn;
pub mod pool;
pub mod transport;

// Re-export commonly used types
pub use conn::{Connection, ConnectionStats};
pub use pool::{Pool, DEFAULT_MAX_IDLE};
pub use transport::{RawTransport, TransportConfig};
