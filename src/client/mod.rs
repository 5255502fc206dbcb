//! Client Module
//!
//! The facade callers hold on to:
//!
//! - [`Client`]: `get`, `set`, `delete`, `ping`, `stats` over one server
//! - the optimistic-update engine, as `get_with_token` / `compare_and_swap`
//!   methods on the same client
//! - [`CapabilityProbe`]: does this server support key enumeration?
//! - [`Item`] and [`ExpirationSpec`], the value model shared by all of them

pub mod basic;
pub mod cas;
pub mod item;
pub mod probe;

pub use basic::{validate_key, Client, MAX_KEY_LENGTH};
pub use item::{unix_now, ExpirationKind, ExpirationSpec, Item};
pub use probe::{CapabilityProbe, ProbeConfig, ServerCapability, Version};

use crate::connection::DEFAULT_MAX_IDLE;
use std::time::Duration;

/// Configuration for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on each request/reply exchange (default: 3s)
    pub timeout: Duration,

    /// Bound on establishing a new connection (default: 3s)
    pub connect_timeout: Duration,

    /// Idle connections kept for reuse (default: 2)
    pub max_idle_conns: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(3),
            max_idle_conns: DEFAULT_MAX_IDLE,
        }
    }
}
