//! Idle Connection Pool
//!
//! The basic client keeps a small stack of idle [`Connection`]s to its one
//! server. `acquire` pops an idle connection or dials a new one; `release`
//! pushes a connection back if it finished its exchange cleanly and the
//! idle bound has room. Connections that are not released are dropped and
//! their sockets closed.

use crate::connection::conn::{Connection, ConnectionStats};
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

/// Default number of idle connections kept per server
pub const DEFAULT_MAX_IDLE: usize = 2;

/// A bounded pool of idle connections to one address.
pub struct Pool {
    addr: String,
    connect_timeout: Duration,
    max_idle: usize,
    idle: Mutex<Vec<Connection>>,
    stats: Arc<ConnectionStats>,
}

impl Pool {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, max_idle: usize) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            max_idle,
            idle: Mutex::new(Vec::new()),
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// Takes an idle connection or dials a new one.
    pub async fn acquire(&self) -> Result<Connection> {
        if let Some(conn) = self.lock_idle().pop() {
            trace!(server = %self.addr, "Reusing idle connection");
            return Ok(conn);
        }

        debug!(server = %self.addr, "Opening connection");
        match tokio::time::timeout(
            self.connect_timeout,
            Connection::connect(&self.addr, Arc::clone(&self.stats)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Returns a connection after a complete exchange.
    pub fn release(&self, conn: Connection) {
        if !conn.is_clean() {
            debug!(server = %self.addr, "Discarding connection with unread data");
            return;
        }

        let mut idle = self.lock_idle();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }

    /// Drops every idle connection.
    pub fn clear(&self) {
        self.lock_idle().clear();
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<Connection>> {
        // a panic while holding the lock cannot leave the Vec half-updated
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("addr", &self.addr)
            .field("max_idle", &self.max_idle)
            .field("idle", &self.idle_count())
            .finish()
    }
}
