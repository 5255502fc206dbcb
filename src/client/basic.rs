//! Basic Client Facade
//!
//! [`Client`] is bound to exactly one server address. Standard operations
//! run over pooled connections; `stats` goes through the raw transport.
//!
//! ```text
//! get/set/delete/ping ──> Pool ──> Connection ──> server
//! stats               ──> RawTransport (fresh socket) ──> server
//! ```
//!
//! The client is `Send + Sync`; share it behind an `Arc` to use it from
//! several tasks at once.

use crate::address::ServerAddress;
use crate::client::item::Item;
use crate::client::ClientConfig;
use crate::connection::transport::interruptible;
use crate::connection::{ConnectionStats, Pool, RawTransport, TransportConfig};
use crate::error::{Error, Result};
use crate::protocol::{Command, ParseError, Response, Stats, Status};
use crate::scope::CancelScope;
use tracing::{debug, trace};

/// Longest key the server accepts
pub const MAX_KEY_LENGTH: usize = 250;

/// A client for one memcached server.
#[derive(Debug)]
pub struct Client {
    addr: ServerAddress,
    config: ClientConfig,
    pool: Pool,
    transport: RawTransport,
}

impl Client {
    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAddress`] if `addr` is not a valid `host:port`.
    pub fn new(addr: &str) -> Result<Self> {
        Self::with_config(addr, ClientConfig::default())
    }

    pub fn with_config(addr: &str, config: ClientConfig) -> Result<Self> {
        let addr = ServerAddress::parse(addr)?;
        let pool = Pool::new(addr.as_str(), config.connect_timeout, config.max_idle_conns);
        let transport = RawTransport::new(TransportConfig {
            connect_timeout: config.connect_timeout,
            timeout: config.timeout,
        });

        debug!(server = %addr, timeout_ms = config.timeout.as_millis(), "Client created");
        Ok(Self {
            addr,
            config,
            pool,
            transport,
        })
    }

    pub fn address(&self) -> &ServerAddress {
        &self.addr
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Client-side connection counters.
    pub fn connection_stats(&self) -> &ConnectionStats {
        self.pool.stats()
    }

    /// Fetches `key`.
    ///
    /// The returned item carries no CAS binding; use
    /// [`get_with_token`](Client::get_with_token) before an optimistic update.
    pub async fn get(&self, key: &str) -> Result<Item> {
        validate_key(key)?;
        let response = self.round_trip(&Command::Get { key }).await?;
        let item = take_value(response, key)?;
        trace!(server = %self.addr, key, size = item.size(), "get hit");
        Ok(item)
    }

    /// Stores `item` unconditionally.
    ///
    /// [`Error::InvalidArgument`] if the item's expiration is unknown, as it
    /// is for anything returned by [`get`](Client::get).
    pub async fn set(&self, item: &Item) -> Result<()> {
        validate_key(&item.key)?;
        let command = Command::Set {
            key: &item.key,
            flags: item.flags,
            exptime: item.exptime()?,
            data: &item.value,
        };
        match self.round_trip(&command).await? {
            Response::Status(Status::Stored) => Ok(()),
            Response::Status(status) => Err(Error::Server(status.as_line().to_string())),
            other => Err(unexpected(other)),
        }
    }

    /// Deletes `key`. [`Error::CacheMiss`] if it was not present.
    pub async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match self.round_trip(&Command::Delete { key }).await? {
            Response::Status(Status::Deleted) => Ok(()),
            Response::Status(Status::NotFound) => Err(Error::CacheMiss),
            Response::Status(status) => Err(Error::Server(status.as_line().to_string())),
            other => Err(unexpected(other)),
        }
    }

    /// Proves the server is alive by running `version` under `scope`.
    ///
    /// If the scope fires while the reply is outstanding, the cancellation
    /// reason is returned immediately and the connection is closed.
    pub async fn ping(&self, scope: &CancelScope) -> Result<()> {
        if let Some(reason) = scope.reason() {
            return Err(Error::Cancelled(reason));
        }

        let deadline = scope.effective_deadline(self.config.timeout);
        let version = interruptible(
            async {
                match self.round_trip(&Command::Version).await? {
                    Response::Version(version) => Ok(version),
                    Response::Status(Status::Error(line)) => Err(Error::Server(line)),
                    other => Err(unexpected(other)),
                }
            },
            deadline,
            scope,
        )
        .await?;

        trace!(server = %self.addr, version = %version, "ping ok");
        Ok(())
    }

    /// Runs `stats` over a fresh connection.
    pub async fn stats(&self, scope: &CancelScope) -> Result<Stats> {
        let lines = self.transport.execute(&self.addr, "stats", scope).await?;
        Ok(Stats::from_lines(lines))
    }

    /// Drops idle pooled connections. The client stays usable.
    pub fn close(&self) {
        self.pool.clear();
    }

    /// One command/reply exchange over a pooled connection.
    pub(crate) async fn round_trip(&self, command: &Command<'_>) -> Result<Response> {
        let mut conn = self.pool.acquire().await?;

        let response = match tokio::time::timeout(self.config.timeout, conn.request(command)).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(server = %self.addr, command = %command, "Request timed out");
                return Err(Error::Timeout);
            }
        };

        self.pool.release(conn);
        Ok(response)
    }
}

/// Rejects keys the server would refuse: empty, longer than 250 bytes, or
/// containing whitespace or control characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key is empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(Error::InvalidArgument(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(Error::InvalidArgument(format!(
            "key {:?} contains whitespace or control characters",
            key
        )));
    }
    Ok(())
}

/// Extracts the single value for `key` from a retrieval reply.
pub(crate) fn take_value(response: Response, key: &str) -> Result<Item> {
    match response {
        Response::Values(values) => values
            .into_iter()
            .find(|value| value.key == key)
            .map(Item::from_value)
            .ok_or(Error::CacheMiss),
        Response::Status(Status::Error(line)) => Err(Error::Server(line)),
        other => Err(unexpected(other)),
    }
}

pub(crate) fn unexpected(response: Response) -> Error {
    Error::Protocol(ParseError::UnexpectedReply(format!("{:?}", response)))
}
