//! Optimistic Updates (get-with-token / compare-and-swap)
//!
//! ```text
//! get_with_token("k") ──gets──> VALUE k 0 2 41      item bound to token 41
//!        │
//!   caller edits item.value / flags, sets item.expiration
//!        │
//! compare_and_swap(&item) ──cas k .. 41──> STORED    ok
//!                                      └─> EXISTS    CasConflict("k")
//!                                      └─> NOT_FOUND CasConflict("k")
//! ```
//!
//! The token lives inside the [`Item`] and can only be set by
//! `get_with_token`; the displayed [`Item::cas_id`] is never read back.
//! `gets` does not report the expiration, so a fetched item's is unknown
//! and must be filled in (for example from
//! [`KeyEnumerator::find`](crate::enumerator::KeyEnumerator::find)) before
//! the swap.
//! Nothing here retries: a conflict goes straight to the caller, who
//! decides whether to re-read.

use crate::client::basic::{take_value, unexpected, validate_key};
use crate::client::item::Item;
use crate::client::Client;
use crate::error::{Error, Result};
use crate::protocol::{Command, Response, Status};
use tracing::{debug, trace};

impl Client {
    /// Fetches `key` with its CAS token bound to the returned item.
    pub async fn get_with_token(&self, key: &str) -> Result<Item> {
        validate_key(key)?;
        let response = self.round_trip(&Command::Gets { key }).await?;
        let item = take_value(response, key)?;

        if !item.is_bound() {
            return Err(Error::Protocol(crate::protocol::ParseError::ProtocolError(
                format!("gets reply for {:?} carried no cas value", key),
            )));
        }

        trace!(server = %self.address(), key, cas = item.cas_id(), "gets hit");
        Ok(item)
    }

    /// Writes the item's current value, flags and expiration if the server
    /// still holds the version it was read at.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the item was not read with `get_with_token`,
    ///   or its expiration was left unknown
    /// - [`Error::CasConflict`] if the key was written or removed since
    pub async fn compare_and_swap(&self, item: &Item) -> Result<()> {
        let token = item.token().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "item {:?} has no CAS binding; read it with get_with_token first",
                item.key
            ))
        })?;
        validate_key(&item.key)?;
        let exptime = item.exptime()?;

        let command = Command::Cas {
            key: &item.key,
            flags: item.flags,
            exptime,
            data: &item.value,
            cas: token.0,
        };

        match self.round_trip(&command).await? {
            Response::Status(Status::Stored) => {
                trace!(server = %self.address(), key = %item.key, "cas stored");
                Ok(())
            }
            Response::Status(status @ (Status::Exists | Status::NotFound | Status::NotStored)) => {
                debug!(server = %self.address(), key = %item.key, reply = status.as_line(), "cas conflict");
                Err(Error::CasConflict(item.key.clone()))
            }
            Response::Status(Status::Error(line)) => Err(Error::Server(line)),
            other => Err(unexpected(other)),
        }
    }
}
