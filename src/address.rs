//! Server addresses.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Default memcached port
pub const DEFAULT_PORT: u16 = 11211;

/// A validated `host:port` string.
///
/// The string is split on its last colon; both halves must be non-empty and
/// the port must be a valid `u16`. Bracketed IPv6 literals such as
/// `[::1]:11211` therefore work unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    raw: String,
    port: u16,
    host_len: usize,
}

impl ServerAddress {
    pub fn parse(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidAddress(format!("{:?} is not host:port", addr)))?;

        if host.is_empty() {
            return Err(Error::InvalidAddress(format!("{:?} has an empty host", addr)));
        }
        if port.is_empty() {
            return Err(Error::InvalidAddress(format!("{:?} has an empty port", addr)));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("{:?} has an invalid port", addr)))?;

        Ok(Self {
            raw: addr.to_string(),
            port,
            host_len: host.len(),
        })
    }

    pub fn host(&self) -> &str {
        &self.raw[..self.host_len]
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The address exactly as given, suitable for `TcpStream::connect`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ServerAddress::parse(s)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        let addr = ServerAddress::parse("localhost:11211").unwrap();
        assert_eq!(addr.host(), "localhost");
        assert_eq!(addr.port(), 11211);
        assert_eq!(addr.to_string(), "localhost:11211");

        let v6 = ServerAddress::parse("[::1]:11212").unwrap();
        assert_eq!(v6.host(), "[::1]");
        assert_eq!(v6.port(), 11212);
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in ["", "localhost", ":11211", "localhost:", "host:port", "host:70000"] {
            assert!(
                matches!(ServerAddress::parse(bad), Err(Error::InvalidAddress(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_from_str() {
        let addr: ServerAddress = "10.0.0.1:11211".parse().unwrap();
        assert_eq!(addr.as_str(), "10.0.0.1:11211");
    }
}
