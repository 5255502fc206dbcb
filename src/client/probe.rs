//! Capability Probe
//!
//! Decides whether a server can stream `lru_crawler metadump all` by
//! reading `STAT version` out of a raw `stats` reply. The command first
//! shipped in 1.4.31; anything older cannot be enumerated.

use crate::address::ServerAddress;
use crate::connection::{RawTransport, TransportConfig};
use crate::error::{Error, Result};
use crate::protocol::Stats;
use crate::scope::CancelScope;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// A `MAJOR.MINOR.PATCH` server version. Ordering is lexicographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// First release with `lru_crawler metadump`
    pub const METADUMP_MIN: Version = Version::new(1, 4, 31);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `MAJOR.MINOR.PATCH[-suffix]`. The suffix is ignored.
    pub fn parse(raw: &str) -> Option<Version> {
        let core = raw.trim().split('-').next()?;
        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Version::new(major, minor, patch))
    }

    pub fn supports_metadump(&self) -> bool {
        *self >= Version::METADUMP_MIN
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What the probe learned about a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCapability {
    /// Version as reported, suffix included
    pub version_string: String,
    pub version: Version,
    pub supports_metadump: bool,
}

/// Configuration for the capability probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub connect_timeout: Duration,

    /// Bound on the whole `stats` exchange (default: 5s)
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityProbe {
    transport: RawTransport,
}

impl Default for CapabilityProbe {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}

impl CapabilityProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            transport: RawTransport::new(TransportConfig {
                connect_timeout: config.connect_timeout,
                timeout: config.timeout,
            }),
        }
    }

    /// Detects the server version without a caller scope.
    pub async fn detect(&self, addr: &ServerAddress) -> Result<ServerCapability> {
        self.detect_scoped(addr, &CancelScope::background()).await
    }

    /// Sends `stats` and classifies the reported version.
    ///
    /// # Errors
    ///
    /// [`Error::DetectionFailed`] if the reply has no `STAT version` line or
    /// the version is not `MAJOR.MINOR.PATCH`; transport errors otherwise.
    pub async fn detect_scoped(
        &self,
        addr: &ServerAddress,
        scope: &CancelScope,
    ) -> Result<ServerCapability> {
        let lines = self.transport.execute(addr, "stats", scope).await?;
        let stats = Stats::from_lines(lines);

        if stats.get("version").is_none() {
            warn!(server = %addr, "stats reply carried no version");
            return Err(Error::DetectionFailed(
                "version not found in stats output".to_string(),
            ));
        }
        let version_string = stats.version;
        let version = Version::parse(&version_string).ok_or_else(|| {
            Error::DetectionFailed(format!("unparseable version {:?}", version_string))
        })?;

        let capability = ServerCapability {
            supports_metadump: version.supports_metadump(),
            version,
            version_string,
        };
        debug!(
            server = %addr,
            version = %capability.version_string,
            metadump = capability.supports_metadump,
            "Capability detected"
        );
        Ok(capability)
    }

    /// Like [`detect`](Self::detect), but an old server is an error.
    pub async fn verify(&self, addr: &ServerAddress) -> Result<ServerCapability> {
        self.verify_scoped(addr, &CancelScope::background()).await
    }

    /// [`Error::UnsupportedVersion`] carrying the reported version when the
    /// server predates metadump.
    pub async fn verify_scoped(
        &self,
        addr: &ServerAddress,
        scope: &CancelScope,
    ) -> Result<ServerCapability> {
        let capability = self.detect_scoped(addr, scope).await?;
        if !capability.supports_metadump {
            return Err(Error::UnsupportedVersion(capability.version_string));
        }
        Ok(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{Behavior, TestServer};

    async fn probe_version(version: &str) -> (Result<ServerCapability>, Result<ServerCapability>) {
        let server = TestServer::with_behavior(Behavior {
            version: version.to_string(),
            ..Default::default()
        })
        .await;
        let probe = CapabilityProbe::default();
        let addr = server.address();
        (probe.detect(&addr).await, probe.verify(&addr).await)
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(Version::parse("1.6.21"), Some(Version::new(1, 6, 21)));
        assert_eq!(Version::parse("1.4.31-beta"), Some(Version::new(1, 4, 31)));
        assert_eq!(Version::parse(" 1.5.0 "), Some(Version::new(1, 5, 0)));
        assert_eq!(Version::parse("1.6"), None);
        assert_eq!(Version::parse("1.6.x"), None);
        assert_eq!(Version::parse("1.6.21.4"), None);
        assert_eq!(Version::parse(""), None);
    }

    #[test]
    fn test_gate_is_monotone() {
        let versions = [
            Version::new(1, 2, 99),
            Version::new(1, 4, 0),
            Version::new(1, 4, 30),
            Version::new(1, 4, 31),
            Version::new(1, 4, 32),
            Version::new(1, 5, 0),
            Version::new(2, 0, 0),
        ];
        for pair in versions.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(!pair[0].supports_metadump() || pair[1].supports_metadump());
        }
        for v in versions {
            assert_eq!(v.supports_metadump(), v >= Version::new(1, 4, 31));
        }
    }

    #[tokio::test]
    async fn test_version_below_gate() {
        let (detected, verified) = probe_version("1.4.30").await;
        let detected = detected.unwrap();
        assert_eq!(detected.version_string, "1.4.30");
        assert!(!detected.supports_metadump);
        assert!(matches!(verified, Err(Error::UnsupportedVersion(ref v)) if v == "1.4.30"));
    }

    #[tokio::test]
    async fn test_version_at_gate() {
        let (detected, verified) = probe_version("1.4.31").await;
        assert!(detected.unwrap().supports_metadump);
        assert_eq!(verified.unwrap().version, Version::new(1, 4, 31));
    }

    #[tokio::test]
    async fn test_suffix_kept_in_version_string() {
        let (detected, _) = probe_version("1.6.21-rc1").await;
        let detected = detected.unwrap();
        assert_eq!(detected.version_string, "1.6.21-rc1");
        assert_eq!(detected.version, Version::new(1, 6, 21));
    }

    #[tokio::test]
    async fn test_missing_version_line() {
        let server = TestServer::with_behavior(Behavior {
            omit_version: true,
            ..Default::default()
        })
        .await;
        let result = CapabilityProbe::default().detect(&server.address()).await;
        assert!(matches!(result, Err(Error::DetectionFailed(_))));
    }

    #[tokio::test]
    async fn test_garbled_version() {
        let (detected, verified) = probe_version("unknown").await;
        assert!(matches!(detected, Err(Error::DetectionFailed(_))));
        assert!(matches!(verified, Err(Error::DetectionFailed(_))));
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        let server = TestServer::with_behavior(Behavior {
            stall_stats: true,
            ..Default::default()
        })
        .await;
        let probe = CapabilityProbe::new(ProbeConfig {
            timeout: Duration::from_millis(150),
            ..Default::default()
        });
        let result = probe.detect(&server.address()).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
