//! Key Enumerator
//!
//! Walks every live key by streaming `lru_crawler metadump all` over a
//! dedicated socket and handing parsed records to the caller through a
//! bounded channel.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────── producer task ────────────────┐
//! │ socket ──read_line──> parse ──send (bounded)──┼──> KeyStream::next()
//! │    ▲                                   │      │
//! │    └── paused while the channel is full┘      │
//! │                                               │
//! │ terminal result ──oneshot─────────────────────┼──> KeyStream::finish()
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The producer checks the scope before every read and every push. One
//! deadline, `min(now + timeout, scope deadline)`, covers the whole walk,
//! including time spent blocked on a slow consumer.
//!
//! ## Line Handling
//!
//! | Line | Effect |
//! |------|--------|
//! | `END` | stream closes, terminal `Ok(())` |
//! | `ERROR`, `CLIENT_ERROR ..`, `SERVER_ERROR ..` | terminal `Error::Server(line)` |
//! | `BUSY ..`, `BADCLASS ..` (crawler refused) | terminal `Error::Server(line)` |
//! | a line over 64 KiB without a newline | terminal `Error::Protocol` |
//! | empty, or a record without a key | skipped |
//! | anything else | parsed as a [`KeyMetadata`] and delivered |

mod stream;

pub use stream::KeyStream;

use crate::address::ServerAddress;
use crate::connection::transport::{dial, interruptible, read_line};
use crate::error::{Error, Result};
use crate::protocol::{is_error_line, Command, KeyMetadata, END};
use crate::scope::CancelScope;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Configuration for the key enumerator.
#[derive(Debug, Clone)]
pub struct EnumeratorConfig {
    pub connect_timeout: Duration,

    /// Bound on the entire walk (default: 30s)
    pub timeout: Duration,

    /// Records buffered between producer and consumer (default: 100)
    pub buffer: usize,
}

impl Default for EnumeratorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            timeout: Duration::from_secs(30),
            buffer: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyEnumerator {
    addr: ServerAddress,
    config: EnumeratorConfig,
}

impl KeyEnumerator {
    pub fn new(addr: &str) -> Result<Self> {
        Self::with_config(addr, EnumeratorConfig::default())
    }

    pub fn with_config(addr: &str, config: EnumeratorConfig) -> Result<Self> {
        Ok(Self {
            addr: ServerAddress::parse(addr)?,
            config,
        })
    }

    pub fn address(&self) -> &ServerAddress {
        &self.addr
    }

    /// Starts a walk under `scope`.
    ///
    /// Must be called from within a tokio runtime; the producer is spawned
    /// immediately and starts filling the buffer before the first `next`.
    pub fn enumerate(&self, scope: &CancelScope) -> KeyStream {
        let (tx, rx) = mpsc::channel(self.config.buffer.max(1));
        let (done_tx, done_rx) = oneshot::channel();

        let addr = self.addr.clone();
        let config = self.config.clone();
        let scope = scope.clone();
        let producer = tokio::spawn(async move {
            let result = produce(&addr, &config, &scope, &tx).await;
            if let Err(e) = &result {
                debug!(server = %addr, error = %e, "Enumeration aborted");
            }
            let _ = done_tx.send(result);
        });

        KeyStream::new(rx, done_rx, producer)
    }

    /// Walks until `key` turns up and returns its record.
    ///
    /// The walk stops as soon as the key is seen. `Ok(None)` means the
    /// server finished the dump without it.
    pub async fn find(&self, key: &str, scope: &CancelScope) -> Result<Option<KeyMetadata>> {
        let mut stream = self.enumerate(scope);
        while let Some(meta) = stream.next().await {
            if meta.key == key {
                return Ok(Some(meta));
            }
        }
        stream.finish().await?;
        Ok(None)
    }
}

async fn produce(
    addr: &ServerAddress,
    config: &EnumeratorConfig,
    scope: &CancelScope,
    tx: &mpsc::Sender<KeyMetadata>,
) -> Result<()> {
    if let Some(reason) = scope.reason() {
        return Err(Error::Cancelled(reason));
    }

    let deadline = scope.effective_deadline(config.timeout);
    let stream = dial(addr, config.connect_timeout, scope).await?;
    let mut reader = BufReader::new(stream);

    let request = Command::MetadumpAll.serialize();
    interruptible(
        async {
            reader.get_mut().write_all(&request).await?;
            reader.get_mut().flush().await?;
            Ok::<(), Error>(())
        },
        deadline,
        scope,
    )
    .await?;

    let started = Instant::now();
    let mut buf = Vec::new();
    let mut delivered = 0usize;
    let mut skipped = 0usize;

    loop {
        if let Some(reason) = scope.reason() {
            return Err(Error::Cancelled(reason));
        }

        let line = match interruptible(read_line(&mut reader, &mut buf), deadline, scope).await? {
            Some(line) => line,
            None => return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into())),
        };

        if line.is_empty() {
            continue;
        }
        if line == END {
            break;
        }
        if is_error_line(&line) || is_crawler_refusal(&line) {
            return Err(Error::Server(line));
        }

        let meta = match KeyMetadata::parse_line(&line) {
            Ok(meta) => meta,
            Err(e) => {
                trace!(line = %line, error = %e, "Skipping metadump line");
                skipped += 1;
                continue;
            }
        };

        if let Some(reason) = scope.reason() {
            return Err(Error::Cancelled(reason));
        }
        interruptible(
            async {
                tx.send(meta)
                    .await
                    .map_err(|_| Error::Cancelled("key stream dropped".to_string()))
            },
            deadline,
            scope,
        )
        .await?;
        delivered += 1;
    }

    info!(
        server = %addr,
        keys = delivered,
        skipped,
        elapsed_ms = started.elapsed().as_millis(),
        "Enumeration complete"
    );
    Ok(())
}

/// The crawler declines with `BUSY` while another crawl runs and with
/// `BADCLASS` for an unknown slab class.
fn is_crawler_refusal(line: &str) -> bool {
    line.starts_with("BUSY") || line.starts_with("BADCLASS")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{Behavior, TestServer};

    fn script(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                format!(
                    "key=key{:03} exp=0 la=1700000000 cas={} fetch=no cls=1 size=64",
                    i,
                    i + 1
                )
            })
            .collect()
    }

    fn enumerator(server: &TestServer, config: EnumeratorConfig) -> KeyEnumerator {
        KeyEnumerator::with_config(&server.addr(), config).unwrap()
    }

    async fn scripted(lines: &[&str]) -> TestServer {
        TestServer::with_behavior(Behavior {
            metadump_script: Some(lines.iter().map(|l| l.to_string()).collect()),
            ..Default::default()
        })
        .await
    }

    #[tokio::test]
    async fn test_happy_path_records() {
        let server = scripted(&[
            "key=user%3A1 exp=0 la=1700000000 cas=7 fetch=yes cls=1 size=42",
            "key=user%3A2 exp=1700003600 la=1700000100 cas=8 fetch=no cls=1 size=17",
        ])
        .await;

        let mut stream = enumerator(&server, EnumeratorConfig::default())
            .enumerate(&CancelScope::background());
        let mut keys = Vec::new();
        while let Some(meta) = stream.next().await {
            keys.push(meta);
        }
        stream.finish().await.unwrap();

        assert_eq!(
            keys,
            vec![
                KeyMetadata {
                    key: "user:1".to_string(),
                    expiration_unix: 0,
                    last_access_unix: 1_700_000_000,
                    cas_id: 7,
                    fetched: true,
                    slab_class: 1,
                    size_bytes: 42,
                },
                KeyMetadata {
                    key: "user:2".to_string(),
                    expiration_unix: 1_700_003_600,
                    last_access_unix: 1_700_000_100,
                    cas_id: 8,
                    fetched: false,
                    slab_class: 1,
                    size_bytes: 17,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_find_stops_at_key() {
        let server = scripted(&[
            "key=user%3A1 exp=0 la=1700000000 cas=7 fetch=yes cls=1 size=42",
            "key=user%3A2 exp=1700003600 la=1700000100 cas=8 fetch=no cls=1 size=17",
        ])
        .await;
        let enumerator = enumerator(&server, EnumeratorConfig::default());
        let scope = CancelScope::background();

        let found = enumerator.find("user:2", &scope).await.unwrap().unwrap();
        assert_eq!(found.expiration_unix, 1_700_003_600);
        assert_eq!(found.cas_id, 8);

        assert_eq!(enumerator.find("user:3", &scope).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_reports_walk_failure() {
        let server = scripted(&["BUSY currently processing crawler request"]).await;
        let result = enumerator(&server, EnumeratorConfig::default())
            .find("user:1", &CancelScope::background())
            .await;
        assert!(matches!(result, Err(Error::Server(_))));
    }

    #[tokio::test]
    async fn test_walks_store_contents() {
        let server = TestServer::start().await;
        server.put("alpha", b"1");
        server.put("beta", b"22");
        server.put_with("gamma", b"333", 0, 1_900_000_000);

        let keys = enumerator(&server, EnumeratorConfig::default())
            .enumerate(&CancelScope::background())
            .collect()
            .await
            .unwrap();

        let names: Vec<_> = keys.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert!(keys[0].is_permanent());
        assert_eq!(keys[2].expiration_unix, 1_900_000_000);
    }

    #[tokio::test]
    async fn test_skips_keyless_and_empty_lines() {
        let server = scripted(&[
            "",
            "exp=0 la=1 cas=1 fetch=no cls=1 size=10",
            "key= exp=0",
            "key=kept exp=zz la=1 cas=2 fetch=no cls=1 size=10",
        ])
        .await;

        let keys = enumerator(&server, EnumeratorConfig::default())
            .enumerate(&CancelScope::background())
            .collect()
            .await
            .unwrap();

        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key, "kept");
        assert_eq!(keys[0].expiration_unix, 0);
    }

    #[tokio::test]
    async fn test_error_line_aborts() {
        let server = scripted(&[
            "key=a exp=0 la=1 cas=1 fetch=no cls=1 size=10",
            "SERVER_ERROR lru crawler disabled",
            "key=b exp=0 la=1 cas=2 fetch=no cls=1 size=10",
        ])
        .await;

        let mut stream = enumerator(&server, EnumeratorConfig::default())
            .enumerate(&CancelScope::background());
        assert_eq!(stream.next().await.unwrap().key, "a");
        assert!(stream.next().await.is_none());
        let result = stream.finish().await;
        assert!(
            matches!(result, Err(Error::Server(ref line)) if line == "SERVER_ERROR lru crawler disabled")
        );
    }

    #[tokio::test]
    async fn test_busy_crawler_is_server_error() {
        let server = scripted(&["BUSY currently processing crawler request"]).await;
        let result = enumerator(&server, EnumeratorConfig::default())
            .enumerate(&CancelScope::background())
            .collect()
            .await;
        assert!(matches!(result, Err(Error::Server(ref line)) if line.starts_with("BUSY")));
    }

    #[tokio::test]
    async fn test_cancel_after_ten_records() {
        let server = TestServer::with_behavior(Behavior {
            metadump_script: Some(script(50)),
            metadump_hang: true,
            ..Default::default()
        })
        .await;
        let (handle, scope) = CancelScope::new();
        let mut stream = enumerator(&server, EnumeratorConfig::default()).enumerate(&scope);

        for i in 0..10 {
            let meta = stream.next().await.unwrap();
            assert_eq!(meta.key, format!("key{:03}", i));
        }
        handle.cancel("user navigated away");

        let mut rest = 0;
        while let Some(meta) = stream.next().await {
            assert_eq!(meta.key, format!("key{:03}", 10 + rest));
            rest += 1;
        }
        assert!(rest <= 40);

        let result = tokio::time::timeout(Duration::from_secs(2), stream.finish())
            .await
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled(ref r)) if r == "user navigated away"));

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while server.closed_connections() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(closed.is_ok(), "producer socket was not closed");
    }

    #[tokio::test]
    async fn test_cancel_stops_slow_walk_early() {
        let server = TestServer::with_behavior(Behavior {
            metadump_script: Some(script(100)),
            metadump_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        })
        .await;
        let (handle, scope) = CancelScope::new();
        let mut stream = enumerator(&server, EnumeratorConfig::default()).enumerate(&scope);

        for _ in 0..5 {
            stream.next().await.unwrap();
        }
        handle.cancel("enough");

        let mut total = 5;
        while stream.next().await.is_some() {
            total += 1;
        }
        assert!(total < 100);
        assert!(matches!(stream.finish().await, Err(Error::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_already_cancelled_scope() {
        let server = TestServer::start().await;
        let (handle, scope) = CancelScope::new();
        handle.cancel("never mind");

        let result = enumerator(&server, EnumeratorConfig::default())
            .enumerate(&scope)
            .collect()
            .await;
        assert!(matches!(result, Err(Error::Cancelled(ref r)) if r == "never mind"));
    }

    #[tokio::test]
    async fn test_deadline_bounds_walk() {
        let server = TestServer::with_behavior(Behavior {
            metadump_script: Some(script(2)),
            metadump_hang: true,
            ..Default::default()
        })
        .await;
        let config = EnumeratorConfig {
            timeout: Duration::from_millis(200),
            ..Default::default()
        };

        let mut stream = enumerator(&server, config).enumerate(&CancelScope::background());
        let mut seen = 0;
        while stream.next().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 2);
        assert!(matches!(stream.finish().await, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_full_buffer_pauses_producer() {
        let server = TestServer::with_behavior(Behavior {
            metadump_script: Some(script(50)),
            ..Default::default()
        })
        .await;
        let config = EnumeratorConfig {
            buffer: 4,
            ..Default::default()
        };

        let mut stream = enumerator(&server, config).enumerate(&CancelScope::background());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stream.buffered(), 4);

        let mut seen = 0;
        while let Some(meta) = stream.next().await {
            assert_eq!(meta.key, format!("key{:03}", seen));
            seen += 1;
        }
        assert_eq!(seen, 50);
        stream.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_closes_socket() {
        let server = TestServer::with_behavior(Behavior {
            metadump_script: Some(script(3)),
            metadump_hang: true,
            ..Default::default()
        })
        .await;

        let mut stream = enumerator(&server, EnumeratorConfig::default())
            .enumerate(&CancelScope::background());
        stream.next().await.unwrap();
        drop(stream);

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while server.closed_connections() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(closed.is_ok());
    }

    #[test]
    fn test_crawler_refusals() {
        assert!(is_crawler_refusal("BUSY currently processing crawler request"));
        assert!(is_crawler_refusal("BADCLASS invalid class id"));
        assert!(!is_crawler_refusal("key=BUSY exp=0"));
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(matches!(
            KeyEnumerator::new("localhost"),
            Err(Error::InvalidAddress(_))
        ));
    }
}
