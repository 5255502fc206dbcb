//! In-process fake memcached server for tests.
//!
//! Speaks enough of the text protocol for the client, CAS engine, probe and
//! enumerator: `get`, `gets`, `set`, `cas`, `delete`, `version`, `stats` and
//! `lru_crawler metadump all`. Metadump output can be scripted and the
//! server can be told to stall so timeouts and cancellation are testable.

use crate::address::ServerAddress;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the fake server deviates from a healthy memcached.
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Reported by `stats` and `version`
    pub version: String,
    /// Leave `STAT version` out of the `stats` reply
    pub omit_version: bool,
    /// Never answer `stats`
    pub stall_stats: bool,
    /// Never answer `version`
    pub stall_version: bool,
    /// Lines sent verbatim for `lru_crawler metadump all` instead of the store contents
    pub metadump_script: Option<Vec<String>>,
    /// After the metadump lines, keep the socket open without sending `END`
    pub metadump_hang: bool,
    /// Pause between metadump lines
    pub metadump_delay: Option<Duration>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            version: "1.6.21".to_string(),
            omit_version: false,
            stall_stats: false,
            stall_version: false,
            metadump_script: None,
            metadump_hang: false,
            metadump_delay: None,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredItem {
    flags: u32,
    exptime: i64,
    data: Vec<u8>,
    cas: u64,
    fetched: bool,
}

#[derive(Debug, Default)]
struct Shared {
    items: Mutex<HashMap<String, StoredItem>>,
    next_cas: Mutex<u64>,
    closed: AtomicUsize,
}

impl Shared {
    fn next_cas(&self) -> u64 {
        let mut next = self.next_cas.lock().unwrap();
        *next += 1;
        *next
    }

    fn store(&self, key: &str, flags: u32, exptime: i64, data: Vec<u8>) {
        let cas = self.next_cas();
        self.items.lock().unwrap().insert(
            key.to_string(),
            StoredItem {
                flags,
                exptime,
                data,
                cas,
                fetched: false,
            },
        );
    }

    /// Check and write under one lock so racing `cas` commands serialize.
    fn compare_and_store(
        &self,
        key: &str,
        flags: u32,
        exptime: i64,
        data: Vec<u8>,
        expected: u64,
    ) -> &'static [u8] {
        let mut items = self.items.lock().unwrap();
        match items.get(key) {
            None => b"NOT_FOUND\r\n",
            Some(item) if item.cas != expected => b"EXISTS\r\n",
            Some(_) => {
                let cas = self.next_cas();
                items.insert(
                    key.to_string(),
                    StoredItem {
                        flags,
                        exptime,
                        data,
                        cas,
                        fetched: false,
                    },
                );
                b"STORED\r\n"
            }
        }
    }
}

pub struct TestServer {
    addr: String,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_behavior(Behavior::default()).await
    }

    pub async fn with_behavior(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let shared = Arc::new(Shared::default());
        let behavior = Arc::new(behavior);

        let shared_clone = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = Arc::clone(&shared_clone);
                let behavior = Arc::clone(&behavior);
                tokio::spawn(async move {
                    let _ = serve(stream, &shared, &behavior).await;
                    shared.closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            shared,
            accept_task,
        }
    }

    /// An address nothing is listening on.
    pub async fn unused_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    pub fn addr(&self) -> String {
        self.addr.clone()
    }

    pub fn address(&self) -> ServerAddress {
        ServerAddress::parse(&self.addr).unwrap()
    }

    /// Writes directly into the store, as another client would.
    pub fn put(&self, key: &str, value: &[u8]) {
        self.shared.store(key, 0, 0, value.to_vec());
    }

    pub fn put_with(&self, key: &str, value: &[u8], flags: u32, exptime: i64) {
        self.shared.store(key, flags, exptime, value.to_vec());
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.shared
            .items
            .lock()
            .unwrap()
            .get(key)
            .map(|item| item.data.clone())
    }

    pub fn exptime(&self, key: &str) -> Option<i64> {
        self.shared
            .items
            .lock()
            .unwrap()
            .get(key)
            .map(|item| item.exptime)
    }

    pub fn remove(&self, key: &str) {
        self.shared.items.lock().unwrap().remove(key);
    }

    /// Number of client connections the server has seen close.
    pub fn closed_connections(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(stream: TcpStream, shared: &Shared, behavior: &Behavior) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let parts: Vec<&str> = line.trim_end().split(' ').collect();

        let reply: Vec<u8> = match parts.as_slice() {
            ["get", keys @ ..] | ["gets", keys @ ..] if !keys.is_empty() => {
                let with_cas = parts[0] == "gets";
                let mut out = Vec::new();
                let mut items = shared.items.lock().unwrap();
                for key in keys {
                    if let Some(item) = items.get_mut(*key) {
                        item.fetched = true;
                        let header = if with_cas {
                            format!("VALUE {} {} {} {}\r\n", key, item.flags, item.data.len(), item.cas)
                        } else {
                            format!("VALUE {} {} {}\r\n", key, item.flags, item.data.len())
                        };
                        out.extend_from_slice(header.as_bytes());
                        out.extend_from_slice(&item.data);
                        out.extend_from_slice(b"\r\n");
                    }
                }
                out.extend_from_slice(b"END\r\n");
                out
            }
            ["set", key, flags, exptime, len] => {
                let data = read_block(&mut reader, len).await?;
                shared.store(key, flags.parse().unwrap_or(0), exptime.parse().unwrap_or(0), data);
                b"STORED\r\n".to_vec()
            }
            ["cas", key, flags, exptime, len, cas] => {
                let data = read_block(&mut reader, len).await?;
                shared
                    .compare_and_store(
                        key,
                        flags.parse().unwrap_or(0),
                        exptime.parse().unwrap_or(0),
                        data,
                        cas.parse().unwrap_or(0),
                    )
                    .to_vec()
            }
            ["delete", key] => {
                let removed = shared.items.lock().unwrap().remove(*key);
                if removed.is_some() {
                    b"DELETED\r\n".to_vec()
                } else {
                    b"NOT_FOUND\r\n".to_vec()
                }
            }
            ["version"] => {
                if behavior.stall_version {
                    std::future::pending::<()>().await;
                }
                format!("VERSION {}\r\n", behavior.version).into_bytes()
            }
            ["stats"] => {
                if behavior.stall_stats {
                    std::future::pending::<()>().await;
                }
                stats_reply(shared, behavior).into_bytes()
            }
            ["lru_crawler", "metadump", "all"] => {
                return metadump(reader, shared, behavior).await;
            }
            _ => b"ERROR\r\n".to_vec(),
        };

        reader.get_mut().write_all(&reply).await?;
        reader.get_mut().flush().await?;
    }
}

async fn read_block(reader: &mut BufReader<TcpStream>, len: &str) -> std::io::Result<Vec<u8>> {
    let len: usize = len.parse().unwrap_or(0);
    let mut data = vec![0u8; len + 2];
    reader.read_exact(&mut data).await?;
    data.truncate(len);
    Ok(data)
}

fn stats_reply(shared: &Shared, behavior: &Behavior) -> String {
    let items = shared.items.lock().unwrap();
    let bytes: usize = items.values().map(|item| item.data.len()).sum();
    let mut out = String::new();
    out.push_str("STAT pid 4242\r\n");
    out.push_str("STAT uptime 120\r\n");
    if !behavior.omit_version {
        out.push_str(&format!("STAT version {}\r\n", behavior.version));
    }
    out.push_str(&format!("STAT curr_items {}\r\n", items.len()));
    out.push_str(&format!("STAT bytes {}\r\n", bytes));
    out.push_str("STAT limit_maxbytes 67108864\r\n");
    out.push_str("STAT get_hits 30\r\n");
    out.push_str("STAT get_misses 10\r\n");
    out.push_str("END\r\n");
    out
}

async fn metadump(
    mut reader: BufReader<TcpStream>,
    shared: &Shared,
    behavior: &Behavior,
) -> std::io::Result<()> {
    let lines: Vec<String> = match &behavior.metadump_script {
        Some(script) => script.clone(),
        None => {
            let items = shared.items.lock().unwrap();
            let mut keys: Vec<_> = items.iter().collect();
            keys.sort_by(|a, b| a.0.cmp(b.0));
            keys.into_iter()
                .map(|(key, item)| {
                    format!(
                        "key={} exp={} la=1700000000 cas={} fetch={} cls=1 size={}",
                        urlencoding::encode(key),
                        item.exptime,
                        item.cas,
                        if item.fetched { "yes" } else { "no" },
                        item.data.len() + key.len() + 50,
                    )
                })
                .collect()
        }
    };

    for line in lines {
        if let Some(delay) = behavior.metadump_delay {
            tokio::time::sleep(delay).await;
        }
        reader.get_mut().write_all(line.as_bytes()).await?;
        reader.get_mut().write_all(b"\r\n").await?;
        reader.get_mut().flush().await?;
    }

    if behavior.metadump_hang {
        // hold the socket until the client goes away
        let mut sink = Vec::new();
        while reader.read_until(b'\n', &mut sink).await? > 0 {
            sink.clear();
        }
        return Ok(());
    }

    reader.get_mut().write_all(b"END\r\n").await?;
    reader.get_mut().flush().await?;
    Ok(())
}
