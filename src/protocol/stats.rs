//! `stats` Reply Parsing
//!
//! The server answers `stats` with one `STAT <name> <value>` line per
//! counter followed by `END`. [`Stats::parse`] keeps every line in a raw map
//! and decodes the well-known counters into typed fields. A known counter
//! that fails to parse reads as zero; the raw map still holds the original
//! text.

use std::collections::HashMap;
use std::time::Duration;

/// Parsed server statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub pid: u32,
    /// Seconds since the server started
    pub uptime: u64,
    pub version: String,
    pub curr_connections: u64,
    pub total_connections: u64,
    pub curr_items: u64,
    pub total_items: u64,
    /// Bytes currently used to store items
    pub bytes: u64,
    /// Memory limit in bytes
    pub limit_maxbytes: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub evictions: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,

    /// `get_hits / (get_hits + get_misses) * 100`, zero when undefined
    pub hit_rate: f64,
    /// `bytes / limit_maxbytes * 100`, zero when undefined
    pub memory_usage_percent: f64,

    /// Every `STAT` line, name to value
    pub raw: HashMap<String, String>,
}

impl Stats {
    /// Parses a complete `stats` reply.
    pub fn parse(response: &str) -> Self {
        Self::from_lines(response.split('\n'))
    }

    /// Parses reply lines, as returned by the raw transport.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stats = Stats::default();

        for line in lines {
            let line = line.as_ref().trim_end_matches('\r');
            if line.is_empty() || line == "END" {
                continue;
            }

            let rest = match line.strip_prefix("STAT ") {
                Some(rest) => rest,
                None => continue,
            };
            let (name, value) = match rest.split_once(' ') {
                Some((name, value)) if !name.is_empty() => (name, value),
                _ => continue,
            };

            stats.apply(name, value);
            stats.raw.insert(name.to_string(), value.to_string());
        }

        stats.compute_derived();
        stats
    }

    fn apply(&mut self, name: &str, value: &str) {
        fn num<T: std::str::FromStr + Default>(value: &str) -> T {
            value.trim().parse().unwrap_or_default()
        }

        match name {
            "pid" => self.pid = num(value),
            "uptime" => self.uptime = num(value),
            "version" => self.version = value.to_string(),
            "curr_connections" => self.curr_connections = num(value),
            "total_connections" => self.total_connections = num(value),
            "curr_items" => self.curr_items = num(value),
            "total_items" => self.total_items = num(value),
            "bytes" => self.bytes = num(value),
            "limit_maxbytes" => self.limit_maxbytes = num(value),
            "get_hits" => self.get_hits = num(value),
            "get_misses" => self.get_misses = num(value),
            "evictions" => self.evictions = num(value),
            "bytes_read" => self.bytes_read = num(value),
            "bytes_written" => self.bytes_written = num(value),
            _ => {}
        }
    }

    fn compute_derived(&mut self) {
        // counters near u64::MAX would overflow an integer sum
        let lookups = self.get_hits as f64 + self.get_misses as f64;
        self.hit_rate = if lookups > 0.0 {
            self.get_hits as f64 / lookups * 100.0
        } else {
            0.0
        };

        self.memory_usage_percent = if self.limit_maxbytes > 0 {
            self.bytes as f64 / self.limit_maxbytes as f64 * 100.0
        } else {
            0.0
        };
    }

    /// Raw value of any `STAT` line.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(String::as_str)
    }

    pub fn uptime_duration(&self) -> Duration {
        Duration::from_secs(self.uptime)
    }
}
