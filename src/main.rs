//! mcinspect - Memcached inspection from the command line
//!
//! A thin operator binary over the library: probe a server, print its
//! stats, walk its keys, and read or edit single values.

use anyhow::{bail, Context};
use mcinspect::client::unix_now;
use mcinspect::protocol::{filter_keys, sort_keys};
use mcinspect::{
    CancelScope, CapabilityProbe, Client, ClientConfig, Compression, EnumeratorConfig,
    ExpirationSpec, Item, KeyEnumerator, ProfileStore, ServerAddress, ServerProfile, SortField,
    SortOrder,
};
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command-line configuration
struct Config {
    /// Explicit `host:port`, overrides any profile
    server: Option<String>,
    /// Profile to connect to
    profile: Option<String>,
    /// Per-request timeout
    timeout: Duration,
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: None,
            profile: None,
            timeout: Duration::from_secs(3),
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--server" | "-s" => {
                    config.server = Some(flag_value(&args, i, "--server"));
                    i += 2;
                }
                "--profile" | "-p" => {
                    config.profile = Some(flag_value(&args, i, "--profile"));
                    i += 2;
                }
                "--timeout" | "-t" => {
                    let secs: f64 = flag_value(&args, i, "--timeout").parse().unwrap_or_else(|_| {
                        eprintln!("Error: --timeout takes a number of seconds");
                        std::process::exit(1);
                    });
                    if !secs.is_finite() || secs <= 0.0 {
                        eprintln!("Error: --timeout must be positive");
                        std::process::exit(1);
                    }
                    config.timeout = Duration::from_secs_f64(secs);
                    i += 2;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("mcinspect version {}", mcinspect::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    config.command = args[i..].to_vec();
                    break;
                }
            }
        }

        config
    }
}

fn flag_value(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
mcinspect - Inspect a Memcached server

USAGE:
    mcinspect [OPTIONS] <COMMAND> [ARGS]

OPTIONS:
    -s, --server <HOST:PORT>  Server to talk to (overrides profiles)
    -p, --profile <NAME>      Saved server profile to use
    -t, --timeout <SECS>      Per-request timeout (default: 3)
    -v, --version             Print version information
    -h, --help                Print this help message

COMMANDS:
    probe                             Report version and metadump support
    stats                             Print server statistics
    keys [--filter S] [--sort F] [--desc] [--limit N]
                                      Walk live keys (F: key, size, exp, la, cls, cas)
    get <KEY>                         Print a value, decompressed if needed
    set <KEY> <VALUE> [--ttl N] [--flags N]
                                      Store a value
    edit <KEY> <VALUE> [--ttl N]      Replace a value only if nobody else changed it
                                      (keeps the current expiration unless --ttl is given)
    delete <KEY>                      Remove a key
    servers                           List saved profiles
    servers add <NAME> <HOST:PORT> [--default]
    servers remove <NAME>
    servers default <NAME>

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=mcinspect=debug) for diagnostics on stderr.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install log subscriber")?;

    let store = ProfileStore::for_app(mcinspect::APP_NAME);
    let args: Vec<&str> = config.command.iter().map(String::as_str).collect();

    match args.as_slice() {
        [] => {
            print_help();
            Ok(())
        }
        ["servers", rest @ ..] => servers(&store, rest),
        [command, rest @ ..] => {
            let (addr, profile) = resolve_server(&config, &store)?;
            run(command, rest, &addr, &config).await?;
            if let Some(name) = profile {
                if let Err(e) = store.set_last_used(&name) {
                    warn!(profile = %name, error = %e, "Could not record last used profile");
                }
            }
            Ok(())
        }
    }
}

/// `--server` wins, then `--profile`, then the last used profile.
fn resolve_server(
    config: &Config,
    store: &ProfileStore,
) -> anyhow::Result<(ServerAddress, Option<String>)> {
    if let Some(server) = &config.server {
        return Ok((ServerAddress::parse(server)?, None));
    }

    let profile = match &config.profile {
        Some(name) => store
            .get(name)?
            .with_context(|| format!("no server profile named {:?}", name))?,
        None => store
            .get_last_used()?
            .context("no server profiles configured")?,
    };
    info!(profile = %profile.name, server = %profile.address, "Using server profile");
    Ok((ServerAddress::parse(&profile.address)?, Some(profile.name)))
}

async fn run(command: &str, args: &[&str], addr: &ServerAddress, config: &Config) -> anyhow::Result<()> {
    let client_config = ClientConfig {
        timeout: config.timeout,
        ..Default::default()
    };

    match (command, args) {
        ("probe", []) => {
            let capability = CapabilityProbe::default().detect(addr).await?;
            println!("server:   {}", addr);
            println!("version:  {}", capability.version_string);
            println!(
                "metadump: {}",
                if capability.supports_metadump { "supported" } else { "unsupported (needs 1.4.31+)" }
            );
        }
        ("stats", []) => {
            let client = Client::with_config(addr.as_str(), client_config)?;
            let stats = client.stats(&CancelScope::background()).await?;
            println!("version:      {}", stats.version);
            println!("uptime:       {}s", stats.uptime_duration().as_secs());
            println!("items:        {} (total {})", stats.curr_items, stats.total_items);
            println!("connections:  {} (total {})", stats.curr_connections, stats.total_connections);
            println!("memory:       {} / {} bytes ({:.1}%)", stats.bytes, stats.limit_maxbytes, stats.memory_usage_percent);
            println!("hit rate:     {:.1}% ({} hits, {} misses)", stats.hit_rate, stats.get_hits, stats.get_misses);
            println!("evictions:    {}", stats.evictions);
        }
        ("keys", rest) => keys(addr, rest).await?,
        ("get", [key]) => {
            let client = Client::with_config(addr.as_str(), client_config)?;
            let item = client.get(key).await?;
            let compression = item.compression();
            let value = item.decoded_value()?;
            if compression != Compression::None {
                eprintln!("({} compressed, {} -> {} bytes)", compression, item.size(), value.len());
            }
            println!("flags: {}", item.flags);
            println!("{}", String::from_utf8_lossy(&value));
        }
        ("set", [key, value, rest @ ..]) => {
            let mut item = Item::new(*key, value.to_string());
            let mut i = 0;
            while i < rest.len() {
                match (rest[i], rest.get(i + 1)) {
                    ("--ttl", Some(n)) => item.expiration = Some(n.parse::<i32>().context("--ttl")?.into()),
                    ("--flags", Some(n)) => item.flags = n.parse().context("--flags")?,
                    (other, _) => bail!("unexpected argument {:?}", other),
                }
                i += 2;
            }
            Client::with_config(addr.as_str(), client_config)?.set(&item).await?;
            println!("STORED");
        }
        ("edit", [key, value, rest @ ..]) => {
            let ttl = match rest {
                [] => None,
                ["--ttl", n] => Some(ExpirationSpec::from(n.parse::<i32>().context("--ttl")?)),
                [other, ..] => bail!("unexpected argument {:?}", other),
            };
            let client = Client::with_config(addr.as_str(), client_config)?;
            let mut item = client.get_with_token(key).await?;
            item.expiration = Some(match ttl {
                Some(spec) => spec,
                None => current_expiration(addr, key).await?,
            });
            item.value = value.to_string().into();
            client.compare_and_swap(&item).await?;
            println!("STORED (was cas {})", item.cas_id());
        }
        ("delete", [key]) => {
            Client::with_config(addr.as_str(), client_config)?.delete(key).await?;
            println!("DELETED");
        }
        _ => {
            print_help();
            bail!("unknown command or wrong arguments: {}", command);
        }
    }
    Ok(())
}

/// Reads the key's stored expiration out of a metadump walk, so an edit
/// does not reset it. Runs after `gets`: a write in between changes the
/// CAS token and the swap fails anyway.
async fn current_expiration(addr: &ServerAddress, key: &str) -> anyhow::Result<ExpirationSpec> {
    CapabilityProbe::default()
        .verify(addr)
        .await
        .context("cannot read the current expiration; pass --ttl")?;
    let meta = KeyEnumerator::new(addr.as_str())?
        .find(key, &CancelScope::background())
        .await?
        .with_context(|| format!("{:?} not found in metadump; pass --ttl", key))?;
    ExpirationSpec::from_unix(meta.expiration_unix).with_context(|| {
        format!(
            "expiration {} of {:?} cannot be written back; pass --ttl",
            meta.expiration_unix, key
        )
    })
}

async fn keys(addr: &ServerAddress, args: &[&str]) -> anyhow::Result<()> {
    let mut filter = "";
    let mut sort = SortField::Key;
    let mut order = SortOrder::Ascending;
    let mut limit = usize::MAX;

    let mut i = 0;
    while i < args.len() {
        match (args[i], args.get(i + 1)) {
            ("--filter", Some(s)) => filter = *s,
            ("--sort", Some(f)) => sort = f.parse()?,
            ("--limit", Some(n)) => limit = n.parse().context("--limit")?,
            ("--desc", _) => {
                order = SortOrder::Descending;
                i += 1;
                continue;
            }
            (other, _) => bail!("unexpected argument {:?}", other),
        }
        i += 2;
    }

    CapabilityProbe::default().verify(addr).await?;

    let (handle, scope) = CancelScope::new();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            handle.cancel("interrupted");
        }
    });

    let enumerator = KeyEnumerator::with_config(addr.as_str(), EnumeratorConfig::default())?;
    let mut stream = enumerator.enumerate(&scope);
    let mut keys = Vec::new();
    while let Some(meta) = stream.next().await {
        keys.push(meta);
    }
    if let Err(e) = stream.finish().await {
        if !e.is_interrupt() || keys.is_empty() {
            return Err(e.into());
        }
        warn!(error = %e, collected = keys.len(), "Enumeration stopped early");
    }

    sort_keys(&mut keys, sort, order);
    let now = unix_now();
    for meta in filter_keys(&keys, filter).into_iter().take(limit) {
        let ttl = match meta.ttl_remaining(now) {
            None => "never".to_string(),
            Some(secs) => format!("{}s", secs),
        };
        println!(
            "{:<40} {:>8}B  ttl={:<8} cls={:<3} cas={}{}",
            meta.key,
            meta.size_bytes,
            ttl,
            meta.slab_class,
            meta.cas_id,
            if meta.is_expired(now) { "  (expired)" } else { "" }
        );
    }
    Ok(())
}

fn servers(store: &ProfileStore, args: &[&str]) -> anyhow::Result<()> {
    match args {
        [] => {
            let set = store.load()?;
            let last = set.get_last_used().map(|p| p.name.clone());
            for profile in &set.servers {
                println!(
                    "{} {:<20} {}{}",
                    if Some(&profile.name) == last.as_ref() { "*" } else { " " },
                    profile.name,
                    profile.address,
                    if profile.is_default { "  (default)" } else { "" }
                );
            }
        }
        ["add", name, address, rest @ ..] => {
            let mut profile = ServerProfile::new(*name, *address);
            match rest {
                [] => {}
                ["--default"] => profile = profile.as_default(),
                _ => bail!("unexpected arguments {:?}", rest),
            }
            store.add(profile)?;
            println!("added {}", name);
        }
        ["remove", name] => {
            store.remove(name)?;
            println!("removed {}", name);
        }
        ["default", name] => {
            store.set_default(name)?;
            println!("{} is now the default", name);
        }
        _ => bail!("usage: servers [add <NAME> <HOST:PORT> [--default] | remove <NAME> | default <NAME>]"),
    }
    Ok(())
}
