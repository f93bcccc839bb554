//! Command-line and environment configuration, modeled on the teacher's
//! `clap::Parser`-derived `APIConfig` (`full-service/src/config.rs`): every
//! field is either a flag or an env var, nothing is read from a config file
//! parsed by hand, and a `Duration` field gets a `value_parser` that accepts
//! plain seconds.

use std::time::Duration;

use clap::Parser;

fn parse_seconds(src: &str) -> Result<Duration, String> {
    let secs: u64 = src
        .parse()
        .map_err(|e| format!("invalid duration {src:?}: {e}"))?;
    Ok(Duration::from_secs(secs))
}

fn parse_days(src: &str) -> Result<chrono::Duration, String> {
    let days: i64 = src
        .parse()
        .map_err(|e| format!("invalid day count {src:?}: {e}"))?;
    Ok(chrono::Duration::days(days))
}

/// Process-wide configuration for the `ledger-sync` binary (§5, §9
/// "configuration is passed to the ledger service and sync service at
/// construction — no global mutable state").
#[derive(Clone, Debug, Parser)]
#[clap(name = "ledger-sync", about = "Wallet ledger sync daemon", version)]
pub struct Config {
    /// Postgres connection string.
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Size of the r2d2 connection pool.
    #[clap(long, default_value = "10", env = "DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: u32,

    /// Seconds between sync driver ticks. Also used as the "due for resync"
    /// threshold for wallets not already PENDING (§4.6 step 1).
    #[clap(long, default_value = "300", value_parser = parse_seconds, env = "SYNC_TICK_INTERVAL_SECS")]
    pub sync_tick_interval: Duration,

    /// Maximum wallets synced concurrently (§4.6 step 1, §5).
    #[clap(long, default_value = "3", env = "SYNC_MAX_CONCURRENCY")]
    pub sync_max_concurrency: usize,

    /// How many days back to look on a wallet's first sync (§4.6 step 3a).
    #[clap(long, default_value = "90", value_parser = parse_days, env = "SYNC_INITIAL_LOOKBACK_DAYS")]
    pub sync_initial_lookback: chrono::Duration,

    /// `tracing_subscriber::EnvFilter` directive, e.g. `ledger_core=debug`.
    #[clap(long, default_value = "info", env = "LOG_FILTER")]
    pub log_filter: String,

    /// Emit logs as newline-delimited JSON instead of the default
    /// human-readable format.
    #[clap(long, env = "LOG_JSON")]
    pub log_json: bool,
}
