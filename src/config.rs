//! Configuration parsing for qdispatch.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Defaults matching a local MySQL-style setup

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::ConnectionParams;

/// qdispatch: queued, cached query dispatch.
#[derive(Parser, Debug, Clone)]
#[command(name = "qdispatch")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Database host address
    #[arg(long, env = "QDISPATCH_ADDRESS", default_value = "localhost")]
    pub address: String,

    /// Database port (0 means 3306)
    #[arg(short, long, env = "QDISPATCH_PORT", default_value_t = 3306)]
    pub port: u16,

    /// Database user
    #[arg(short, long, env = "QDISPATCH_USERNAME", default_value = "root")]
    pub username: String,

    /// Database password
    #[arg(long, env = "QDISPATCH_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Schema (database) name
    #[arg(short, long, env = "QDISPATCH_SCHEMA", default_value = "database")]
    pub schema: String,

    /// Serve reads from the cache
    #[arg(long, env = "QDISPATCH_USE_CACHE", default_value_t = true, action = ArgAction::Set)]
    pub use_cache: bool,

    /// Execute queued operations off the scheduler thread
    #[arg(long, env = "QDISPATCH_USE_SEPARATE_THREAD", default_value_t = true, action = ArgAction::Set)]
    pub use_separate_thread: bool,

    /// Age in milliseconds after which a cached result is refreshed
    #[arg(long, env = "QDISPATCH_FRESHNESS_WINDOW_MS", default_value_t = 60_000)]
    pub freshness_window_ms: u64,

    /// Scheduler tick interval in milliseconds
    #[arg(long, env = "QDISPATCH_TICK_INTERVAL_MS", default_value_t = 10)]
    pub tick_interval_ms: u64,

    /// Execution worker threads (0 spawns a thread per operation)
    #[arg(long, env = "QDISPATCH_WORKER_THREADS", default_value_t = 0)]
    pub worker_threads: usize,

    /// Data directory for SQLite databases
    #[arg(short, long, env = "QDISPATCH_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    /// Tick interval, never shorter than 1ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Parameters handed to the connection provider.
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams::new(
            self.address.clone(),
            self.port,
            self.username.clone(),
            self.password.clone(),
            self.schema.clone(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "localhost".into(),
            port: 3306,
            username: "root".into(),
            password: String::new(),
            schema: "database".into(),
            use_cache: true,
            use_separate_thread: true,
            freshness_window_ms: 60_000,
            tick_interval_ms: 10,
            worker_threads: 0,
            data_dir: PathBuf::from("./data"),
            log_level: "info".into(),
        }
    }
}
