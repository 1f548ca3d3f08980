//! qdispatch: run statements from stdin through the dispatcher.
//!
//! # Usage
//!
//! ```bash
//! printf 'CREATE TABLE t (x INTEGER)\nINSERT INTO t VALUES (1)\nSELECT * FROM t\n' \
//!     | qdispatch --data-dir ./data --schema app --use-separate-thread false
//! ```
//!
//! Lines starting with a read keyword (`SELECT`, `WITH`, ...) are
//! submitted as reads and printed as JSON; everything else is submitted
//! as a write. Environment variables can also be used:
//! - `QDISPATCH_DATA_DIR`: Data directory for SQLite
//! - `QDISPATCH_SCHEMA`: Schema (database file) name
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::Context;
use qdispatch::config::Config;
use qdispatch::observability::tracing::init_tracing;
use qdispatch::provider::SqliteProvider;
use qdispatch::Dispatcher;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// How long to wait for queued work before exiting.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const READ_KEYWORDS: [&str; 6] = ["SELECT", "WITH", "PRAGMA", "EXPLAIN", "VALUES", "SHOW"];

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  qdispatch v{}

  Configuration:
    Database:    {}:{}/{}
    Data Dir:    {}
    Cache:       {} (fresh for {} ms)
    Async:       {}
    Log Level:   {}
"#,
        version,
        config.address,
        config.port,
        config.schema,
        config.data_dir.display(),
        config.use_cache,
        config.freshness_window_ms,
        config.use_separate_thread,
        config.log_level
    );
}

fn is_read(line: &str) -> bool {
    let keyword = line.split_whitespace().next().unwrap_or_default();
    READ_KEYWORDS
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

/// Next input line, or `None` at end of input.
///
/// A read error (such as invalid UTF-8) ends input the same way EOF does,
/// so queued work is still drained before exit.
async fn next_line<R>(lines: &mut Lines<R>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    match lines.next_line().await {
        Ok(line) => line,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read input; draining and exiting");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse_args();

    init_tracing(&config.log_level);

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    print_banner(&config);

    let provider = Arc::new(SqliteProvider::new(&config.data_dir));
    let dispatcher = Arc::new(Dispatcher::new(config, provider)?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = next_line(&mut lines) => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, draining and exiting...");
                None
            }
        };
        let Some(line) = line else { break };
        let statement = line.trim().to_string();
        if statement.is_empty() {
            continue;
        }

        if is_read(&statement) {
            let d = Arc::clone(&dispatcher);
            let query = statement.clone();
            let result = tokio::task::spawn_blocking(move || d.submit_read(&query)).await?;
            match result {
                Some(rows) => println!("{}", serde_json::to_string(&*rows)?),
                None => println!("null"),
            }
        } else {
            // Runs inline when separate-thread execution is disabled.
            let d = Arc::clone(&dispatcher);
            tokio::task::spawn_blocking(move || d.submit_write(&statement)).await?;
        }
    }

    let d = Arc::clone(&dispatcher);
    let idle = tokio::task::spawn_blocking(move || d.wait_idle(DRAIN_TIMEOUT)).await?;
    if !idle {
        tracing::warn!(pending = dispatcher.pending(), "Timed out waiting for queued work");
    }

    tracing::info!(
        metrics = %serde_json::to_string(&dispatcher.metrics())?,
        "qdispatch shutdown complete"
    );
    Ok(())
}
