//! Test utilities for qdispatch integration tests.
//!
//! Provides:
//! - A scripted in-memory connection provider
//! - Temporary data directory fixtures
//! - Polling helpers for background work

#![allow(dead_code)]

use qdispatch::config::Config;
use qdispatch::error::DbError;
use qdispatch::provider::{Connection, ConnectionParams, ConnectionProvider, ResultSet, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Provider that records every statement and answers reads with a
/// per-query execution counter.
///
/// The n-th execution of a read returns a single row `version = n`, so a
/// test can tell which execution produced a cached value.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    inner: Arc<Script>,
}

#[derive(Default)]
struct Script {
    reads: Mutex<HashMap<String, i64>>,
    writes: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    fail_open: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

struct ScriptedConnection {
    script: Arc<Script>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `open` fail with a connection error.
    pub fn set_fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make statements with this exact text fail with an execution error.
    pub fn fail_query(&self, query: &str) {
        self.inner.failing.lock().unwrap().insert(query.to_string());
    }

    /// Successful executions of a read so far.
    pub fn reads_of(&self, query: &str) -> i64 {
        self.inner.reads.lock().unwrap().get(query).copied().unwrap_or(0)
    }

    /// Successfully executed writes, in execution order.
    pub fn writes(&self) -> Vec<String> {
        self.inner.writes.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

impl ConnectionProvider for ScriptedProvider {
    fn open(&self, _params: &ConnectionParams) -> Result<Box<dyn Connection>, DbError> {
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(DbError::Connection("connection refused".into()));
        }
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.inner),
        }))
    }
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        if self.script.failing.lock().unwrap().contains(sql) {
            return Err(DbError::Execution(format!("rejected: {sql}")));
        }
        self.script.writes.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    fn execute_query(&mut self, sql: &str) -> Result<ResultSet, DbError> {
        if self.script.failing.lock().unwrap().contains(sql) {
            return Err(DbError::Execution(format!("rejected: {sql}")));
        }
        let mut reads = self.script.reads.lock().unwrap();
        let n = reads.entry(sql.to_string()).or_insert(0);
        *n += 1;
        Ok(ResultSet::new(
            vec!["version".into()],
            vec![vec![Value::Integer(*n)]],
        ))
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The `version` cell of a result produced by [`ScriptedProvider`].
pub fn version(result: &ResultSet) -> i64 {
    match result.get(0, "version") {
        Some(Value::Integer(n)) => *n,
        other => panic!("unexpected version cell: {other:?}"),
    }
}

/// Test fixture that manages a temporary data directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let data_dir = temp_dir.path().to_path_buf();
        Self { temp_dir, data_dir }
    }

    /// Default config pointed at this fixture, with a fast tick.
    pub fn config(&self) -> Config {
        Config {
            data_dir: self.data_dir.clone(),
            schema: "test".into(),
            tick_interval_ms: 1,
            ..Config::default()
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Config for scripted-provider tests.
pub fn fast_config() -> Config {
    Config {
        tick_interval_ms: 1,
        ..Config::default()
    }
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.data_dir.exists());
        assert_eq!(fixture.config().data_dir, fixture.data_dir);
    }
}
