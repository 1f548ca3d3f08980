//! Statement execution against a fresh connection.
//!
//! Every execution opens its own connection, runs one statement and
//! closes the connection on every exit path. Connection and statement
//! failures are logged and swallowed: a failed write is dropped, a failed
//! read yields `None` and leaves the cache untouched.

use std::sync::Arc;

use crate::cache::ReaderCache;
use crate::error::DbError;
use crate::observability::metrics::DispatchMetrics;
use crate::provider::{Connection, ConnectionParams, ConnectionProvider, ResultSet};

/// Connection that is closed when dropped.
struct ScopedConnection {
    inner: Option<Box<dyn Connection>>,
}

impl ScopedConnection {
    fn open(provider: &dyn ConnectionProvider, params: &ConnectionParams) -> Result<Self, DbError> {
        Ok(Self {
            inner: Some(provider.open(params)?),
        })
    }

    fn get(&mut self) -> Result<&mut (dyn Connection + 'static), DbError> {
        self.inner
            .as_deref_mut()
            .ok_or_else(|| DbError::Connection("connection already closed".into()))
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.inner.take() {
            if let Err(e) = conn.close() {
                tracing::warn!(error = %e, "Failed to close connection");
            }
        }
    }
}

/// Runs statements and feeds read results into the cache.
pub struct Executor {
    provider: Arc<dyn ConnectionProvider>,
    params: ConnectionParams,
    cache: Arc<ReaderCache>,
    use_cache: bool,
    metrics: Arc<DispatchMetrics>,
}

impl Executor {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        params: ConnectionParams,
        cache: Arc<ReaderCache>,
        use_cache: bool,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            provider,
            params,
            cache,
            use_cache,
            metrics,
        }
    }

    /// Run a non-query, discarding any failure.
    pub fn write(&self, query: &str) {
        match self.try_write(query) {
            Ok(()) => {
                self.metrics.record_write();
                tracing::debug!(query, "Write executed");
            }
            Err(e) => {
                self.metrics.record_failure();
                tracing::warn!(query, error = %e, "Write failed; dropped");
            }
        }
    }

    /// Run a reader query and return its rows, bypassing the cache.
    pub fn read(&self, query: &str) -> Option<Arc<ResultSet>> {
        match self.try_read(query) {
            Ok(result) => {
                self.metrics.record_read();
                tracing::debug!(query, rows = result.len(), "Read executed");
                Some(Arc::new(result))
            }
            Err(e) => {
                self.metrics.record_failure();
                tracing::warn!(query, error = %e, "Read failed; no result");
                None
            }
        }
    }

    /// Run a reader query and store a successful result in the cache.
    pub fn read_and_cache(&self, query: &str) -> Option<Arc<ResultSet>> {
        let result = self.read(query)?;
        if self.use_cache {
            self.cache.put(query, Arc::clone(&result));
        }
        Some(result)
    }

    /// Open and close one connection without running a statement.
    pub fn check_connection(&self) -> Result<(), DbError> {
        let mut conn = ScopedConnection::open(self.provider.as_ref(), &self.params)?;
        conn.get().map(|_| ())
    }

    fn try_write(&self, query: &str) -> Result<(), DbError> {
        let mut conn = ScopedConnection::open(self.provider.as_ref(), &self.params)?;
        conn.get()?.execute(query)
    }

    fn try_read(&self, query: &str) -> Result<ResultSet, DbError> {
        let mut conn = ScopedConnection::open(self.provider.as_ref(), &self.params)?;
        conn.get()?.execute_query(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::provider::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider whose connections fail every statement but count closes.
    #[derive(Default)]
    struct FailingStatements {
        closes: Arc<AtomicUsize>,
    }

    struct FailingConnection {
        closes: Arc<AtomicUsize>,
    }

    impl ConnectionProvider for FailingStatements {
        fn open(&self, _: &ConnectionParams) -> Result<Box<dyn Connection>, DbError> {
            Ok(Box::new(FailingConnection {
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    impl Connection for FailingConnection {
        fn execute(&mut self, _: &str) -> Result<(), DbError> {
            Err(DbError::Execution("syntax error".into()))
        }

        fn execute_query(&mut self, _: &str) -> Result<ResultSet, DbError> {
            Err(DbError::Execution("syntax error".into()))
        }

        fn close(self: Box<Self>) -> Result<(), DbError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Unreachable;

    impl ConnectionProvider for Unreachable {
        fn open(&self, _: &ConnectionParams) -> Result<Box<dyn Connection>, DbError> {
            Err(DbError::Connection("connection refused".into()))
        }
    }

    struct Fixed;

    struct FixedConnection;

    impl ConnectionProvider for Fixed {
        fn open(&self, _: &ConnectionParams) -> Result<Box<dyn Connection>, DbError> {
            Ok(Box::new(FixedConnection))
        }
    }

    impl Connection for FixedConnection {
        fn execute(&mut self, _: &str) -> Result<(), DbError> {
            Ok(())
        }

        fn execute_query(&mut self, _: &str) -> Result<ResultSet, DbError> {
            Ok(ResultSet::new(vec!["n".into()], vec![vec![Value::Integer(1)]]))
        }

        fn close(self: Box<Self>) -> Result<(), DbError> {
            Err(DbError::Close("already closed".into()))
        }
    }

    fn executor(provider: Arc<dyn ConnectionProvider>, use_cache: bool) -> (Executor, Arc<ReaderCache>) {
        let cache = Arc::new(ReaderCache::new(Arc::new(ManualClock::new(0))));
        let exec = Executor::new(
            provider,
            ConnectionParams::new("localhost", 0, "root", "", "app"),
            Arc::clone(&cache),
            use_cache,
            Arc::new(DispatchMetrics::new()),
        );
        (exec, cache)
    }

    #[test]
    fn test_connection_closed_after_failed_statement() {
        let provider = Arc::new(FailingStatements::default());
        let closes = Arc::clone(&provider.closes);
        let (exec, cache) = executor(provider, true);

        exec.write("DROP TABLE nope");
        assert!(exec.read_and_cache("SELECT * FROM nope").is_none());

        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
        assert_eq!(exec.metrics.snapshot().executions_failed, 2);
    }

    #[test]
    fn test_open_failure_is_swallowed() {
        let (exec, cache) = executor(Arc::new(Unreachable), true);
        exec.write("INSERT INTO t VALUES (1)");
        assert!(exec.read_and_cache("SELECT 1").is_none());
        assert!(cache.get("SELECT 1").is_none());
    }

    #[test]
    fn test_close_failure_does_not_lose_result() {
        let (exec, cache) = executor(Arc::new(Fixed), true);
        let result = exec.read_and_cache("SELECT 1").unwrap();
        assert_eq!(result.len(), 1);
        assert!(cache.get("SELECT 1").is_some());
    }

    #[test]
    fn test_check_connection() {
        let provider = Arc::new(FailingStatements::default());
        let closes = Arc::clone(&provider.closes);
        let (exec, _) = executor(provider, true);
        assert!(exec.check_connection().is_ok());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let (exec, _) = executor(Arc::new(Unreachable), true);
        assert!(matches!(exec.check_connection(), Err(DbError::Connection(_))));
        assert_eq!(exec.metrics.snapshot().executions_failed, 0);
    }

    #[test]
    fn test_cache_disabled_leaves_cache_empty() {
        let (exec, cache) = executor(Arc::new(Fixed), false);
        assert!(exec.read_and_cache("SELECT 1").is_some());
        assert!(cache.is_empty());
    }
}
