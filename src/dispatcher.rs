//! Public entry point for submitting statements.
//!
//! The dispatcher owns the configuration, the work queue, the reader
//! cache and the scheduler that drains the queue. It decides, per call,
//! whether a statement runs inline, goes through the queue, or is served
//! from the cache.
//!
//! # Execution paths
//!
//! | call | `use_separate_thread = true` | `false` |
//! |---|---|---|
//! | `submit_write` | enqueued, run on a worker | run inline on the caller |
//! | queued refresh | run on a worker | run inline on the scheduler thread |
//! | `submit_read` miss | run inline on the caller | run inline on the caller |
//!
//! Reads with caching enabled follow stale-while-revalidate: a stale hit
//! returns the cached rows and queues exactly one refresh.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cache::{CacheEntry, ReaderCache};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::DispatchError;
use crate::executor::Executor;
use crate::observability::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::operation::{Operation, OperationKind};
use crate::provider::{ConnectionProvider, ResultSet};
use crate::queue::WorkQueue;
use crate::scheduler::Scheduler;
use crate::worker::WorkerPool;

/// How often [`Dispatcher::wait_idle`] re-checks for outstanding work.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Queued, cached statement dispatcher.
///
/// Dropping the dispatcher stops the scheduler and the worker pool.
/// Operations still in the queue at that point are discarded.
pub struct Dispatcher {
    config: Config,
    queue: Arc<WorkQueue>,
    cache: Arc<ReaderCache>,
    executor: Arc<Executor>,
    workers: WorkerPool,
    metrics: Arc<DispatchMetrics>,
    scheduler: Scheduler,
}

impl Dispatcher {
    /// Create a dispatcher using the wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler or worker threads cannot start.
    pub fn new(
        config: Config,
        provider: Arc<dyn ConnectionProvider>,
    ) -> Result<Self, DispatchError> {
        Self::with_clock(config, provider, Arc::new(SystemClock))
    }

    /// Create a dispatcher whose cache ages entries by `clock`.
    ///
    /// Opens and closes one connection to check the database is reachable.
    /// An unreachable database is logged, not returned as an error.
    pub fn with_clock(
        config: Config,
        provider: Arc<dyn ConnectionProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DispatchError> {
        let metrics = Arc::new(DispatchMetrics::new());
        let cache = Arc::new(ReaderCache::new(clock));
        let executor = Arc::new(Executor::new(
            provider,
            config.connection_params(),
            Arc::clone(&cache),
            config.use_cache,
            Arc::clone(&metrics),
        ));
        match executor.check_connection() {
            Ok(()) => tracing::info!(schema = %config.schema, "Database reachable"),
            Err(e) => tracing::warn!(
                schema = %config.schema,
                error = %e,
                "Database unreachable at startup; statements will fail until it recovers"
            ),
        }

        let workers = WorkerPool::new(config.worker_threads)?;
        let queue = Arc::new(WorkQueue::new());

        {
            let executor = Arc::clone(&executor);
            let workers = workers.clone();
            let offload = config.use_separate_thread;
            queue.subscribe(move |operation| {
                process(&executor, &workers, offload, operation);
            });
        }

        let scheduler = Scheduler::spawn(config.tick_interval())?;
        queue.attach(&scheduler);

        tracing::info!(
            params = ?config.connection_params(),
            use_cache = config.use_cache,
            use_separate_thread = config.use_separate_thread,
            freshness_window_ms = config.freshness_window_ms,
            worker_threads = config.worker_threads,
            "Dispatcher started"
        );

        Ok(Self {
            config,
            queue,
            cache,
            executor,
            workers,
            metrics,
            scheduler,
        })
    }

    /// Submit a non-query.
    ///
    /// Failures are logged and dropped; the caller is never told.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn submit_write(&self, query: &str) {
        if self.config.use_separate_thread {
            self.queue.enqueue(Operation::write(query));
        } else {
            self.executor.write(query);
        }
    }

    /// Submit several non-queries in the given order.
    ///
    /// Submission order is preserved; with more than one execution thread
    /// completion order is not.
    pub fn submit_multiple_write<I, S>(&self, queries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for query in queries {
            self.submit_write(query.as_ref());
        }
    }

    /// Submit a reader query.
    ///
    /// With caching disabled the query always runs inline. Otherwise a
    /// fresh hit returns the cached rows, a stale hit returns the cached
    /// rows and queues a refresh, and a miss runs inline and caches the
    /// result. `None` means the execution failed and nothing was cached.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn submit_read(&self, query: &str) -> Option<Arc<ResultSet>> {
        if !self.config.use_cache {
            return self.executor.read(query);
        }

        let Some(entry) = self.cache.get(query) else {
            self.metrics.record_cache_miss();
            tracing::debug!(query, "Cache miss");
            return self.executor.read_and_cache(query);
        };

        if self.cache.is_stale(&entry, self.config.freshness_window()) {
            self.metrics.record_cache_stale_hit();
            self.metrics.record_refresh_enqueued();
            tracing::debug!(query, last_updated = entry.last_updated, "Stale hit; refresh queued");
            self.queue.enqueue(Operation::read(query));
        } else {
            self.metrics.record_cache_hit();
            tracing::trace!(query, "Cache hit");
        }

        Some(entry.result)
    }

    /// Run a non-query immediately on the calling thread.
    ///
    /// Bypasses the queue. Meant for startup and schema checks, not for
    /// hot paths.
    pub fn execute_write_now(&self, query: &str) {
        self.executor.write(query);
    }

    /// Run a reader query immediately on the calling thread.
    ///
    /// Bypasses both the queue and the cache. Meant for startup and
    /// schema checks, not for hot paths.
    pub fn execute_read_now(&self, query: &str) -> Option<Arc<ResultSet>> {
        self.executor.read(query)
    }

    /// Current cache entry for `query`, if any.
    pub fn cached(&self, query: &str) -> Option<CacheEntry> {
        self.cache.get(query)
    }

    /// Operations enqueued but not yet dispatched.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Block until the queue is empty and no execution is in flight.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.queue.pending() == 0 && self.workers.in_flight() == 0 {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    /// Stop the scheduler, then the workers.
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
        self.workers.shutdown();
        let dropped = self.queue.len();
        if dropped > 0 {
            tracing::warn!(dropped, "Dispatcher stopped with operations still queued");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Queue processor: run one dequeued operation.
fn process(executor: &Arc<Executor>, workers: &WorkerPool, offload: bool, operation: &Operation) {
    tracing::trace!(
        op_id = %operation.id(),
        kind = %operation.kind(),
        offload,
        "Processing operation"
    );

    if !offload {
        run(executor, operation);
        return;
    }

    let executor = Arc::clone(executor);
    let operation = operation.clone();
    workers.spawn(move || run(&executor, &operation));
}

fn run(executor: &Executor, operation: &Operation) {
    match operation.kind() {
        OperationKind::Write => executor.write(operation.query()),
        OperationKind::Read => {
            executor.read_and_cache(operation.query());
        }
    }
}
