//! Execution workers.
//!
//! With a size of 0 every job gets its own short-lived thread, so a slow
//! statement never holds up unrelated ones. A non-zero size starts that
//! many long-lived threads fed from a shared task channel; completion
//! order is still independent of submission order when size > 1.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::DispatchError;
use crate::lock;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle to the workers.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    size: usize,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
    closed: AtomicBool,
}

/// Decrements the in-flight count when the job ends, even by panic.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    /// Start a pool.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn new(size: usize) -> Result<Self, DispatchError> {
        let in_flight = Arc::new(AtomicUsize::new(0));

        let (sender, workers) = if size == 0 {
            (None, Vec::new())
        } else {
            let (tx, rx) = mpsc::channel::<Job>();
            let rx = Arc::new(Mutex::new(rx));
            let mut workers = Vec::with_capacity(size);
            for i in 0..size {
                let rx = Arc::clone(&rx);
                let handle = thread::Builder::new()
                    .name(format!("qdispatch-worker-{i}"))
                    .spawn(move || worker_loop(&rx))
                    .map_err(|source| DispatchError::Spawn {
                        name: format!("worker-{i}"),
                        source,
                    })?;
                workers.push(handle);
            }
            (Some(tx), workers)
        };

        tracing::info!(size, "Worker pool started");

        Ok(Self {
            inner: Arc::new(PoolInner {
                size,
                sender: Mutex::new(sender),
                workers: Mutex::new(workers),
                in_flight,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Run `job` off the calling thread.
    ///
    /// Jobs submitted after [`shutdown`](Self::shutdown) are dropped.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.closed.load(Ordering::SeqCst) {
            tracing::warn!("Worker pool shut down; job dropped");
            return;
        }

        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.inner.in_flight));
        let job: Job = Box::new(move || {
            let _guard = guard;
            job();
        });

        if self.inner.size == 0 {
            let spawned = thread::Builder::new()
                .name("qdispatch-exec".into())
                .spawn(job);
            if let Err(e) = spawned {
                // The closure, and its guard, were dropped with the error.
                tracing::warn!(error = %e, "Failed to spawn execution thread; job dropped");
            }
            return;
        }

        let sender = lock(&self.inner.sender);
        match sender.as_ref() {
            Some(tx) => {
                if tx.send(job).is_err() {
                    tracing::warn!("Worker pool closed; job dropped");
                }
            }
            None => tracing::warn!("Worker pool shut down; job dropped"),
        }
    }

    /// Jobs submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Close the task channel and join pool threads.
    ///
    /// Queued jobs still run before the workers exit. Per-job threads
    /// (size 0) are detached and are not waited for.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        drop(lock(&self.inner.sender).take());
        let workers: Vec<JoinHandle<()>> = lock(&self.inner.workers).drain(..).collect();
        if workers.is_empty() {
            return;
        }
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

fn worker_loop(rx: &Mutex<Receiver<Job>>) {
    loop {
        let job = match lock(rx).recv() {
            Ok(job) => job,
            Err(_) => break,
        };
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
            tracing::error!("Execution job panicked");
        }
    }
}
