//! Fixed-interval background scheduler.
//!
//! A single dedicated thread invokes every subscribed callback once per
//! tick, in registration order, then sleeps for the tick interval. A slow
//! callback delays the next tick; it never causes ticks to overlap.
//!
//! The sleep is a `recv_timeout` on a stop channel so that shutdown wakes
//! the thread immediately instead of waiting out the interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::DispatchError;
use crate::lock;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Handle to the scheduler thread.
///
/// Dropping the handle stops the thread, waiting for any in-flight tick
/// to finish.
pub struct Scheduler {
    callbacks: Arc<Mutex<Vec<Callback>>>,
    ticks: Arc<AtomicU64>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the tick thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to create the thread.
    pub fn spawn(interval: Duration) -> Result<Self, DispatchError> {
        let callbacks: Arc<Mutex<Vec<Callback>>> = Arc::new(Mutex::new(Vec::new()));
        let ticks = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_callbacks = Arc::clone(&callbacks);
        let thread_ticks = Arc::clone(&ticks);

        let handle = thread::Builder::new()
            .name("qdispatch-scheduler".into())
            .spawn(move || {
                tracing::info!(interval_ms = interval.as_millis() as u64, "Scheduler started");
                loop {
                    // Snapshot so callbacks may subscribe without deadlocking.
                    let snapshot: Vec<Callback> = lock(&thread_callbacks).clone();
                    for callback in &snapshot {
                        callback();
                    }
                    thread_ticks.fetch_add(1, Ordering::Relaxed);

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::info!("Scheduler stopped");
            })
            .map_err(|source| DispatchError::Spawn {
                name: "scheduler".into(),
                source,
            })?;

        Ok(Self {
            callbacks,
            ticks,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Register a callback to run on every tick.
    ///
    /// Registration is permanent; there is no unsubscribe.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.callbacks).push(Arc::new(callback));
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stop the tick thread and wait for it to exit.
    ///
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
