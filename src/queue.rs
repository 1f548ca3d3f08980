//! FIFO work queue drained by the scheduler.
//!
//! Each drain removes operations from the head one at a time and hands
//! each one to every subscribed processor before removing the next. The
//! item lock is released before processors run, so a processor may
//! enqueue more work; such items are picked up by the same drain.
//!
//! A panicking processor is contained to the item it was processing.
//! Items are never retried.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::lock;
use crate::operation::Operation;
use crate::scheduler::Scheduler;

type Processor = Arc<dyn Fn(&Operation) + Send + Sync>;

/// Ordered buffer of pending operations.
#[derive(Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<Operation>>,
    processors: Mutex<Vec<Processor>>,
    /// Enqueued operations whose dispatch has not finished yet.
    pending: AtomicUsize,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation to the tail.
    pub fn enqueue(&self, operation: Operation) {
        tracing::trace!(
            op_id = %operation.id(),
            kind = %operation.kind(),
            query = operation.query(),
            "Operation enqueued"
        );
        self.pending.fetch_add(1, Ordering::SeqCst);
        lock(&self.items).push_back(operation);
    }

    /// Register a processor invoked once per drained operation.
    pub fn subscribe<F>(&self, processor: F)
    where
        F: Fn(&Operation) + Send + Sync + 'static,
    {
        lock(&self.processors).push(Arc::new(processor));
    }

    /// Drain the queue on every tick of `scheduler`.
    pub fn attach(self: &Arc<Self>, scheduler: &Scheduler) {
        let queue = Arc::clone(self);
        scheduler.subscribe(move || {
            queue.drain();
        });
    }

    /// Dispatch every queued operation in FIFO order.
    ///
    /// Returns the number of operations dispatched. An empty queue is a
    /// no-op.
    pub fn drain(&self) -> usize {
        let mut dispatched = 0;
        loop {
            // Lock scope ends before the processors run.
            let Some(operation) = lock(&self.items).pop_front() else {
                break;
            };
            self.dispatch(&operation);
            self.pending.fetch_sub(1, Ordering::SeqCst);
            dispatched += 1;
        }
        if dispatched > 0 {
            tracing::trace!(dispatched, "Work queue drained");
        }
        dispatched
    }

    fn dispatch(&self, operation: &Operation) {
        let processors: Vec<Processor> = lock(&self.processors).clone();
        for processor in &processors {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor(operation)));
            if outcome.is_err() {
                tracing::error!(
                    op_id = %operation.id(),
                    query = operation.query(),
                    "Processor panicked; operation dropped"
                );
            }
        }
    }

    /// Number of operations currently waiting in the queue.
    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued operations plus the one being dispatched, if any.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}
