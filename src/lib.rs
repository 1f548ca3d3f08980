//! qdispatch: queued, cached statement dispatch in front of a relational database.
//!
//! Callers submit writes and reads as opaque statement text. Writes are
//! fire-and-forget; reads are served from a per-text cache with a
//! stale-while-revalidate policy. A background scheduler drains a FIFO
//! work queue every tick and hands operations to execution threads, each
//! of which opens and closes its own connection.
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`dispatcher`]: Public submit/execute operations
//! - [`scheduler`]: Fixed-interval tick thread
//! - [`queue`]: FIFO work queue drained per tick
//! - [`cache`]: Reader result cache
//! - [`executor`]: Per-operation connection handling
//! - [`worker`]: Execution threads
//! - [`provider`]: Connection provider seam and the SQLite provider
//! - [`observability`]: Tracing setup and dispatch counters

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // cache::CacheEntry is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::struct_excessive_bools,     // Config structs may have flags
    clippy::cast_possible_truncation,   // millisecond casts are bounded
    clippy::cast_sign_loss              // ages are clamped at zero first
)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod observability;
pub mod operation;
pub mod provider;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use dispatcher::Dispatcher;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
///
/// Every structure guarded this way stays consistent across a panic:
/// the panics we contain happen in callbacks, never mid-mutation.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
