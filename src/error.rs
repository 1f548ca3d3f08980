//! Error types for query dispatch.
//!
//! Driver failures ([`DbError`]) are caught at the execution boundary and
//! logged; they never reach callers of the submit operations. Only
//! constructing a [`Dispatcher`](crate::dispatcher::Dispatcher) can fail,
//! with [`DispatchError`].

use thiserror::Error;

/// Failure reported by a connection provider or connection.
#[derive(Debug, Error)]
pub enum DbError {
    /// Opening, authenticating or reaching the database failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The statement was rejected or failed on the server.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Closing the connection failed.
    #[error("Close error: {0}")]
    Close(String),
}

/// Error type for dispatcher construction.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
