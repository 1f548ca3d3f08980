//! Connection provider seam.
//!
//! The dispatcher never speaks a wire protocol itself. It asks a
//! [`ConnectionProvider`] for a fresh [`Connection`] per execution, runs a
//! single statement on it and closes it again.
//!
//! Provides:
//! - Provider and connection traits
//! - Connection parameters built from configuration
//! - A driver-neutral result set
//! - A SQLite-backed provider

pub mod sqlite;

pub use sqlite::SqliteProvider;

use serde::Serialize;
use std::fmt;

use crate::error::DbError;

/// Default MySQL-compatible port, used when the configured port is 0.
pub const DEFAULT_PORT: u16 = 3306;

/// Everything a provider needs to open a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub schema: String,
}

impl ConnectionParams {
    /// Build parameters, resolving a zero port to [`DEFAULT_PORT`].
    pub fn new(
        address: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            port: if port == 0 { DEFAULT_PORT } else { port },
            username: username.into(),
            password: password.into(),
            schema: schema.into(),
        }
    }

    /// `tcp://address:port`, for drivers that take a URL.
    pub fn url(&self) -> String {
        format!("tcp://{}:{}", self.address, self.port)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Opens connections. Shared across threads.
pub trait ConnectionProvider: Send + Sync {
    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>, DbError>;
}

/// A live, unshared database connection.
pub trait Connection: Send {
    /// Run a statement and discard any result.
    fn execute(&mut self, sql: &str) -> Result<(), DbError>;

    /// Run a statement and collect its rows.
    fn execute_query(&mut self, sql: &str) -> Result<ResultSet, DbError>;

    fn close(self: Box<Self>) -> Result<(), DbError>;
}

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Rows returned by a reader query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `row`, looked up by column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }
}
