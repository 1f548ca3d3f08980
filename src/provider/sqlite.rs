//! SQLite-backed connection provider.
//!
//! Each schema maps to `<data_dir>/<schema>.db`. Every `open` creates a
//! new rusqlite connection; nothing is pooled. SQLite WAL mode lets the
//! per-operation connections read while another one writes.
//!
//! Address, port and credentials have no meaning for a local file and are
//! only logged.

use rusqlite::types::ValueRef;
use rusqlite::OpenFlags;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Connection, ConnectionParams, ConnectionProvider, ResultSet, Value};
use crate::error::DbError;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens one SQLite file per schema under a data directory.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    data_dir: PathBuf,
}

impl SqliteProvider {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Database file backing `schema`.
    pub fn db_path(&self, schema: &str) -> PathBuf {
        self.data_dir.join(format!("{schema}.db"))
    }
}

impl ConnectionProvider for SqliteProvider {
    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>, DbError> {
        if params.schema.is_empty() {
            return Err(DbError::Connection("schema name cannot be empty".into()));
        }

        let path = self.db_path(&params.schema);
        tracing::trace!(
            path = %path.display(),
            url = %params.url(),
            username = %params.username,
            "Opening SQLite connection"
        );

        let conn = rusqlite::Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DbError::Connection(format!("{}: {e}", path.display())))?;

        apply_pragmas(&conn).map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Box::new(SqliteConnection { conn }))
    }
}

/// Apply per-connection pragmas.
fn apply_pragmas(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| DbError::Execution(e.to_string()))
    }

    fn execute_query(&mut self, sql: &str) -> Result<ResultSet, DbError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DbError::Execution(e.to_string()))?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(to_value))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(|e| DbError::Execution(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DbError::Execution(e.to_string()))?;

        Ok(ResultSet::new(columns, rows))
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        self.conn
            .close()
            .map_err(|(_, e)| DbError::Close(e.to_string()))
    }
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}
