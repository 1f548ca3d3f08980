//! Queued units of work.

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What an [`Operation`] does with its statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A non-query; its result is discarded.
    Write,
    /// A reader query; its result refreshes the cache.
    Read,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => f.write_str("write"),
            Self::Read => f.write_str("read"),
        }
    }
}

/// A submitted statement waiting in the work queue.
///
/// The statement text is opaque and never changes after submission.
/// Cloning is cheap; the text is shared.
#[derive(Debug, Clone)]
pub struct Operation {
    id: Uuid,
    query: Arc<str>,
    kind: OperationKind,
}

impl Operation {
    /// Create an operation with a fresh UUIDv7 id.
    pub fn new(query: impl Into<Arc<str>>, kind: OperationKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            query: query.into(),
            kind,
        }
    }

    pub fn write(query: impl Into<Arc<str>>) -> Self {
        Self::new(query, OperationKind::Write)
    }

    pub fn read(query: impl Into<Arc<str>>) -> Self {
        Self::new(query, OperationKind::Read)
    }

    /// Time-sortable id used to correlate log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_kind() {
        assert_eq!(Operation::write("DELETE FROM t").kind(), OperationKind::Write);
        assert_eq!(Operation::read("SELECT 1").kind(), OperationKind::Read);
    }

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let a = Operation::read("SELECT 1");
        let b = Operation::read("SELECT 1");
        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id(), "UUIDv7 ids should sort by creation");
    }

    #[test]
    fn test_clone_shares_text() {
        let op = Operation::write("INSERT INTO t VALUES (1)");
        let copy = op.clone();
        assert_eq!(copy.query(), "INSERT INTO t VALUES (1)");
        assert_eq!(copy.id(), op.id());
    }
}
