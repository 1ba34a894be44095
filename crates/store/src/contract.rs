//! The storage operation contract the engine depends on.
//!
//! `Store` is deliberately thin: `insert`/`update`/`query`/`exists` over a
//! fixed set of tables. Any backend that honors this contract is
//! acceptable — the engine's behavior must not change based on which one is
//! plugged in.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// The six tables the contract requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Jobs,
    Workflows,
    Tasks,
    TaskExecutions,
    Nodes,
    Integrations,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Jobs => "jobs",
            Table::Workflows => "workflows",
            Table::Tasks => "tasks",
            Table::TaskExecutions => "task_executions",
            Table::Nodes => "nodes",
            Table::Integrations => "integrations",
        }
    }
}

/// A persisted row, carried as an opaque JSON object.
pub type Row = serde_json::Map<String, Value>;

/// A conjunction of column equalities, e.g. `[("execution_id", id), ("task_id", name)]`.
pub type Where = Vec<(String, Value)>;

/// Column → new-value assignments for `update`.
pub type ColumnSet = serde_json::Map<String, Value>;

/// The storage contract.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a row. Uniqueness of the primary key is the caller's
    /// responsibility.
    async fn insert(&self, table: Table, row: Row) -> Result<(), StoreError>;

    /// Update every row matching `where_` by applying `set`.
    async fn update(&self, table: Table, where_: &Where, set: &ColumnSet) -> Result<(), StoreError>;

    /// Return every row matching `where_`. `projection`, if given, limits
    /// the returned columns; `None` returns the full row.
    async fn query(
        &self,
        table: Table,
        where_: &Where,
        projection: Option<&[String]>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Whether any row matches `where_`.
    async fn exists(&self, table: Table, where_: &Where) -> Result<bool, StoreError>;
}

/// Applies `where_` to `row` — a plain conjunction of equalities. Shared by
/// every in-memory-filtering backend (the file store; easy to unit test
/// independent of any particular backend).
pub fn row_matches(row: &Row, where_: &Where) -> bool {
    where_.iter().all(|(col, expected)| row.get(col) == Some(expected))
}

/// Applies a column projection to `row`, returning a new row with only the
/// requested keys (missing keys are simply absent, not null-padded).
pub fn project_row(row: &Row, projection: Option<&[String]>) -> Row {
    match projection {
        None => row.clone(),
        Some(cols) => {
            let mut out = Row::new();
            for col in cols {
                if let Some(v) = row.get(col) {
                    out.insert(col.clone(), v.clone());
                }
            }
            out
        }
    }
}
