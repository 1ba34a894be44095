//! `TaskExecutions` table repository functions.
//!
//! Composite key `(ExecutionId, TaskId)` where `TaskId` is the step's name,
//! not the underlying task reference.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::contract::{ColumnSet, Store, Table, Where};
use crate::error::StoreError;
use crate::models::{from_row, to_row, TaskExecutionRecord, TaskStatus};

pub async fn insert(store: &dyn Store, record: &TaskExecutionRecord) -> Result<(), StoreError> {
    store.insert(Table::TaskExecutions, to_row(record)?).await
}

fn key(execution_id: Uuid, task_id: &str) -> Where {
    vec![
        ("execution_id".to_string(), json!(execution_id)),
        ("task_id".to_string(), json!(task_id)),
    ]
}

pub async fn get(store: &dyn Store, execution_id: Uuid, task_id: &str) -> Result<Option<TaskExecutionRecord>, StoreError> {
    let rows = store.query(Table::TaskExecutions, &key(execution_id, task_id), None).await?;
    rows.into_iter().next().map(from_row).transpose()
}

pub async fn exists(store: &dyn Store, execution_id: Uuid, task_id: &str) -> Result<bool, StoreError> {
    store.exists(Table::TaskExecutions, &key(execution_id, task_id)).await
}

/// Every `TaskExecutions` row sharing `execution_id` — the join the Query
/// Service (C7) reconstructs a tree from.
pub async fn list_by_execution_id(store: &dyn Store, execution_id: Uuid) -> Result<Vec<TaskExecutionRecord>, StoreError> {
    let where_ = vec![("execution_id".to_string(), json!(execution_id))];
    let rows = store.query(Table::TaskExecutions, &where_, None).await?;
    rows.into_iter().map(from_row).collect()
}

#[derive(Default)]
pub struct TaskExecutionUpdate {
    pub status: Option<TaskStatus>,
    pub state: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub runtime_ms: Option<i64>,
    pub input_data: Option<Value>,
    pub output_data: Option<Value>,
    pub execution_log: Option<String>,
    pub error_log: Option<String>,
    pub exit_code: Option<i32>,
    pub attempt: Option<u32>,
    pub max_retries: Option<u32>,
}

pub async fn update(
    store: &dyn Store,
    execution_id: Uuid,
    task_id: &str,
    patch: TaskExecutionUpdate,
) -> Result<(), StoreError> {
    let mut set = ColumnSet::new();
    macro_rules! put {
        ($field:ident) => {
            if let Some(v) = patch.$field {
                set.insert(stringify!($field).to_string(), json!(v));
            }
        };
    }
    put!(status);
    put!(state);
    put!(started_at);
    put!(ended_at);
    put!(runtime_ms);
    put!(input_data);
    put!(output_data);
    put!(execution_log);
    put!(error_log);
    put!(exit_code);
    put!(attempt);
    put!(max_retries);

    store.update(Table::TaskExecutions, &key(execution_id, task_id), &set).await
}

/// Best-effort `State` update from a `STATE:` line in task stdout. Errors
/// are swallowed — the live-progress channel must never abort the task it
/// is tracking.
pub async fn try_update_state(store: &dyn Store, execution_id: Uuid, task_id: &str, state: &str) {
    let mut set = ColumnSet::new();
    set.insert("state".to_string(), json!(state));
    if let Err(err) = store.update(Table::TaskExecutions, &key(execution_id, task_id), &set).await {
        tracing::warn!("state update for task '{task_id}' ({execution_id}) swallowed: {err}");
    }
}
