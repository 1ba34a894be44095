//! `Workflows` table repository functions.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::contract::{ColumnSet, Store, Table, Where};
use crate::error::StoreError;
use crate::models::{from_row, to_row, Status, WorkflowRecord};

pub async fn insert(store: &dyn Store, record: &WorkflowRecord) -> Result<(), StoreError> {
    store.insert(Table::Workflows, to_row(record)?).await
}

fn key(workflow_id: Uuid) -> Where {
    vec![("workflow_id".to_string(), json!(workflow_id))]
}

pub async fn get(store: &dyn Store, workflow_id: Uuid) -> Result<Option<WorkflowRecord>, StoreError> {
    let rows = store.query(Table::Workflows, &key(workflow_id), None).await?;
    rows.into_iter().next().map(from_row).transpose()
}

pub async fn update_status(
    store: &dyn Store,
    workflow_id: Uuid,
    status: Status,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    runtime_ms: Option<i64>,
) -> Result<(), StoreError> {
    let mut set = ColumnSet::new();
    set.insert("status".to_string(), json!(status));
    if let Some(t) = started_at {
        set.insert("started_at".to_string(), json!(t));
    }
    if let Some(t) = ended_at {
        set.insert("ended_at".to_string(), json!(t));
    }
    if let Some(ms) = runtime_ms {
        set.insert("runtime_ms".to_string(), json!(ms));
    }
    store.update(Table::Workflows, &key(workflow_id), &set).await
}
