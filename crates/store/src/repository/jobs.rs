//! `Jobs` table repository functions — one function per operation, no
//! business logic, generalized over the `Store` contract instead of a
//! concrete `PgPool`.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::contract::{ColumnSet, Store, Table, Where};
use crate::error::StoreError;
use crate::models::{from_row, to_row, JobRecord, Status};

pub async fn insert(store: &dyn Store, record: &JobRecord) -> Result<(), StoreError> {
    store.insert(Table::Jobs, to_row(record)?).await
}

fn key(job_id: Uuid, name: &str) -> Where {
    vec![("job_id".to_string(), json!(job_id)), ("name".to_string(), json!(name))]
}

pub async fn get(store: &dyn Store, job_id: Uuid, name: &str) -> Result<Option<JobRecord>, StoreError> {
    let rows = store.query(Table::Jobs, &key(job_id, name), None).await?;
    rows.into_iter().next().map(from_row).transpose()
}

pub async fn list_by_execution_id(store: &dyn Store, job_id: Uuid) -> Result<Vec<JobRecord>, StoreError> {
    let where_ = vec![("job_id".to_string(), json!(job_id))];
    let rows = store.query(Table::Jobs, &where_, None).await?;
    rows.into_iter().map(from_row).collect()
}

pub async fn update_status(
    store: &dyn Store,
    job_id: Uuid,
    name: &str,
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
    store.update(Table::Jobs, &key(job_id, name), &set).await
}
