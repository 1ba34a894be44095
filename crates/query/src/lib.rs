//! `query` crate — the Query Service.
//!
//! Thin, side-effect-free reducers over [`store::Store::query`]: no
//! business logic, just filtering/sorting/reconstruction over rows the
//! drivers already wrote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use store::models::{from_row, JobRecord, Status, TaskExecutionRecord, TaskStatus, WorkflowRecord};
use store::{Store, StoreError, Table};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Which table a unified execution record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    Job,
    Workflow,
    Task,
}

/// One row from any of Jobs/Workflows/TaskExecutions, carried with enough
/// of a common shape to filter and sort generically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum ExecutionRecord {
    Job(JobRecord),
    Workflow(WorkflowRecord),
    Task(TaskExecutionRecord),
}

impl ExecutionRecord {
    pub fn execution_type(&self) -> ExecutionType {
        match self {
            ExecutionRecord::Job(_) => ExecutionType::Job,
            ExecutionRecord::Workflow(_) => ExecutionType::Workflow,
            ExecutionRecord::Task(_) => ExecutionType::Task,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ExecutionRecord::Job(j) => &j.name,
            ExecutionRecord::Workflow(w) => &w.name,
            ExecutionRecord::Task(t) => &t.task_id,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ExecutionRecord::Job(j) => status_label(j.status),
            ExecutionRecord::Workflow(w) => status_label(w.status),
            ExecutionRecord::Task(t) => task_status_label(t.status),
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ExecutionRecord::Job(j) => j.started_at,
            ExecutionRecord::Workflow(w) => w.started_at,
            ExecutionRecord::Task(t) => t.started_at,
        }
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ExecutionRecord::Job(j) => j.ended_at,
            ExecutionRecord::Workflow(w) => w.ended_at,
            ExecutionRecord::Task(t) => t.ended_at,
        }
    }

    pub fn runtime_ms(&self) -> Option<i64> {
        match self {
            ExecutionRecord::Job(j) => j.runtime_ms,
            ExecutionRecord::Workflow(w) => w.runtime_ms,
            ExecutionRecord::Task(t) => t.runtime_ms,
        }
    }
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Pending => "pending",
        Status::Running => "running",
        Status::Completed => "completed",
        Status::Failed => "failed",
    }
}

fn task_status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Waiting => "waiting",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

/// Which column `ListExecutions` sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    StartedAt,
    EndedAt,
    Status,
    RuntimeMs,
}

/// Filter + sort + limit parameters for `ListExecutions`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<String>,
    pub execution_type: Option<ExecutionType>,
    pub name: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub sort_by: Option<SortField>,
    pub descending: bool,
    pub top: Option<usize>,
}

/// `ListExecutions(filter) → rows`: union of Jobs,
/// Workflows, and TaskExecutions, filtered by status/type/name/time
/// window, sorted in memory, limited by `top`.
pub async fn list_executions(store: &dyn Store, filter: &ListFilter) -> Result<Vec<ExecutionRecord>, QueryError> {
    let mut records = Vec::new();

    if matches!(filter.execution_type, None | Some(ExecutionType::Job)) {
        for row in store.query(Table::Jobs, &vec![], None).await? {
            records.push(ExecutionRecord::Job(from_row(row)?));
        }
    }
    if matches!(filter.execution_type, None | Some(ExecutionType::Workflow)) {
        for row in store.query(Table::Workflows, &vec![], None).await? {
            records.push(ExecutionRecord::Workflow(from_row(row)?));
        }
    }
    if matches!(filter.execution_type, None | Some(ExecutionType::Task)) {
        for row in store.query(Table::TaskExecutions, &vec![], None).await? {
            records.push(ExecutionRecord::Task(from_row(row)?));
        }
    }

    records.retain(|record| {
        if let Some(status) = &filter.status {
            if record.status() != status.as_str() {
                return false;
            }
        }
        if let Some(name) = &filter.name {
            if record.name() != name.as_str() {
                return false;
            }
        }
        if let Some(since) = filter.since {
            if record.started_at().map_or(true, |t| t < since) {
                return false;
            }
        }
        if let Some(until) = filter.until {
            if record.started_at().map_or(true, |t| t > until) {
                return false;
            }
        }
        true
    });

    let sort_by = filter.sort_by.unwrap_or(SortField::StartedAt);
    records.sort_by(|a, b| {
        let ordering = match sort_by {
            SortField::StartedAt => sort_key(a.started_at()).cmp(&sort_key(b.started_at())),
            SortField::EndedAt => sort_key(a.ended_at()).cmp(&sort_key(b.ended_at())),
            SortField::Status => a.status().cmp(b.status()),
            SortField::RuntimeMs => a.runtime_ms().unwrap_or(0).cmp(&b.runtime_ms().unwrap_or(0)),
        };
        if filter.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });

    if let Some(top) = filter.top {
        records.truncate(top);
    }

    Ok(records)
}

/// `GetExecution(executionId) → tree`: the Jobs row with
/// that id, plus the Workflows row with that id, plus every
/// TaskExecutions row sharing that `ExecutionId`, returned in
/// chronological `StartedAt` order. When no Jobs row is found, falls back
/// to returning only the TaskExecutions rows for that id.
pub async fn get_execution(store: &dyn Store, execution_id: Uuid) -> Result<Vec<ExecutionRecord>, QueryError> {
    let jobs = store::repository::jobs::list_by_execution_id(store, execution_id).await?;
    let tasks = store::repository::task_executions::list_by_execution_id(store, execution_id).await?;

    if jobs.is_empty() {
        let mut records: Vec<ExecutionRecord> = tasks.into_iter().map(ExecutionRecord::Task).collect();
        records.sort_by_key(|r| sort_key(r.started_at()));
        return Ok(records);
    }

    let workflow = store::repository::workflows::get(store, execution_id).await?;

    let mut records: Vec<ExecutionRecord> = jobs.into_iter().map(ExecutionRecord::Job).collect();
    if let Some(workflow) = workflow {
        records.push(ExecutionRecord::Workflow(workflow));
    }
    records.extend(tasks.into_iter().map(ExecutionRecord::Task));

    records.sort_by_key(|r| sort_key(r.started_at()));
    Ok(records)
}

/// Orders `Some(t)` chronologically and places `None` (not yet started)
/// after every started record.
fn sort_key(ts: Option<DateTime<Utc>>) -> (bool, DateTime<Utc>) {
    match ts {
        Some(t) => (false, t),
        None => (true, DateTime::<Utc>::MIN_UTC),
    }
}
