//! Typed record shapes. These are the structs callers serialize into/out
//! of the generic `Row` the `Store` contract carries — persistence
//! models, no domain behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::contract::Row;
use crate::error::StoreError;

pub fn to_row<T: Serialize>(value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => unreachable!("record types always serialize to an object, got {other:?}"),
    }
}

pub fn from_row<T: serde::de::DeserializeOwned>(row: Row) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Coarse lifecycle status shared by Job and Workflow records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Lifecycle status for a TaskExecution record — distinct from `Status`
/// because tasks additionally start out `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Waiting,
    Running,
    Completed,
    Failed,
}

/// Composite key `(JobId=ExecutionId, Name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub name: String,
    pub trigger_type: String,
    pub cron: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub runtime_ms: Option<i64>,
    pub created_by: String,
    pub input_params: Value,
}

/// Key `WorkflowId=ExecutionId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: Uuid,
    pub job_name: String,
    pub name: String,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub runtime_ms: Option<i64>,
    pub trigger_type: String,
}

/// Composite key `(ExecutionId, TaskId)` where `TaskId` is the step's name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub execution_id: Uuid,
    pub task_id: String,
    pub job_name: Option<String>,
    pub workflow_name: Option<String>,
    pub trigger_type: String,
    pub input_data: Value,
    pub output_data: Value,
    pub execution_log: String,
    pub error_log: String,
    pub status: TaskStatus,
    pub state: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub runtime_ms: Option<i64>,
    pub exit_code: Option<i32>,
    pub attempt: u32,
    pub max_retries: u32,
}

/// Used only by daemon mode; engine behavior does not depend on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: Uuid,
    pub name: String,
    pub os: String,
    pub capabilities: Vec<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: String,
}

/// One row per configured integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationRecord {
    pub name: String,
    pub config: Value,
}
