//! The Task Runner.
//!
//! `TaskRunner::run_task` composes input, pre-registers or updates the
//! `TaskExecutions` row, drives the attempt/retry loop through a
//! [`ProcessAttempt`], ingests the output file, and writes the final row —
//! in that order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use manifest::TaskPointer;
use runtime::RuntimeRegistry;
use store::models::{TaskExecutionRecord, TaskStatus};
use store::repository::task_executions::{self, TaskExecutionUpdate};
use store::Store;

use crate::error::TaskError;
use crate::process::{ChildProcessAttempt, ProcessAttempt};

/// Everything [`TaskRunner::run_task`] needs beyond the task's own
/// definition.
pub struct TaskRunArgs<'a> {
    pub task: &'a TaskPointer,
    pub step_name: &'a str,
    pub input_params: Map<String, Value>,
    pub input_context: Map<String, Value>,
    pub execution_id: Uuid,
    pub job_name: Option<String>,
    pub workflow_name: Option<String>,
    pub trigger_type: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Drives task execution. One runner is shared across every step in an
/// execution tree; it is stateless apart from where scripts and temp I/O
/// files live.
pub struct TaskRunner {
    registry: RuntimeRegistry,
    base_dir: PathBuf,
    temp_dir: PathBuf,
    attempt: Arc<dyn ProcessAttempt>,
}

impl TaskRunner {
    pub fn new(registry: RuntimeRegistry, base_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            base_dir: base_dir.into(),
            temp_dir: temp_dir.into(),
            attempt: Arc::new(ChildProcessAttempt),
        }
    }

    /// Override the attempt mechanism — production code never needs this;
    /// tests inject [`crate::testsupport::ScriptedAttempt`] here.
    pub fn with_attempt(mut self, attempt: Arc<dyn ProcessAttempt>) -> Self {
        self.attempt = attempt;
        self
    }

    pub async fn run_task(&self, store: &dyn Store, args: TaskRunArgs<'_>) -> Result<Map<String, Value>, TaskError> {
        let step = args.step_name;

        // --- Input composition  -------
        let mut merged = args.input_context;
        for (k, v) in args.input_params {
            merged.insert(k, v);
        }

        let input_file = self.temp_dir.join(format!("{}-{}-in.json", args.execution_id, step));
        let output_file = self.temp_dir.join(format!("{}-{}-out.json", args.execution_id, step));

        if let Some(parent) = input_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_err(step, source))?;
        }
        let input_text = serde_json::to_string(&merged).map_err(|source| serde_err(step, source))?;
        tokio::fs::write(&input_file, &input_text)
            .await
            .map_err(|source| io_err(step, source))?;

        // --- Pre-dispatch persistence  ----------------------
        let started_at = Utc::now();
        if task_executions::exists(store, args.execution_id, step)
            .await
            .map_err(|source| store_err(step, source))?
        {
            task_executions::update(
                store,
                args.execution_id,
                step,
                TaskExecutionUpdate {
                    status: Some(TaskStatus::Running),
                    state: Some("Running".to_string()),
                    started_at: Some(started_at),
                    input_data: Some(Value::Object(merged.clone())),
                    attempt: Some(1),
                    max_retries: Some(args.max_retries),
                    ..Default::default()
                },
            )
            .await
            .map_err(|source| store_err(step, source))?;
        } else {
            let record = TaskExecutionRecord {
                execution_id: args.execution_id,
                task_id: step.to_string(),
                job_name: args.job_name.clone(),
                workflow_name: args.workflow_name.clone(),
                trigger_type: args.trigger_type.clone(),
                input_data: Value::Object(merged.clone()),
                output_data: Value::Null,
                execution_log: String::new(),
                error_log: String::new(),
                status: TaskStatus::Running,
                state: "Running".to_string(),
                started_at: Some(started_at),
                ended_at: None,
                runtime_ms: None,
                exit_code: None,
                attempt: 1,
                max_retries: args.max_retries,
            };
            task_executions::insert(store, &record)
                .await
                .map_err(|source| store_err(step, source))?;
        }

        // --- Dispatch loop  --------------------------------
        let runtime_path = self.registry.resolve(&args.task.runtime, &args.task.runtime_env);
        let script_path = self.base_dir.join(&args.task.file);
        let max_attempts = args.max_retries + 1;

        let mut last_stdout = String::new();
        let mut last_stderr = String::new();
        let mut last_code: Option<i32> = None;

        let mut attempt_no = 1u32;
        let outcome = 'dispatch: loop {
            let result = self
                .attempt
                .run(
                    store,
                    args.execution_id,
                    step,
                    &runtime_path,
                    &args.task.runtime,
                    &script_path,
                    &input_file,
                    &output_file,
                )
                .await;

            let (code, stdout, stderr) = match result {
                Ok(r) => (r.exit_code, r.stdout, r.stderr),
                // SpawnFailure is counted identically to a non-zero exit
                // for retries.
                Err(TaskError::SpawnFailure { source, .. }) => (-1, String::new(), source.to_string()),
                Err(other) => break 'dispatch Err(other),
            };
            last_stdout = stdout;
            last_stderr = stderr.clone();
            last_code = Some(code);

            if code == 0 {
                break 'dispatch Ok(());
            }

            if attempt_no >= max_attempts {
                break 'dispatch Err(TaskError::NonZeroExit {
                    step: step.to_string(),
                    code: Some(code),
                    attempts: attempt_no,
                });
            }

            let next_attempt = attempt_no + 1;
            task_executions::update(
                store,
                args.execution_id,
                step,
                TaskExecutionUpdate {
                    state: Some(format!("Retrying ({next_attempt}/{max_attempts})")),
                    attempt: Some(next_attempt),
                    error_log: Some(stderr),
                    ..Default::default()
                },
            )
            .await
            .map_err(|source| store_err(step, source))?;

            tokio::time::sleep(args.retry_delay).await;
            attempt_no = next_attempt;
        };

        // --- Output ingestion  -----------------------------
        let output_map = match tokio::fs::read_to_string(&output_file).await {
            Ok(text) if !text.trim().is_empty() => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            _ => Map::new(),
        };

        let ended_at = Utc::now();
        let runtime_ms = (ended_at - started_at).num_milliseconds();

        // --- Hygiene: unlink input/output temp files either way ----------
        let _ = tokio::fs::remove_file(&input_file).await;
        let _ = tokio::fs::remove_file(&output_file).await;

        match outcome {
            Ok(()) => {
                let state = output_map
                    .get("state")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| "Completed".to_string());
                task_executions::update(
                    store,
                    args.execution_id,
                    step,
                    TaskExecutionUpdate {
                        status: Some(TaskStatus::Completed),
                        state: Some(state),
                        exit_code: Some(0),
                        ended_at: Some(ended_at),
                        runtime_ms: Some(runtime_ms),
                        execution_log: Some(last_stdout),
                        output_data: Some(Value::Object(output_map.clone())),
                        ..Default::default()
                    },
                )
                .await
                .map_err(|source| store_err(step, source))?;

                Ok(output_map)
            }
            Err(err) => {
                task_executions::update(
                    store,
                    args.execution_id,
                    step,
                    TaskExecutionUpdate {
                        status: Some(TaskStatus::Failed),
                        error_log: Some(if last_stderr.is_empty() { err.to_string() } else { last_stderr }),
                        ended_at: Some(ended_at),
                        runtime_ms: Some(runtime_ms),
                        exit_code: last_code,
                        ..Default::default()
                    },
                )
                .await
                .map_err(|source| store_err(step, source))?;

                Err(err)
            }
        }
    }
}

fn io_err(step: &str, source: std::io::Error) -> TaskError {
    TaskError::Io {
        step: step.to_string(),
        source,
    }
}

fn serde_err(step: &str, source: serde_json::Error) -> TaskError {
    TaskError::Serde {
        step: step.to_string(),
        source,
    }
}

fn store_err(step: &str, source: store::StoreError) -> TaskError {
    TaskError::Store {
        step: step.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{ScriptedAttempt, ScriptedOutcome};
    use serde_json::json;
    use std::collections::HashMap;
    use store::FileStore;

    fn registry() -> RuntimeRegistry {
        let mut envs = HashMap::new();
        envs.insert("default".to_string(), "bash".to_string());
        let mut map = HashMap::new();
        map.insert("bash".to_string(), envs);
        RuntimeRegistry::from_map(map)
    }

    fn runner(dir: &std::path::Path, attempt: Arc<dyn ProcessAttempt>) -> TaskRunner {
        TaskRunner::new(registry(), dir, dir).with_attempt(attempt)
    }

    fn task_ptr() -> TaskPointer {
        TaskPointer {
            file: "extract.sh".to_string(),
            runtime: "bash".to_string(),
            runtime_env: "default".to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_and_persists_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));
        let attempt = Arc::new(ScriptedAttempt::new(vec![ScriptedOutcome::Succeed {
            output: json!({"rows": 3}),
            state_lines: vec![],
        }]));

        let task = task_ptr();
        let runner = runner(dir.path(), attempt.clone());
        let out = runner
            .run_task(
                &store,
                TaskRunArgs {
                    task: &task,
                    step_name: "extract",
                    input_params: Map::new(),
                    input_context: Map::new(),
                    execution_id: Uuid::new_v4(),
                    job_name: Some("demo".to_string()),
                    workflow_name: None,
                    trigger_type: "Manual".to_string(),
                    max_retries: 0,
                    retry_delay: Duration::from_millis(0),
                },
            )
            .await
            .expect("should succeed");

        assert_eq!(out.get("rows"), Some(&json!(3)));
        assert_eq!(attempt.call_count(), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds_updates_attempt_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));
        let attempt = Arc::new(ScriptedAttempt::new(vec![
            ScriptedOutcome::Fail { code: 1 },
            ScriptedOutcome::Fail { code: 1 },
            ScriptedOutcome::Succeed { output: json!({}), state_lines: vec![] },
        ]));

        let task = task_ptr();
        let execution_id = Uuid::new_v4();
        let runner = runner(dir.path(), attempt.clone());
        let result = runner
            .run_task(
                &store,
                TaskRunArgs {
                    task: &task,
                    step_name: "flaky",
                    input_params: Map::new(),
                    input_context: Map::new(),
                    execution_id,
                    job_name: None,
                    workflow_name: None,
                    trigger_type: "Manual".to_string(),
                    max_retries: 4,
                    retry_delay: Duration::from_millis(0),
                },
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(attempt.call_count(), 3);

        let record = store::repository::task_executions::get(&store, execution_id, "flaky")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.attempt, 3);
        assert!(matches!(record.status, TaskStatus::Completed));
    }

    #[tokio::test]
    async fn exhausts_retries_and_marks_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));
        let attempt = Arc::new(ScriptedAttempt::new(vec![
            ScriptedOutcome::Fail { code: 1 },
            ScriptedOutcome::Fail { code: 1 },
        ]));

        let task = task_ptr();
        let execution_id = Uuid::new_v4();
        let runner = runner(dir.path(), attempt.clone());
        let result = runner
            .run_task(
                &store,
                TaskRunArgs {
                    task: &task,
                    step_name: "always_fails",
                    input_params: Map::new(),
                    input_context: Map::new(),
                    execution_id,
                    job_name: None,
                    workflow_name: None,
                    trigger_type: "Manual".to_string(),
                    max_retries: 1,
                    retry_delay: Duration::from_millis(0),
                },
            )
            .await;

        assert!(result.is_err());
        let record = store::repository::task_executions::get(&store, execution_id, "always_fails")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.attempt, 2);
        assert!(matches!(record.status, TaskStatus::Failed));
    }

    /// Round-trip property (spec §8): for a task whose script echoes its
    /// input JSON as its return value, `OutputData` equals `Input ∪
    /// Context` modulo key order.
    #[tokio::test]
    async fn echoing_task_output_equals_merged_input_and_context() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));

        let mut context = Map::new();
        context.insert("dataset".to_string(), json!("orders"));
        let mut params = Map::new();
        params.insert("limit".to_string(), json!(100));

        let mut merged = context.clone();
        for (k, v) in &params {
            merged.insert(k.clone(), v.clone());
        }

        let attempt = Arc::new(ScriptedAttempt::new(vec![crate::testsupport::echoing_outcome(&merged)]));

        let task = task_ptr();
        let execution_id = Uuid::new_v4();
        let runner = runner(dir.path(), attempt);
        let out = runner
            .run_task(
                &store,
                TaskRunArgs {
                    task: &task,
                    step_name: "echo",
                    input_params: params,
                    input_context: context,
                    execution_id,
                    job_name: None,
                    workflow_name: None,
                    trigger_type: "Manual".to_string(),
                    max_retries: 0,
                    retry_delay: Duration::from_millis(0),
                },
            )
            .await
            .expect("should succeed");

        assert_eq!(out, merged);
        let record = store::repository::task_executions::get(&store, execution_id, "echo")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.output_data, Value::Object(merged));
    }

    #[tokio::test]
    async fn input_params_override_context_on_key_collision() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));
        let attempt = Arc::new(ScriptedAttempt::new(vec![ScriptedOutcome::Succeed {
            output: json!({"echoed": true}),
            state_lines: vec![],
        }]));

        let mut context = Map::new();
        context.insert("k".to_string(), json!("from_context"));
        let mut params = Map::new();
        params.insert("k".to_string(), json!("from_params"));

        let task = task_ptr();
        let execution_id = Uuid::new_v4();
        let runner = runner(dir.path(), attempt);
        runner
            .run_task(
                &store,
                TaskRunArgs {
                    task: &task,
                    step_name: "merge",
                    input_params: params,
                    input_context: context,
                    execution_id,
                    job_name: None,
                    workflow_name: None,
                    trigger_type: "Manual".to_string(),
                    max_retries: 0,
                    retry_delay: Duration::from_millis(0),
                },
            )
            .await
            .unwrap();

        let record = store::repository::task_executions::get(&store, execution_id, "merge")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.input_data["k"], json!("from_params"));
    }
}
