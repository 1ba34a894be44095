//! The Workflow Scheduler.
//!
//! Generalizes a simple `validate → persist entry row → iterate nodes →
//! persist exit row` executor shape from a fixed node/edge graph executed
//! once in topological order into an iterative runnable-set scheduler over
//! named steps, since a step here can be blocked by something other than
//! a pure graph cycle — a dependency that failed and will never join
//! `completed` — which is why the loop re-computes the runnable set every
//! pass instead of sorting once up front.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use manifest::{Registry, Step};
use serde_json::{Map, Value};
use store::models::{Status, TaskExecutionRecord, TaskStatus, WorkflowRecord};
use store::repository::{task_executions, workflows};
use store::Store;
use tasks::{TaskRunArgs, TaskRunner};
use uuid::Uuid;

use crate::dag::{blockers, runnable_steps};
use crate::error::EngineError;
use crate::trigger::child_trigger;

/// The iteration bound past which "no runnable steps remain" is declared a
/// deadlock rather than merely slow.
const MAX_ITERATIONS: u32 = 100;

/// Everything [`WorkflowScheduler::run_workflow`] needs beyond the
/// workflow's own name.
pub struct WorkflowScheduler<'a> {
    pub registry: &'a Registry,
    pub store: &'a dyn Store,
    pub task_runner: &'a TaskRunner,
}

impl<'a> WorkflowScheduler<'a> {
    pub fn new(registry: &'a Registry, store: &'a dyn Store, task_runner: &'a TaskRunner) -> Self {
        Self { registry, store, task_runner }
    }

    /// Run `name` to completion, returning the accumulated context.
    /// Boxed because workflow-kind steps recurse into this same method —
    /// plain `async fn` self-recursion doesn't compile (infinite-sized
    /// future), so the box is the seam, not an indirection added for its
    /// own sake.
    pub fn run_workflow<'f>(
        &'f self,
        name: &'f str,
        input_params: Map<String, Value>,
        execution_id: Uuid,
        job_name: Option<String>,
        trigger_type: String,
    ) -> Pin<Box<dyn Future<Output = Result<Map<String, Value>, EngineError>> + Send + 'f>>
    where
        'a: 'f,
    {
        Box::pin(async move {
            let def = self.registry.get_workflow_def(name)?;
            let child_trigger = child_trigger(&trigger_type, name);

            let started_at = Utc::now();
            workflows::insert(
                self.store,
                &WorkflowRecord {
                    workflow_id: execution_id,
                    job_name: job_name.clone().unwrap_or_default(),
                    name: name.to_string(),
                    status: Status::Running,
                    started_at: Some(started_at),
                    ended_at: None,
                    runtime_ms: None,
                    trigger_type: trigger_type.clone(),
                },
            )
            .await?;

            // Pre-registration: a Waiting row for every task-kind step
            // only — workflow-kind steps are not pre-registered.
            for step in &def.tasks {
                if !task_executions::exists(self.store, execution_id, &step.name).await? {
                    task_executions::insert(
                        self.store,
                        &TaskExecutionRecord {
                            execution_id,
                            task_id: step.name.clone(),
                            job_name: job_name.clone(),
                            workflow_name: Some(name.to_string()),
                            trigger_type: child_trigger.clone(),
                            input_data: Value::Null,
                            output_data: Value::Null,
                            execution_log: String::new(),
                            error_log: String::new(),
                            status: TaskStatus::Waiting,
                            state: "Waiting".to_string(),
                            started_at: None,
                            ended_at: None,
                            runtime_ms: None,
                            exit_code: None,
                            attempt: 0,
                            max_retries: step.retries,
                        },
                    )
                    .await?;
                }
            }

            let all_steps: Vec<&Step> = def.tasks.iter().chain(def.workflows.iter()).collect();
            let task_names: HashSet<&str> = def.tasks.iter().map(|s| s.name.as_str()).collect();

            let mut completed: HashSet<String> = HashSet::new();
            let mut context = input_params;
            let mut iterations = 0u32;
            let mut failure: Option<EngineError> = None;

            'outer: while completed.len() < all_steps.len() {
                iterations += 1;
                if iterations > MAX_ITERATIONS {
                    let remaining: Vec<&str> = all_steps
                        .iter()
                        .filter(|s| !completed.contains(&s.name))
                        .map(|s| s.name.as_str())
                        .collect();
                    failure = Some(EngineError::WorkflowStuck {
                        workflow: name.to_string(),
                        remaining: remaining.join(", "),
                    });
                    break;
                }

                let runnable = runnable_steps(&all_steps, &completed);

                // Update "Waiting for: ..." on blocked task-kind steps
                // still persisted as Waiting.
                let runnable_names: HashSet<&str> = runnable.iter().map(|s| s.name.as_str()).collect();
                for step in &all_steps {
                    if completed.contains(&step.name) || runnable_names.contains(step.name.as_str()) {
                        continue;
                    }
                    if !task_names.contains(step.name.as_str()) {
                        continue;
                    }
                    let missing = blockers(step, &completed);
                    if missing.is_empty() {
                        continue;
                    }
                    if let Some(record) = task_executions::get(self.store, execution_id, &step.name).await? {
                        if matches!(record.status, TaskStatus::Waiting) {
                            task_executions::try_update_state(
                                self.store,
                                execution_id,
                                &step.name,
                                &format!("Waiting for: {}", missing.join(", ")),
                            )
                            .await;
                        }
                    }
                }

                if runnable.is_empty() {
                    let remaining: Vec<&str> = all_steps
                        .iter()
                        .filter(|s| !completed.contains(&s.name))
                        .map(|s| s.name.as_str())
                        .collect();
                    failure = Some(EngineError::WorkflowStuck {
                        workflow: name.to_string(),
                        remaining: remaining.join(", "),
                    });
                    break;
                }

                for step in runnable {
                    if task_names.contains(step.name.as_str()) {
                        let task = match self.registry.get_task(&step.reference) {
                            Ok(task) => task,
                            Err(err) => {
                                failure = Some(err.into());
                                break 'outer;
                            }
                        };
                        let result = self
                            .task_runner
                            .run_task(
                                self.store,
                                TaskRunArgs {
                                    task,
                                    step_name: &step.name,
                                    input_params: step.params.clone(),
                                    input_context: context.clone(),
                                    execution_id,
                                    job_name: job_name.clone(),
                                    workflow_name: Some(name.to_string()),
                                    trigger_type: child_trigger.clone(),
                                    max_retries: step.retries,
                                    retry_delay: Duration::from_secs(step.retry_delay),
                                },
                            )
                            .await;
                        match result {
                            Ok(output) => {
                                context.insert(step.name.clone(), Value::Object(output));
                            }
                            Err(err) => {
                                failure = Some(err.into());
                                break 'outer;
                            }
                        }
                    } else {
                        let mut nested_input = context.clone();
                        for (k, v) in &step.params {
                            nested_input.insert(k.clone(), v.clone());
                        }
                        let result = self
                            .run_workflow(&step.reference, nested_input, execution_id, job_name.clone(), child_trigger.clone())
                            .await;
                        match result {
                            Ok(returned) => {
                                for (k, v) in returned {
                                    context.insert(k, v);
                                }
                            }
                            Err(err) => {
                                failure = Some(err);
                                break 'outer;
                            }
                        }
                    }
                    completed.insert(step.name.clone());
                }
            }

            let ended_at = Utc::now();
            let runtime_ms = (ended_at - started_at).num_milliseconds();
            let final_status = if failure.is_some() { Status::Failed } else { Status::Completed };
            workflows::update_status(self.store, execution_id, final_status, None, Some(ended_at), Some(runtime_ms)).await?;

            match failure {
                Some(err) => Err(err),
                None => Ok(context),
            }
        })
    }
}
