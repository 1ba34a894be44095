//! The Job Driver.
//!
//! Drives a job/workflow/task three-level hierarchy with the executor
//! shape familiar from simpler single-graph engines: validate →
//! allocate/insert the root record → iterate phases → persist the
//! terminal status.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use manifest::Registry;
use serde_json::{Map, Value};
use store::models::{JobRecord, Status, TaskExecutionRecord, TaskStatus};
use store::repository::{jobs, task_executions};
use store::Store;
use tasks::{TaskRunArgs, TaskRunner};
use uuid::Uuid;

use crate::dag::blockers;
use crate::error::EngineError;
use crate::scheduler::WorkflowScheduler;
use crate::trigger::child_trigger;

/// `RunJob(name, inputParams, triggerType, executionId?, isChild, store)`.
pub struct RunJobArgs {
    pub name: String,
    pub input_params: Map<String, Value>,
    pub trigger_type: String,
    pub execution_id: Option<Uuid>,
    pub is_child: bool,
}

/// The driver's return value: the allocated/inherited correlation id plus
/// the accumulated context, so a parent job can fold a child job's output
/// into its own.
pub struct JobOutcome {
    pub execution_id: Uuid,
    pub context: Map<String, Value>,
}

pub struct JobDriver<'a> {
    pub registry: &'a Registry,
    pub store: &'a dyn Store,
    pub task_runner: &'a TaskRunner,
}

impl<'a> JobDriver<'a> {
    pub fn new(registry: &'a Registry, store: &'a dyn Store, task_runner: &'a TaskRunner) -> Self {
        Self { registry, store, task_runner }
    }

    /// Boxed for the same reason as [`crate::scheduler::WorkflowScheduler::run_workflow`]:
    /// child-job steps recurse into this same method.
    pub fn run_job<'f>(
        &'f self,
        args: RunJobArgs,
    ) -> Pin<Box<dyn Future<Output = Result<JobOutcome, EngineError>> + Send + 'f>>
    where
        'a: 'f,
    {
        Box::pin(async move {
            let execution_id = args.execution_id.unwrap_or_else(Uuid::new_v4);
            let def = self.registry.get_job_def(&args.name)?;
            let child_trigger = child_trigger(&args.trigger_type, &args.name);

            let created_at = Utc::now();
            jobs::insert(
                self.store,
                &JobRecord {
                    job_id: execution_id,
                    name: args.name.clone(),
                    trigger_type: args.trigger_type.clone(),
                    cron: def.cron.clone(),
                    status: Status::Running,
                    created_at,
                    started_at: Some(created_at),
                    ended_at: None,
                    runtime_ms: None,
                    created_by: current_host(),
                    input_params: Value::Object(args.input_params.clone()),
                },
            )
            .await?;

            for step in &def.tasks {
                if !task_executions::exists(self.store, execution_id, &step.name).await? {
                    task_executions::insert(
                        self.store,
                        &TaskExecutionRecord {
                            execution_id,
                            task_id: step.name.clone(),
                            job_name: Some(args.name.clone()),
                            workflow_name: None,
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

            let mut context = args.input_params;
            let mut completed: HashSet<String> = HashSet::new();
            let mut failure: Option<EngineError> = None;

            // Phase 1: inline tasks — unconditional, declaration order.
            for step in &def.tasks {
                let task = match self.registry.get_task(&step.reference) {
                    Ok(task) => task,
                    Err(err) => {
                        failure = Some(err.into());
                        break;
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
                            job_name: Some(args.name.clone()),
                            workflow_name: None,
                            trigger_type: child_trigger.clone(),
                            max_retries: step.retries,
                            retry_delay: Duration::from_secs(step.retry_delay),
                        },
                    )
                    .await;
                match result {
                    Ok(output) => {
                        context.insert(step.name.clone(), Value::Object(output));
                        completed.insert(step.name.clone());
                    }
                    Err(err) => {
                        failure = Some(err.into());
                        break;
                    }
                }
            }

            // Phase 2: workflows — dependsOn over already-completed steps;
            // unsatisfied dependency is fatal.
            if failure.is_none() {
                let scheduler = WorkflowScheduler::new(self.registry, self.store, self.task_runner);
                for step in &def.workflows {
                    let missing = blockers(step, &completed);
                    if !missing.is_empty() {
                        failure = Some(EngineError::StepDependencyUnsatisfied {
                            job: args.name.clone(),
                            step: step.name.clone(),
                            missing: missing.join(", "),
                        });
                        break;
                    }
                    let mut nested_input = context.clone();
                    for (k, v) in &step.params {
                        nested_input.insert(k.clone(), v.clone());
                    }
                    let result = scheduler
                        .run_workflow(&step.reference, nested_input, execution_id, Some(args.name.clone()), child_trigger.clone())
                        .await;
                    match result {
                        Ok(returned) => {
                            for (k, v) in returned {
                                context.insert(k, v);
                            }
                            completed.insert(step.name.clone());
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
            }

            // Phase 3: child jobs — same dependency rule; inherit
            // executionId and triggerType, is_child=true.
            if failure.is_none() {
                for step in &def.jobs {
                    let missing = blockers(step, &completed);
                    if !missing.is_empty() {
                        failure = Some(EngineError::StepDependencyUnsatisfied {
                            job: args.name.clone(),
                            step: step.name.clone(),
                            missing: missing.join(", "),
                        });
                        break;
                    }
                    let mut nested_input = context.clone();
                    for (k, v) in &step.params {
                        nested_input.insert(k.clone(), v.clone());
                    }
                    // Child jobs inherit the *parent's own* triggerType
                    // unchanged  — unlike
                    // tasks/workflows dispatched directly by this job,
                    // which see `childTrigger`.
                    let result = self
                        .run_job(RunJobArgs {
                            name: step.reference.clone(),
                            input_params: nested_input,
                            trigger_type: args.trigger_type.clone(),
                            execution_id: Some(execution_id),
                            is_child: true,
                        })
                        .await;
                    match result {
                        Ok(outcome) => {
                            for (k, v) in outcome.context {
                                context.insert(k, v);
                            }
                            completed.insert(step.name.clone());
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
            }

            let ended_at = Utc::now();
            let runtime_ms = (ended_at - created_at).num_milliseconds();
            let final_status = if failure.is_some() { Status::Failed } else { Status::Completed };
            jobs::update_status(self.store, execution_id, &args.name, final_status, None, Some(ended_at), Some(runtime_ms)).await?;

            match failure {
                Some(err) => Err(err),
                None => Ok(JobOutcome { execution_id, context }),
            }
        })
    }
}

/// `CreatedBy` — overwritten to the current host on every job invocation,
/// including child jobs.
fn current_host() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}
