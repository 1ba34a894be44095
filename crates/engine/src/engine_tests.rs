//! Concrete end-to-end scenarios for the hierarchical executor, split out
//! from the module-local unit tests the same way an integration test file
//! sits alongside inline `#[cfg(test)]` modules: these exercise the
//! Workflow Scheduler and Job Driver together against a `FileStore`, with
//! a scripted process attempt standing in for a real child process.

use std::collections::HashMap;
use std::sync::Arc;

use manifest::Registry;
use serde_json::{json, Map};
use store::file::FileStore;
use store::models::{Status, TaskStatus};
use store::repository::{jobs, task_executions, workflows};
use tasks::testsupport::{ScriptedAttempt, ScriptedOutcome};
use tasks::TaskRunner;
use tempfile::TempDir;
use uuid::Uuid;

use crate::error::EngineError;
use crate::job::{JobDriver, RunJobArgs};
use crate::scheduler::WorkflowScheduler;

fn write(dir: &TempDir, relative: &str, contents: &str) {
    let path = dir.path().join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn task_runner(dir: &TempDir, attempt: Arc<ScriptedAttempt>) -> TaskRunner {
    let mut envs = HashMap::new();
    envs.insert("default".to_string(), "bash".to_string());
    let mut map = HashMap::new();
    map.insert("bash".to_string(), envs);
    TaskRunner::new(runtime::RuntimeRegistry::from_map(map), dir.path(), dir.path()).with_attempt(attempt)
}

fn succeed(output: serde_json::Value) -> ScriptedOutcome {
    ScriptedOutcome::Succeed { output, state_lines: vec![] }
}

// ---------------------------------------------------------------------
// Scenario 1: linear workflow Extract -> Transform -> Load
// ---------------------------------------------------------------------

#[tokio::test]
async fn linear_workflow_runs_in_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir,
        "manifest.json",
        r#"{
            "tasks": {
                "extract_task": {"file": "extract.sh", "runtime": "bash"},
                "transform_task": {"file": "transform.sh", "runtime": "bash"},
                "load_task": {"file": "load.sh", "runtime": "bash"}
            },
            "workflows": {"etl": {"file": "etl.json"}}
        }"#,
    );
    write(
        &dir,
        "etl.json",
        r#"{
            "name": "etl",
            "tasks": [
                {"name": "Extract", "reference": "extract_task"},
                {"name": "Transform", "reference": "transform_task", "depends_on": ["Extract"]},
                {"name": "Load", "reference": "load_task", "depends_on": ["Transform"]}
            ]
        }"#,
    );

    let registry = Registry::load(dir.path().join("manifest.json")).unwrap();
    let attempt = Arc::new(ScriptedAttempt::new(vec![
        succeed(json!({"rows": 1})),
        succeed(json!({"rows": 2})),
        succeed(json!({"rows": 3})),
    ]));
    let runner = task_runner(&dir, attempt.clone());
    let store = FileStore::new(dir.path().join("store.json"));
    let scheduler = WorkflowScheduler::new(&registry, &store, &runner);

    let execution_id = Uuid::new_v4();
    let context = scheduler
        .run_workflow("etl", Map::new(), execution_id, None, "Manual".to_string())
        .await
        .expect("linear workflow should succeed");

    assert_eq!(attempt.call_count(), 3);
    assert!(context.contains_key("Extract"));
    assert!(context.contains_key("Transform"));
    assert!(context.contains_key("Load"));

    let workflow = workflows::get(&store, execution_id).await.unwrap().unwrap();
    assert!(matches!(workflow.status, Status::Completed));

    for step in ["Extract", "Transform", "Load"] {
        let row = task_executions::get(&store, execution_id, step).await.unwrap().unwrap();
        assert!(matches!(row.status, TaskStatus::Completed));
    }
}

// ---------------------------------------------------------------------
// Scenario 2: diamond A; B dependsOn A; C dependsOn A; D dependsOn B,C
// ---------------------------------------------------------------------

#[tokio::test]
async fn diamond_workflow_merges_both_branches_into_the_final_step() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir,
        "manifest.json",
        r#"{
            "tasks": {
                "ta": {"file": "a.sh", "runtime": "bash"},
                "tb": {"file": "b.sh", "runtime": "bash"},
                "tc": {"file": "c.sh", "runtime": "bash"},
                "td": {"file": "d.sh", "runtime": "bash"}
            },
            "workflows": {"diamond": {"file": "diamond.json"}}
        }"#,
    );
    write(
        &dir,
        "diamond.json",
        r#"{
            "name": "diamond",
            "tasks": [
                {"name": "A", "reference": "ta"},
                {"name": "B", "reference": "tb", "depends_on": ["A"]},
                {"name": "C", "reference": "tc", "depends_on": ["A"]},
                {"name": "D", "reference": "td", "depends_on": ["B", "C"]}
            ]
        }"#,
    );

    let registry = Registry::load(dir.path().join("manifest.json")).unwrap();
    let attempt = Arc::new(ScriptedAttempt::new(vec![
        succeed(json!({"from": "A"})),
        succeed(json!({"from": "B"})),
        succeed(json!({"from": "C"})),
        succeed(json!({"merged": true})),
    ]));
    let runner = task_runner(&dir, attempt.clone());
    let store = FileStore::new(dir.path().join("store.json"));
    let scheduler = WorkflowScheduler::new(&registry, &store, &runner);

    let execution_id = Uuid::new_v4();
    scheduler
        .run_workflow("diamond", Map::new(), execution_id, None, "Manual".to_string())
        .await
        .expect("diamond workflow should succeed");

    assert_eq!(attempt.call_count(), 4);

    let job_rows = jobs::list_by_execution_id(&store, execution_id).await.unwrap();
    assert!(job_rows.is_empty(), "workflow run standalone has no Jobs row");

    let task_rows = task_executions::list_by_execution_id(&store, execution_id).await.unwrap();
    assert_eq!(task_rows.len(), 4);
}

// ---------------------------------------------------------------------
// Scenario 3: retry succeeds on the 3rd attempt
// ---------------------------------------------------------------------

#[tokio::test]
async fn task_retries_then_succeeds_on_third_attempt() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir,
        "manifest.json",
        r#"{
            "tasks": {"flaky_task": {"file": "flaky.sh", "runtime": "bash"}},
            "workflows": {"flaky": {"file": "flaky.json"}}
        }"#,
    );
    write(
        &dir,
        "flaky.json",
        r#"{
            "name": "flaky",
            "tasks": [
                {"name": "Flaky", "reference": "flaky_task", "retries": 4, "retry_delay": 0}
            ]
        }"#,
    );

    let registry = Registry::load(dir.path().join("manifest.json")).unwrap();
    let attempt = Arc::new(ScriptedAttempt::new(vec![
        ScriptedOutcome::Fail { code: 1 },
        ScriptedOutcome::Fail { code: 1 },
        succeed(json!({})),
    ]));
    let runner = task_runner(&dir, attempt.clone());
    let store = FileStore::new(dir.path().join("store.json"));
    let scheduler = WorkflowScheduler::new(&registry, &store, &runner);

    let execution_id = Uuid::new_v4();
    scheduler
        .run_workflow("flaky", Map::new(), execution_id, None, "Manual".to_string())
        .await
        .expect("should eventually succeed");

    let row = task_executions::get(&store, execution_id, "Flaky").await.unwrap().unwrap();
    assert!(matches!(row.status, TaskStatus::Completed));
    assert_eq!(row.attempt, 3);
}

// ---------------------------------------------------------------------
// Scenario 4: circular dependency X dependsOn Y; Y dependsOn X
// ---------------------------------------------------------------------

#[tokio::test]
async fn circular_dependency_fails_workflow_and_leaves_rows_waiting() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir,
        "manifest.json",
        r#"{
            "tasks": {
                "tx": {"file": "x.sh", "runtime": "bash"},
                "ty": {"file": "y.sh", "runtime": "bash"}
            },
            "workflows": {"circular": {"file": "circular.json"}}
        }"#,
    );
    write(
        &dir,
        "circular.json",
        r#"{
            "name": "circular",
            "tasks": [
                {"name": "X", "reference": "tx", "depends_on": ["Y"]},
                {"name": "Y", "reference": "ty", "depends_on": ["X"]}
            ]
        }"#,
    );

    let registry = Registry::load(dir.path().join("manifest.json")).unwrap();
    let attempt = Arc::new(ScriptedAttempt::new(vec![]));
    let runner = task_runner(&dir, attempt.clone());
    let store = FileStore::new(dir.path().join("store.json"));
    let scheduler = WorkflowScheduler::new(&registry, &store, &runner);

    let execution_id = Uuid::new_v4();
    let result = scheduler
        .run_workflow("circular", Map::new(), execution_id, None, "Manual".to_string())
        .await;

    assert!(matches!(result, Err(EngineError::WorkflowStuck { .. })));
    assert_eq!(attempt.call_count(), 0, "neither step is ever runnable");

    let workflow = workflows::get(&store, execution_id).await.unwrap().unwrap();
    assert!(matches!(workflow.status, Status::Failed));

    for step in ["X", "Y"] {
        let row = task_executions::get(&store, execution_id, step).await.unwrap().unwrap();
        assert!(matches!(row.status, TaskStatus::Waiting), "{step} should remain Waiting");
    }
}

// ---------------------------------------------------------------------
// Scenario 6: shared ExecutionId across a child job
// ---------------------------------------------------------------------

#[tokio::test]
async fn child_job_shares_execution_id_with_parent() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir,
        "manifest.json",
        r#"{
            "tasks": {"t_task": {"file": "t.sh", "runtime": "bash"}},
            "jobs": {
                "job_a": {"file": "job_a.json"},
                "job_b": {"file": "job_b.json"}
            }
        }"#,
    );
    write(
        &dir,
        "job_a.json",
        r#"{
            "name": "job_a",
            "jobs": [{"name": "ChildB", "reference": "job_b"}]
        }"#,
    );
    write(
        &dir,
        "job_b.json",
        r#"{
            "name": "job_b",
            "tasks": [{"name": "T", "reference": "t_task"}]
        }"#,
    );

    let registry = Registry::load(dir.path().join("manifest.json")).unwrap();
    let attempt = Arc::new(ScriptedAttempt::new(vec![succeed(json!({"ok": true}))]));
    let runner = task_runner(&dir, attempt.clone());
    let store = FileStore::new(dir.path().join("store.json"));
    let driver = JobDriver::new(&registry, &store, &runner);

    let outcome = driver
        .run_job(RunJobArgs {
            name: "job_a".to_string(),
            input_params: Map::new(),
            trigger_type: "Manual".to_string(),
            execution_id: None,
            is_child: false,
        })
        .await
        .expect("job_a should succeed");

    let a_row = jobs::get(&store, outcome.execution_id, "job_a").await.unwrap().unwrap();
    let b_row = jobs::get(&store, outcome.execution_id, "job_b").await.unwrap().unwrap();
    assert_eq!(a_row.job_id, outcome.execution_id);
    assert_eq!(b_row.job_id, outcome.execution_id);
    assert!(matches!(a_row.status, Status::Completed));
    assert!(matches!(b_row.status, Status::Completed));

    let task_row = task_executions::get(&store, outcome.execution_id, "T").await.unwrap().unwrap();
    assert_eq!(task_row.execution_id, outcome.execution_id);
    assert!(matches!(task_row.status, TaskStatus::Completed));
}

// ---------------------------------------------------------------------
// Unsatisfied job-level dependency is fatal 
// ---------------------------------------------------------------------

#[tokio::test]
async fn job_level_unsatisfied_dependency_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir,
        "manifest.json",
        r#"{
            "tasks": {"t_task": {"file": "t.sh", "runtime": "bash"}},
            "workflows": {"wf": {"file": "wf.json"}},
            "jobs": {"job_bad": {"file": "job_bad.json"}}
        }"#,
    );
    write(
        &dir,
        "wf.json",
        r#"{"name": "wf", "tasks": [{"name": "T", "reference": "t_task"}]}"#,
    );
    write(
        &dir,
        "job_bad.json",
        r#"{
            "name": "job_bad",
            "workflows": [{"name": "NeedsGhost", "reference": "wf", "depends_on": ["ghost_step"]}]
        }"#,
    );

    let registry = Registry::load(dir.path().join("manifest.json")).unwrap();
    let attempt = Arc::new(ScriptedAttempt::new(vec![]));
    let runner = task_runner(&dir, attempt.clone());
    let store = FileStore::new(dir.path().join("store.json"));
    let driver = JobDriver::new(&registry, &store, &runner);

    let result = driver
        .run_job(RunJobArgs {
            name: "job_bad".to_string(),
            input_params: Map::new(),
            trigger_type: "Manual".to_string(),
            execution_id: None,
            is_child: false,
        })
        .await;

    assert!(matches!(result, Err(EngineError::StepDependencyUnsatisfied { .. })));
    assert_eq!(attempt.call_count(), 0, "the workflow step never dispatches");
}
