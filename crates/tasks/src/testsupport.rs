//! A scripted [`ProcessAttempt`] stand-in so the retry loop in
//! [`crate::runner`] can be exercised without spawning a real child
//! process.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use store::Store;

use crate::error::TaskError;
use crate::process::{AttemptResult, ProcessAttempt};

/// One scripted attempt outcome.
pub enum ScriptedOutcome {
    /// Succeed with exit code 0, writing `output` to the output file and
    /// emitting `state_lines` as `STATE:`-prefixed stdout lines first.
    Succeed { output: Value, state_lines: Vec<String> },
    /// Fail with a non-zero exit code; no output file is written.
    Fail { code: i32 },
}

/// A [`ProcessAttempt`] that plays back a fixed script of outcomes, one per
/// call, and writes/skips the output file accordingly — close enough to a
/// real child process's externally-observable behavior to drive the retry
/// loop faithfully, without `tokio::process::Command` in the loop.
pub struct ScriptedAttempt {
    outcomes: Mutex<Vec<ScriptedOutcome>>,
    pub calls: Mutex<u32>,
}

impl ScriptedAttempt {
    pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
        // Played back in order, so reverse once up front and `pop()` per call.
        let mut outcomes = outcomes;
        outcomes.reverse();
        Self {
            outcomes: Mutex::new(outcomes),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ProcessAttempt for ScriptedAttempt {
    async fn run(
        &self,
        store: &dyn Store,
        execution_id: Uuid,
        step_name: &str,
        _runtime_path: &str,
        _runtime: &str,
        _script_path: &Path,
        _input_file: &Path,
        output_file: &Path,
    ) -> Result<AttemptResult, TaskError> {
        *self.calls.lock().unwrap() += 1;

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(ScriptedOutcome::Fail { code: 1 });

        match outcome {
            ScriptedOutcome::Succeed { output, state_lines } => {
                let mut stdout = String::new();
                for line in &state_lines {
                    let state_line = format!("STATE: {line}");
                    stdout.push_str(&state_line);
                    stdout.push('\n');
                    store::repository::task_executions::try_update_state(store, execution_id, step_name, line)
                        .await;
                }
                let text = serde_json::to_string(&output).map_err(|source| TaskError::Serde {
                    step: step_name.to_string(),
                    source,
                })?;
                tokio::fs::write(output_file, text).await.map_err(|source| TaskError::Io {
                    step: step_name.to_string(),
                    source,
                })?;
                Ok(AttemptResult {
                    exit_code: 0,
                    stdout,
                    stderr: String::new(),
                })
            }
            ScriptedOutcome::Fail { code } => Ok(AttemptResult {
                exit_code: code,
                stdout: String::new(),
                stderr: format!("scripted failure, exit {code}"),
            }),
        }
    }
}

/// Convenience: a task that echoes its merged input back as its output,
/// used by the round-trip property test.
pub fn echoing_outcome(merged_input: &Map<String, Value>) -> ScriptedOutcome {
    ScriptedOutcome::Succeed {
        output: json!(merged_input),
        state_lines: vec![],
    }
}
