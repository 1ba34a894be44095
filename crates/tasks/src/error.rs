//! Task Runner error type.

use thiserror::Error;

/// Errors produced while running a single task step.
///
/// `NonZeroExit` and `SpawnFailure` are the two conditions the dispatch loop
/// treats identically for retry-counting purposes; they stay distinct
/// variants only because their display text differs.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task '{step}' exited with code {code:?} after {attempts} attempt(s)")]
    NonZeroExit {
        step: String,
        code: Option<i32>,
        attempts: u32,
    },

    #[error("failed to spawn child process for task '{step}': {source}")]
    SpawnFailure {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read or write I/O file for task '{step}': {source}")]
    Io {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize task I/O for '{step}': {source}")]
    Serde {
        step: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store error while running task '{step}': {source}")]
    Store {
        step: String,
        #[source]
        source: store::StoreError,
    },
}

impl TaskError {
    pub fn step(&self) -> &str {
        match self {
            TaskError::NonZeroExit { step, .. }
            | TaskError::SpawnFailure { step, .. }
            | TaskError::Io { step, .. }
            | TaskError::Serde { step, .. }
            | TaskError::Store { step, .. } => step,
        }
    }
}
