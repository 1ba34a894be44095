//! `tasks` crate — the Task Runner.
//!
//! Executes one task step: writes its input, spawns the runtime's child
//! process, captures output/state, and retries on non-zero exit. The
//! dispatch mechanics live behind [`process::ProcessAttempt`] so the retry
//! loop in [`runner::TaskRunner`] can be exercised without a real
//! subprocess (see [`testsupport`]).

pub mod error;
pub mod process;
pub mod runner;
pub mod testsupport;

pub use error::TaskError;
pub use process::{AttemptResult, ChildProcessAttempt, ProcessAttempt};
pub use runner::{TaskRunArgs, TaskRunner};
