//! Engine-level error types — the Workflow Scheduler and Job Driver share
//! one error enum, wrapping the lower-layer crates' errors with `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("manifest error: {0}")]
    Manifest(#[from] manifest::ManifestError),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("task error: {0}")]
    Task(#[from] tasks::TaskError),

    /// No runnable steps remain though steps are still pending — the
    /// deadlock / circular-dependency detector.
    #[error("workflow '{workflow}' stuck waiting for dependencies. Remaining: {remaining}")]
    WorkflowStuck { workflow: String, remaining: String },

    /// A job-level workflow or child-job step's `dependsOn` is not a
    /// subset of already-completed steps.
    #[error("job '{job}' step '{step}' has unsatisfied dependencies: {missing}")]
    StepDependencyUnsatisfied { job: String, step: String, missing: String },
}
