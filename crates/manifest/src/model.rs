//! On-disk manifest and workflow/job definition shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_runtime_env() -> String {
    "default".to_string()
}

fn default_retry_delay() -> u64 {
    5
}

/// A pointer to a task's on-disk script and the runtime that executes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPointer {
    pub file: String,
    pub runtime: String,
    #[serde(default = "default_runtime_env")]
    pub runtime_env: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A pointer to a workflow or job's on-disk definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionPointer {
    pub file: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The top-level `manifest.json` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestFile {
    #[serde(default)]
    pub tasks: HashMap<String, TaskPointer>,
    #[serde(default)]
    pub workflows: HashMap<String, DefinitionPointer>,
    #[serde(default)]
    pub jobs: HashMap<String, DefinitionPointer>,
    #[serde(default)]
    pub integrations: HashMap<String, Value>,
}

/// Which kind of entity a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Task,
    Workflow,
    Job,
}

impl Kind {
    pub fn label(self) -> &'static str {
        match self {
            Kind::Task => "task",
            Kind::Workflow => "workflow",
            Kind::Job => "job",
        }
    }
}

/// A single step inside a workflow or job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub reference: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// A JSON object, not a bare map, because it is merged directly into
    /// the `Map<String, Value>` execution context / task input.
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

/// `<workflow>.json`: ordered sequences of task- and
/// workflow-kind steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Step>,
    #[serde(default)]
    pub workflows: Vec<Step>,
}

/// `<job>.json`: task/workflow steps plus child-job steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Step>,
    #[serde(default)]
    pub workflows: Vec<Step>,
    #[serde(default)]
    pub jobs: Vec<Step>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub trigger_type: Option<String>,
}

impl WorkflowDef {
    /// All steps across `tasks` and `workflows`, in declaration order
    /// (tasks first, matching the job driver's own phase ordering).
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.tasks.iter().chain(self.workflows.iter())
    }
}

impl JobDef {
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.tasks.iter().chain(self.workflows.iter()).chain(self.jobs.iter())
    }
}

/// Returns `true` if `name` matches `^[A-Za-z0-9_]+$`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
