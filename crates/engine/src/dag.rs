//! Dependency-graph helpers shared by the Workflow Scheduler and Job
//! Driver.
//!
//! Generalizes a one-shot Kahn's-algorithm topological sort over a fixed
//! node/edge graph into a runnable-set query over named steps whose
//! "edges" are each step's `dependsOn` list — these steps aren't a graph
//! known in full up front in the same sense a node/edge workflow is; a
//! step can also be blocked by something other than a pure cycle (a
//! dependency that itself failed and will never join `completed`).

use std::collections::HashSet;

use manifest::Step;

/// Every step not yet completed whose entire `dependsOn` list is already
/// in `completed`.
pub fn runnable_steps<'a>(steps: &'a [&'a Step], completed: &HashSet<String>) -> Vec<&'a Step> {
    steps
        .iter()
        .copied()
        .filter(|step| !completed.contains(&step.name))
        .filter(|step| step.depends_on.iter().all(|dep| completed.contains(dep)))
        .collect()
}

/// The subset of `step.dependsOn` not yet in `completed` — used both for
/// the scheduler's `"Waiting for: ..."` live-state message and for the
/// job driver's `StepDependencyUnsatisfied` fatal error.
pub fn blockers<'a>(step: &'a Step, completed: &HashSet<String>) -> Vec<&'a str> {
    step.depends_on
        .iter()
        .filter(|dep| !completed.contains(dep.as_str()))
        .map(String::as_str)
        .collect()
}
