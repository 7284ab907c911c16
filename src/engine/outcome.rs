// src/engine/outcome.rs

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::engine::{TaskOutcome, WorkerId};
use crate::tasks::{TaskId, TaskSpec};

/// Subset of task identifiers a caller should retry.
///
/// Displays as the identifiers separated by spaces, which is exactly what the
/// CLI accepts as positional tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RerunHint {
    pub tasks: Vec<TaskId>,
}

impl RerunHint {
    pub fn new(tasks: Vec<TaskId>) -> Self {
        Self { tasks }
    }
}

impl fmt::Display for RerunHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tasks.join(" "))
    }
}

/// Run-level failure surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// Fail-fast: the first failure stopped the run.
    #[error("aborted on first failure of '{failed}'; rerun with: {rerun}")]
    Aborted { failed: TaskId, rerun: RerunHint },

    /// Collect-all: every task ran, some failed.
    #[error("completed with {} failure(s); rerun with: {rerun}", failed.len())]
    AggregatedFailure { failed: Vec<TaskId>, rerun: RerunHint },

    /// The orchestrator was interrupted from outside.
    #[error("interrupted; rerun with: {rerun}")]
    Interrupted { rerun: RerunHint },
}

impl RunFailure {
    pub fn rerun(&self) -> &RerunHint {
        match self {
            RunFailure::Aborted { rerun, .. }
            | RunFailure::AggregatedFailure { rerun, .. }
            | RunFailure::Interrupted { rerun } => rerun,
        }
    }
}

/// How a worker left the live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Reaped with an exit status.
    Exited(TaskOutcome),
    /// Force-killed during escalation and dropped from the live set.
    Killed,
}

/// Bookkeeping for a worker that is no longer live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTask {
    pub worker: WorkerId,
    pub task: TaskSpec,
    pub output_dir: PathBuf,
    pub completion: Completion,
}

/// Successful run summary.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Every worker of the run, in isolation-index order.
    pub completed: Vec<CompletedTask>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_render_their_rerun_hint() {
        let failure = RunFailure::AggregatedFailure {
            failed: vec!["build:b".into()],
            rerun: RerunHint::new(vec!["build:b".into()]),
        };
        assert_eq!(
            failure.to_string(),
            "completed with 1 failure(s); rerun with: build:b"
        );

        let aborted = RunFailure::Aborted {
            failed: "x".into(),
            rerun: RerunHint::new(vec!["x".into(), "y".into(), "z".into()]),
        };
        assert_eq!(aborted.rerun().to_string(), "x y z");
        assert!(aborted.to_string().starts_with("aborted on first failure of 'x'"));
    }
}
