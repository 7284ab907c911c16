// src/engine/mod.rs

//! Orchestration engine for forkrun.
//!
//! - [`state`] holds the per-run state (queue, live workers, failures) and
//!   the pool controller that fills free slots.
//! - [`event_handlers`] is the failure policy engine: what happens when a
//!   worker starts, exits, or the run is interrupted.
//! - [`core`] wraps both into a pure, synchronous state machine that emits
//!   [`CoreCommand`]s.
//! - [`runtime`] is the async IO shell: it waits for worker exits and
//!   executes the core's commands.
//! - [`shutdown`] implements interrupt → grace period → kill escalation.
//! - [`report`] formats progress lines and rerun hints.
//! - [`outcome`] defines the run-level result types.

use std::time::Duration;

/// Isolation index of a worker. Unique and strictly increasing within a run,
/// starting at 1.
pub type WorkerId = u64;

/// Outcome of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// Non-zero exit; `-1` when there was no exit code (signal, spawn error).
    Failed(i32),
}

impl TaskOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Dispatching, no failures yet.
    Running,
    /// Collect-all after at least one failure: still dispatching.
    Draining,
    /// Fail-fast after the first failure: no more dispatching.
    Aborting,
    /// External shutdown request: no more dispatching.
    Interrupted,
    /// Queue empty (or abandoned) and no live workers.
    Done,
}

impl RunPhase {
    /// Whether the pool controller may start new workers.
    pub fn dispatches(self) -> bool {
        matches!(self, RunPhase::Running | RunPhase::Draining)
    }
}

/// Options for the async runtime shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// How long interrupted workers may take to exit before being killed.
    pub grace_period: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
        }
    }
}

/// Events flowing into the runtime from backends and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A worker's process now exists.
    WorkerStarted { id: WorkerId, pid: Option<u32> },
    /// A worker finished and was reaped.
    WorkerExited { id: WorkerId, outcome: TaskOutcome },
    /// The orchestrator itself was asked to stop (Ctrl-C, SIGTERM).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod outcome;
pub mod report;
pub mod runtime;
pub mod shutdown;
pub mod state;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use outcome::{Completion, CompletedTask, RerunHint, RunFailure, RunReport};
pub use report::{format_elapsed, ReportEvent, Reporter};
pub use runtime::Runtime;
pub use shutdown::EscalationSummary;
pub use state::{CoreOptions, RunState, WorkerRecord};
