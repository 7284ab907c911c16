// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! `CoreRuntime` consumes [`RuntimeEvent`]s and produces [`CoreStep`]s
//! describing what the IO shell should do: start workers, print progress,
//! escalate. It owns no channels, processes or files, so the whole failure
//! policy can be unit tested synchronously.

use crate::engine::event_handlers::{
    handle_shutdown_request, handle_worker_exit, handle_worker_started, reap, start_run,
    CoreStep,
};
use crate::engine::outcome::{Completion, RerunHint, RunFailure};
use crate::engine::state::{CoreOptions, RunState, WorkerRecord};
use crate::engine::{RunPhase, RuntimeEvent, TaskOutcome, WorkerId};
use crate::exec::WorkerTemplate;
use crate::tasks::TaskEntry;
use crate::types::FailurePolicy;

#[derive(Debug)]
pub struct CoreRuntime {
    state: RunState,
}

impl CoreRuntime {
    pub fn new(tasks: Vec<TaskEntry>, options: CoreOptions, template: WorkerTemplate) -> Self {
        Self {
            state: RunState::new(tasks, options, template),
        }
    }

    /// Read-only view of the run state (for reporting and tests).
    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn template(&self) -> &WorkerTemplate {
        &self.state.template
    }

    pub fn options(&self) -> CoreOptions {
        self.state.options
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    pub fn live_ids(&self) -> Vec<WorkerId> {
        self.state.live_ids()
    }

    pub fn live_worker(&self, id: WorkerId) -> Option<&WorkerRecord> {
        self.state.live_worker(id)
    }

    /// Dispatch the initial batch of workers.
    pub fn start(&mut self) -> CoreStep {
        start_run(&mut self.state)
    }

    /// Handle a single runtime event.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::WorkerStarted { id, pid } => {
                handle_worker_started(&mut self.state, id, pid)
            }
            RuntimeEvent::WorkerExited { id, outcome } => {
                handle_worker_exit(&mut self.state, id, outcome)
            }
            RuntimeEvent::ShutdownRequested => handle_shutdown_request(&mut self.state),
        }
    }

    /// Account for an exit observed during escalation, bypassing the policy.
    pub fn reap(&mut self, id: WorkerId, outcome: TaskOutcome) -> CoreStep {
        reap(&mut self.state, id, outcome)
    }

    /// Drop a force-killed worker from the live set.
    pub fn discard(&mut self, id: WorkerId) -> Option<WorkerRecord> {
        self.state.retire(id, Completion::Killed)
    }

    /// Stop dispatching without touching the failure bookkeeping.
    ///
    /// Used on exit paths where the loop was left because of an error.
    pub fn halt(&mut self) {
        if self.state.phase.dispatches() {
            self.state.phase = RunPhase::Interrupted;
        }
    }

    /// Terminal verdict of the run.
    ///
    /// Only meaningful once [`is_done`](Self::is_done) holds; marks the run
    /// `Done`.
    pub fn finish(&mut self) -> Result<(), RunFailure> {
        let previous = self.state.phase;
        self.state.phase = RunPhase::Done;

        if previous == RunPhase::Interrupted {
            let rerun = self.state.stop_hint.clone().unwrap_or_else(|| {
                let mut ids = self.state.sorted_failed_ids();
                ids.extend(self.state.queue.ids());
                ids
            });
            return Err(RunFailure::Interrupted {
                rerun: RerunHint::new(rerun),
            });
        }

        if !self.state.failed {
            return Ok(());
        }

        let failed = self.state.sorted_failed_ids();
        match self.state.options.policy {
            FailurePolicy::FailFast => Err(RunFailure::Aborted {
                failed: failed.first().cloned().unwrap_or_default(),
                rerun: RerunHint::new(self.state.stop_hint.clone().unwrap_or(failed)),
            }),
            FailurePolicy::CollectAll => Err(RunFailure::AggregatedFailure {
                rerun: RerunHint::new(failed.clone()),
                failed,
            }),
        }
    }
}
