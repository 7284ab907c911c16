// src/engine/event_handlers.rs

//! Failure policy engine: reacting to worker lifecycle events.

use tracing::{debug, info};

use crate::engine::outcome::{Completion, RerunHint};
use crate::engine::report::ReportEvent;
use crate::engine::state::RunState;
use crate::engine::{RunPhase, TaskOutcome, WorkerId};
use crate::exec::WorkerSpec;
use crate::types::FailurePolicy;

/// Command produced by the pure core, executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Start these workers.
    Dispatch(Vec<WorkerSpec>),
    /// Emit a progress line.
    Report(ReportEvent),
    /// Interrupt every live worker, wait, then kill stragglers.
    Escalate,
}

/// Commands resulting from one event, in execution order.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
}

impl CoreStep {
    fn push_fill(&mut self, state: &mut RunState) {
        let (workers, reports) = state.fill();
        self.commands
            .extend(reports.into_iter().map(CoreCommand::Report));
        if !workers.is_empty() {
            self.commands.push(CoreCommand::Dispatch(workers));
        }
    }

    fn push_progress(&mut self, state: &RunState) {
        if state.live.is_empty() {
            return;
        }
        self.commands.push(CoreCommand::Report(ReportEvent::Progress {
            running: state.live_display_names(),
            remaining: state.queue.display_names(),
        }));
    }

    /// Workers to be started by this step.
    pub fn dispatched(&self) -> impl Iterator<Item = &WorkerSpec> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Dispatch(workers) => Some(workers),
                _ => None,
            })
            .flatten()
    }

    pub fn escalates(&self) -> bool {
        self.commands
            .iter()
            .any(|c| matches!(c, CoreCommand::Escalate))
    }
}

/// Fill the pool for the first time.
pub fn start_run(state: &mut RunState) -> CoreStep {
    let mut step = CoreStep::default();
    step.push_fill(state);
    step
}

/// Record the pid of a worker whose process now exists.
pub fn handle_worker_started(state: &mut RunState, id: WorkerId, pid: Option<u32>) -> CoreStep {
    let mut step = CoreStep::default();
    let Some(record) = state.live.get_mut(&id) else {
        debug!(worker = id, ?pid, "start reported for unknown worker; ignoring");
        return step;
    };
    record.pid = pid;
    step.commands.push(CoreCommand::Report(ReportEvent::Started {
        worker: id,
        task: record.task.display_name.clone(),
        pid,
    }));
    step
}

/// Handle a reaped worker exit according to the failure policy.
///
/// Exits for workers the live set does not know about are ignored.
pub fn handle_worker_exit(state: &mut RunState, id: WorkerId, outcome: TaskOutcome) -> CoreStep {
    let mut step = CoreStep::default();

    if !state.live.contains_key(&id) {
        debug!(worker = id, ?outcome, "reaped unknown worker; ignoring");
        return step;
    }

    if !state.phase.dispatches() {
        return reap(state, id, outcome);
    }

    let Some(record) = state.retire(id, Completion::Exited(outcome)) else {
        return step;
    };
    let elapsed = record.started_at.elapsed();

    match outcome {
        TaskOutcome::Success => {
            step.commands.push(CoreCommand::Report(ReportEvent::Finished {
                worker: id,
                task: record.task.display_name.clone(),
                output_dir: record.output_dir.clone(),
                elapsed,
            }));
            step.push_progress(state);
            step.push_fill(state);
        }
        TaskOutcome::Failed(exit_code) => {
            step.commands.push(CoreCommand::Report(ReportEvent::Failed {
                worker: id,
                task: record.task.display_name.clone(),
                output_dir: record.output_dir.clone(),
                elapsed,
                exit_code,
            }));
            state.failed = true;
            state.failed_tasks.push((id, record.task.id.clone()));

            match state.options.policy {
                FailurePolicy::FailFast => {
                    let mut rerun = vec![record.task.id.clone()];
                    rerun.extend(state.live_task_ids());
                    rerun.extend(state.queue.ids());

                    info!(
                        worker = id,
                        task = %record.task.id,
                        live = state.live.len(),
                        queued = state.queue.len(),
                        "fail-fast: aborting run"
                    );
                    state.phase = RunPhase::Aborting;
                    state.stop_hint = Some(rerun.clone());
                    step.commands
                        .push(CoreCommand::Report(ReportEvent::RerunRemaining(RerunHint::new(rerun))));
                    step.commands.push(CoreCommand::Escalate);
                }
                FailurePolicy::CollectAll => {
                    state.phase = RunPhase::Draining;
                    step.push_progress(state);
                    step.push_fill(state);
                }
            }
        }
    }

    step
}

/// Account for an exit without applying the failure policy.
///
/// Used while the run is shutting down: only the first failure counts, and
/// workers stopped by escalation are not task failures.
pub fn reap(state: &mut RunState, id: WorkerId, outcome: TaskOutcome) -> CoreStep {
    let mut step = CoreStep::default();
    if let Some(record) = state.retire(id, Completion::Exited(outcome)) {
        step.commands.push(CoreCommand::Report(ReportEvent::Reaped {
            worker: id,
            task: record.task.display_name,
            outcome,
        }));
    } else {
        debug!(worker = id, ?outcome, "reaped unknown worker; ignoring");
    }
    step
}

/// External shutdown request: stop dispatching and escalate.
///
/// Repeated requests, or a request while already aborting, only escalate
/// again (which is a no-op once the live set is empty).
pub fn handle_shutdown_request(state: &mut RunState) -> CoreStep {
    let mut step = CoreStep::default();

    if state.phase.dispatches() {
        let mut rerun = state.sorted_failed_ids();
        rerun.extend(state.live_task_ids());
        rerun.extend(state.queue.ids());

        info!(
            live = state.live.len(),
            queued = state.queue.len(),
            "shutdown requested; no further workers will be started"
        );
        state.phase = RunPhase::Interrupted;
        state.stop_hint = Some(rerun.clone());
        step.commands
            .push(CoreCommand::Report(ReportEvent::Interrupted(RerunHint::new(rerun))));
    } else {
        debug!(phase = ?state.phase, "shutdown requested while already stopping");
    }

    step.commands.push(CoreCommand::Escalate);
    step
}
