// src/engine/shutdown.rs

//! Shutdown escalation: interrupt → grace period → kill.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::engine::core::CoreRuntime;
use crate::engine::report::Reporter;
use crate::engine::{CoreCommand, CoreStep, RuntimeEvent, WorkerId};
use crate::exec::WorkerBackend;

/// Stand-in deadline when `now + grace` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// What one escalation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationSummary {
    /// Workers that received the interrupt.
    pub interrupted: Vec<WorkerId>,
    /// Workers that exited within the grace period.
    pub exited: Vec<WorkerId>,
    /// Workers still alive after the grace period, force-killed.
    pub killed: Vec<WorkerId>,
}

impl EscalationSummary {
    pub fn is_noop(&self) -> bool {
        self.interrupted.is_empty()
    }
}

/// Stop every live worker.
///
/// Each live worker is interrupted twice in a row (some test runners swallow
/// the first SIGINT that arrives shortly after start-up). Exits arriving
/// within `grace` are reaped normally; whatever is still live once `grace`
/// has passed is killed and dropped from the live set. No new workers are
/// started while this runs.
///
/// Idempotent: with an empty live set this returns immediately.
pub async fn escalate<B: WorkerBackend>(
    core: &mut CoreRuntime,
    backend: &mut B,
    events: &mut mpsc::Receiver<RuntimeEvent>,
    reporter: &Reporter,
    grace: Duration,
) -> EscalationSummary {
    let mut summary = EscalationSummary::default();

    let live = core.live_ids();
    if live.is_empty() {
        return summary;
    }
    core.halt();

    for id in live {
        if let Some(record) = core.live_worker(id) {
            reporter.interrupting(id, &record.task.display_name, record.pid);
        }
        for _ in 0..2 {
            if let Err(e) = backend.interrupt(id) {
                warn!(worker = id, error = %e, "failed to interrupt worker");
            }
        }
        summary.interrupted.push(id);
    }

    let now = Instant::now();
    let deadline = now.checked_add(grace).unwrap_or_else(|| now + FAR_FUTURE);
    while !core.live_ids().is_empty() {
        match timeout_at(deadline, events.recv()).await {
            Ok(Some(RuntimeEvent::WorkerExited { id, outcome })) => {
                if core.live_worker(id).is_some() {
                    summary.exited.push(id);
                }
                report_step(reporter, core.reap(id, outcome));
            }
            Ok(Some(RuntimeEvent::WorkerStarted { id, pid })) => {
                // The process appeared after the interrupt was queued; the
                // supervisor delivers the queued signals to it.
                debug!(worker = id, ?pid, "worker started while shutting down");
                report_step(reporter, core.step(RuntimeEvent::WorkerStarted { id, pid }));
            }
            Ok(Some(RuntimeEvent::ShutdownRequested)) => {
                debug!("shutdown already in progress");
            }
            Ok(None) => {
                warn!("event channel closed while waiting for workers to exit");
                break;
            }
            Err(_elapsed) => break,
        }
    }

    for id in core.live_ids() {
        if let Some(record) = core.live_worker(id) {
            reporter.killing(id, &record.task.display_name, grace);
        }
        if let Err(e) = backend.kill(id) {
            warn!(worker = id, error = %e, "failed to kill worker");
        }
        core.discard(id);
        summary.killed.push(id);
    }

    debug!(?summary, "escalation finished");
    summary
}

/// Print a step's report lines. Dispatches and nested escalations cannot
/// occur while shutting down.
fn report_step(reporter: &Reporter, step: CoreStep) {
    for command in step.commands {
        if let CoreCommand::Report(event) = command {
            reporter.report(&event);
        }
    }
}
