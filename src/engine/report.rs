// src/engine/report.rs

//! Human-facing progress lines.
//!
//! Every line is prefixed with the time elapsed since the run started, in
//! the `[MMm SSs]` form, and also carries structured `tracing` fields.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::engine::outcome::RerunHint;
use crate::engine::{TaskOutcome, WorkerId};
use crate::types::FailurePolicy;

/// Something the core wants reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Dispatched {
        worker: WorkerId,
        task: String,
        output_dir: PathBuf,
        /// Tasks still queued after this dispatch.
        remaining: usize,
    },
    Started {
        worker: WorkerId,
        task: String,
        pid: Option<u32>,
    },
    Finished {
        worker: WorkerId,
        task: String,
        output_dir: PathBuf,
        elapsed: Duration,
    },
    Failed {
        worker: WorkerId,
        task: String,
        output_dir: PathBuf,
        elapsed: Duration,
        exit_code: i32,
    },
    /// Display names of live workers and of still-queued tasks.
    Progress {
        running: Vec<String>,
        remaining: Vec<String>,
    },
    /// Fail-fast: everything that did not get to finish.
    RerunRemaining(RerunHint),
    /// Exit observed while shutting down.
    Reaped {
        worker: WorkerId,
        task: String,
        outcome: TaskOutcome,
    },
    /// External interruption: everything that needs another go.
    Interrupted(RerunHint),
}

/// `MMm SSs`, minutes not wrapping at the hour.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}m {:02}s", secs / 60, secs % 60)
}

/// Emits progress lines relative to the run's start.
#[derive(Debug, Clone)]
pub struct Reporter {
    start: Instant,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Restart the clock; called when the run actually begins.
    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn stamp(&self) -> String {
        format!("[{}]", format_elapsed(self.elapsed()))
    }

    pub fn run_started(&self, capacity: usize, policy: FailurePolicy, tasks: usize, root: &Path) {
        info!(
            capacity,
            %policy,
            tasks,
            output_root = %root.display(),
            "{} Started; will run {} tasks on {} parallel workers",
            self.stamp(),
            tasks,
            capacity
        );
    }

    pub fn report(&self, event: &ReportEvent) {
        let stamp = self.stamp();
        match event {
            ReportEvent::Dispatched {
                worker,
                task,
                output_dir,
                remaining,
            } => {
                info!(
                    worker = *worker,
                    task = %task,
                    output = %output_dir.display(),
                    "{stamp} [{task}] dispatched as worker {worker}; {remaining} jobs left to start."
                );
            }
            ReportEvent::Started { worker, task, pid } => match pid {
                Some(pid) => info!(
                    worker = *worker,
                    task = %task,
                    pid = *pid,
                    "{stamp} [{task}] started (pid {pid})"
                ),
                None => info!(worker = *worker, task = %task, "{stamp} [{task}] started"),
            },
            ReportEvent::Finished {
                worker,
                task,
                output_dir,
                elapsed,
            } => {
                info!(
                    worker = *worker,
                    task = %task,
                    output = %output_dir.display(),
                    "{stamp} [{task}] finished. Elapsed time was {}. Output is in {}",
                    format_elapsed(*elapsed),
                    output_dir.display()
                );
            }
            ReportEvent::Failed {
                worker,
                task,
                output_dir,
                elapsed,
                exit_code,
            } => {
                error!(
                    worker = *worker,
                    task = %task,
                    exit_code = *exit_code,
                    output = %output_dir.display(),
                    "{stamp} [{task}] failed. Elapsed time was {}. Output is in {}",
                    format_elapsed(*elapsed),
                    output_dir.display()
                );
            }
            ReportEvent::Progress { running, remaining } => {
                if running.is_empty() {
                    return;
                }
                info!("{stamp} Still running: {}", running.join(" "));
                info!("{stamp} Remaining: {}", remaining.join(" "));
            }
            ReportEvent::RerunRemaining(hint) => {
                warn!(
                    rerun = %hint,
                    "{stamp} Rerun only the remaining tasks with: {hint}"
                );
            }
            ReportEvent::Reaped {
                worker,
                task,
                outcome,
            } => {
                debug!(worker = *worker, task = %task, ?outcome, "{stamp} [{task}] reaped during shutdown");
            }
            ReportEvent::Interrupted(hint) => {
                warn!(
                    rerun = %hint,
                    "{stamp} Interrupted; rerun the unfinished tasks with: {hint}"
                );
            }
        }
    }

    pub fn rerun_failed(&self, hint: &RerunHint) {
        error!(rerun = %hint, "{} Rerun only the failed tasks with: {hint}", self.stamp());
    }

    pub fn interrupting(&self, worker: WorkerId, task: &str, pid: Option<u32>) {
        warn!(
            worker,
            task,
            pid,
            "{} Sending SIGINT to worker {worker} ({task})",
            self.stamp()
        );
    }

    pub fn killing(&self, worker: WorkerId, task: &str, grace: Duration) {
        warn!(
            worker,
            task,
            grace_ms = grace.as_millis() as u64,
            "{} [{task}] still running after {:?}; sending SIGKILL",
            self.stamp(),
            grace
        );
    }

    pub fn run_finished(&self, failed: bool) {
        let elapsed = format_elapsed(self.elapsed());
        if failed {
            error!("{} Elapsed time: {elapsed}", self.stamp());
        } else {
            info!("{} Elapsed time: {elapsed}", self.stamp());
        }
    }
}
