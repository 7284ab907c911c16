// src/exec/supervisor.rs

//! Supervision of a single worker process.

use std::collections::HashMap;
use std::fs::{self, File};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::{RuntimeEvent, TaskOutcome, WorkerId};
use crate::exec::command::WorkerSpec;
use crate::exec::signals::{signal_group, WorkerSignal};

/// Process ids of workers whose process currently exists, keyed by worker.
pub(crate) type PidRegistry = Arc<Mutex<HashMap<WorkerId, u32>>>;

/// Run one worker from start-up delay to reaped exit, then report
/// `WorkerExited`.
///
/// Control messages arriving on `control_rx` are translated into signals
/// for the worker's process group. An interrupt during the start-up delay
/// cancels the worker before its process exists.
pub(crate) async fn supervise(
    spec: WorkerSpec,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    mut control_rx: mpsc::UnboundedReceiver<WorkerSignal>,
    pids: PidRegistry,
) {
    let id = spec.id;
    let outcome = match supervise_inner(&spec, &runtime_tx, &mut control_rx, &pids).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(
                worker = id,
                task = %spec.task.id,
                error = %format!("{err:#}"),
                "worker could not be run"
            );
            TaskOutcome::Failed(-1)
        }
    };

    if let Ok(mut map) = pids.lock() {
        map.remove(&id);
    }

    if runtime_tx
        .send(RuntimeEvent::WorkerExited { id, outcome })
        .await
        .is_err()
    {
        debug!(worker = id, "runtime gone before exit could be reported");
    }
}

async fn supervise_inner(
    spec: &WorkerSpec,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    control_rx: &mut mpsc::UnboundedReceiver<WorkerSignal>,
    pids: &PidRegistry,
) -> Result<TaskOutcome> {
    if !spec.stagger.is_zero() {
        debug!(worker = spec.id, delay_ms = spec.stagger.as_millis() as u64, "staggering start");
        tokio::select! {
            _ = tokio::time::sleep(spec.stagger) => {}
            signal = control_rx.recv() => {
                info!(worker = spec.id, ?signal, "worker cancelled before its process started");
                return Ok(TaskOutcome::Failed(-1));
            }
        }
    }

    let mut child = spawn_worker_process(spec)?;
    let pid = child.id();

    if let Some(pid) = pid {
        if let Ok(mut map) = pids.lock() {
            map.insert(spec.id, pid);
        }
    }

    let _ = runtime_tx
        .send(RuntimeEvent::WorkerStarted { id: spec.id, pid })
        .await;

    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.with_context(|| {
                    format!("waiting for worker {} ({})", spec.id, spec.task.display_name)
                })?;
                return Ok(outcome_of(spec.id, status));
            }
            signal = control_rx.recv() => match signal {
                Some(signal) => deliver(spec.id, pid, &mut child, signal),
                None => {
                    // Backend dropped without escalation: make sure the
                    // process does not outlive us.
                    deliver(spec.id, pid, &mut child, WorkerSignal::Kill);
                    let status = child.wait().await.context("reaping killed worker")?;
                    return Ok(outcome_of(spec.id, status));
                }
            }
        }
    }
}

fn spawn_worker_process(spec: &WorkerSpec) -> Result<Child> {
    fs::create_dir_all(&spec.output_dir)
        .with_context(|| format!("creating output dir {:?}", spec.output_dir))?;
    let stdout = File::create(spec.stdout_path())
        .with_context(|| format!("creating {:?}", spec.stdout_path()))?;
    let stderr = File::create(spec.stderr_path())
        .with_context(|| format!("creating {:?}", spec.stderr_path()))?;

    let mut cmd = Command::new(&spec.command.program);
    cmd.args(&spec.command.args)
        .envs(spec.command.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    if let Some(cwd) = &spec.command.cwd {
        cmd.current_dir(cwd);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    debug!(worker = spec.id, argv = ?spec.command.argv(), "spawning worker process");

    cmd.spawn().with_context(|| {
        format!(
            "spawning `{}` for task '{}'",
            spec.command.program, spec.task.id
        )
    })
}

fn deliver(id: WorkerId, pid: Option<u32>, child: &mut Child, signal: WorkerSignal) {
    let result = match pid {
        Some(pid) => signal_group(pid, signal),
        None => Ok(()),
    };

    if let Err(e) = result {
        warn!(worker = id, ?signal, error = %e, "signalling worker process group failed");
    }

    // The group signal covers the leader too; this is the fallback for
    // platforms without process groups.
    if signal == WorkerSignal::Kill || cfg!(not(unix)) {
        if let Err(e) = child.start_kill() {
            debug!(worker = id, error = %e, "start_kill on worker failed");
        }
    }
}

fn outcome_of(id: WorkerId, status: ExitStatus) -> TaskOutcome {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            debug!(worker = id, signal, "worker terminated by signal");
        }
    }

    if status.success() {
        TaskOutcome::Success
    } else {
        let code = status.code().unwrap_or(-1);
        debug!(worker = id, exit_code = code, "worker exited unsuccessfully");
        TaskOutcome::Failed(code)
    }
}
