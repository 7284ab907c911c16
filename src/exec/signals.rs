// src/exec/signals.rs

//! Signal delivery to worker process groups.
//!
//! Every worker is started as the leader of its own process group, so
//! signalling the group also reaches whatever the task runner forked.

use anyhow::Result;

/// Signals the orchestrator sends to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// Polite stop request (SIGINT).
    Interrupt,
    /// Non-ignorable termination (SIGKILL).
    Kill,
}

#[cfg(unix)]
pub fn signal_group(pid: u32, signal: WorkerSignal) -> Result<()> {
    use anyhow::Context;
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).context("pid out of range")?;
    let sig = match signal {
        WorkerSignal::Interrupt => Signal::SIGINT,
        WorkerSignal::Kill => Signal::SIGKILL,
    };

    match killpg(Pid::from_raw(raw), sig) {
        // Group already gone: nothing left to signal.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("sending {sig} to process group {raw}")),
    }
}

#[cfg(not(unix))]
pub fn signal_group(_pid: u32, signal: WorkerSignal) -> Result<()> {
    anyhow::bail!("{signal:?}: process-group signals are not supported on this platform")
}
