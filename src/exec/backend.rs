// src/exec/backend.rs

//! Pluggable worker backend abstraction.
//!
//! The runtime talks to a `WorkerBackend` instead of spawning processes
//! itself. Production uses [`ProcessBackend`]; tests plug in a scripted fake
//! that emits `RuntimeEvent`s without touching the OS.
//!
//! Backends report progress asynchronously over the runtime event channel:
//! `WorkerStarted` once a process exists and exactly one `WorkerExited` per
//! spawned worker.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{RuntimeEvent, WorkerId};
use crate::errors::Result;

use super::command::WorkerSpec;
use super::signals::{signal_group, WorkerSignal};
use super::supervisor::{supervise, PidRegistry};

/// Trait abstracting how workers are started and signalled.
pub trait WorkerBackend: Send {
    /// Start the given workers.
    fn spawn_workers(
        &mut self,
        workers: Vec<WorkerSpec>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask a worker to stop (SIGINT to its process group).
    fn interrupt(&mut self, id: WorkerId) -> Result<()>;

    /// Terminate a worker unconditionally (SIGKILL to its process group).
    fn kill(&mut self, id: WorkerId) -> Result<()>;
}

/// Real backend: one OS process per worker, each owned by a supervising
/// Tokio task.
///
/// Dropping the backend SIGKILLs every process group still registered, so
/// workers cannot outlive an orchestrator that is torn down without running
/// escalation.
pub struct ProcessBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    controls: HashMap<WorkerId, mpsc::UnboundedSender<WorkerSignal>>,
    pids: PidRegistry,
}

impl ProcessBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            controls: HashMap::new(),
            pids: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn send(&mut self, id: WorkerId, signal: WorkerSignal) {
        match self.controls.get(&id) {
            Some(tx) => {
                if tx.send(signal).is_err() {
                    debug!(worker = id, ?signal, "worker supervisor already finished");
                    self.controls.remove(&id);
                }
            }
            None => debug!(worker = id, ?signal, "no such worker; ignoring signal"),
        }
    }
}

impl WorkerBackend for ProcessBackend {
    fn spawn_workers(
        &mut self,
        workers: Vec<WorkerSpec>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for spec in workers {
                let (control_tx, control_rx) = mpsc::unbounded_channel();
                self.controls.insert(spec.id, control_tx);

                let runtime_tx = self.runtime_tx.clone();
                let pids = Arc::clone(&self.pids);
                tokio::spawn(supervise(spec, runtime_tx, control_rx, pids));
            }
            Ok(())
        })
    }

    fn interrupt(&mut self, id: WorkerId) -> Result<()> {
        self.send(id, WorkerSignal::Interrupt);
        Ok(())
    }

    fn kill(&mut self, id: WorkerId) -> Result<()> {
        self.send(id, WorkerSignal::Kill);
        Ok(())
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        let Ok(pids) = self.pids.lock() else {
            return;
        };
        for (id, pid) in pids.iter() {
            warn!(worker = *id, pid = *pid, "worker still alive at teardown; killing");
            if let Err(e) = signal_group(*pid, WorkerSignal::Kill) {
                warn!(worker = *id, error = %e, "kill at teardown failed");
            }
        }
    }
}
