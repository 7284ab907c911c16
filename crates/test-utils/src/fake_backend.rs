use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use forkrun::engine::{RuntimeEvent, TaskOutcome, WorkerId};
use forkrun::errors::Result;
use forkrun::exec::{WorkerBackend, WorkerSignal, WorkerSpec};

/// How a fake worker behaves once spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Exit with the given outcome after the given delay.
    Exit(TaskOutcome, Duration),
    /// Run until interrupted; exits with 130 on the first SIGINT.
    UntilInterrupted,
    /// Ignore SIGINT; only SIGKILL ends it.
    IgnoresInterrupt,
}

impl Behaviour {
    pub fn succeed() -> Self {
        Behaviour::Exit(TaskOutcome::Success, Duration::ZERO)
    }

    pub fn fail() -> Self {
        Behaviour::Exit(TaskOutcome::Failed(1), Duration::ZERO)
    }
}

/// Everything the fake backend observed.
#[derive(Debug, Default, Clone)]
pub struct BackendLog {
    pub spawned: Vec<WorkerSpec>,
    pub interrupts: Vec<WorkerId>,
    pub kills: Vec<WorkerId>,
    /// Workers currently "running" according to the fake.
    pub running: usize,
    pub peak_running: usize,
}

impl BackendLog {
    pub fn spawned_ids(&self) -> Vec<String> {
        self.spawned.iter().map(|s| s.task.id.clone()).collect()
    }
}

/// A fake backend that:
/// - records every spawned worker and every signal
/// - simulates each worker per its scripted [`Behaviour`] (default: succeed)
/// - reports `WorkerStarted` / `WorkerExited` like the real backend.
pub struct ScriptedBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    script: HashMap<String, Behaviour>,
    default: Behaviour,
    controls: HashMap<WorkerId, mpsc::UnboundedSender<WorkerSignal>>,
    log: Arc<Mutex<BackendLog>>,
}

impl ScriptedBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            script: HashMap::new(),
            default: Behaviour::succeed(),
            controls: HashMap::new(),
            log: Arc::new(Mutex::new(BackendLog::default())),
        }
    }

    /// Script the behaviour of the task with this id.
    pub fn with(mut self, task_id: &str, behaviour: Behaviour) -> Self {
        self.script.insert(task_id.to_string(), behaviour);
        self
    }

    pub fn with_default(mut self, behaviour: Behaviour) -> Self {
        self.default = behaviour;
        self
    }

    /// Shared handle on the log, usable after the backend moved into a runtime.
    pub fn log(&self) -> Arc<Mutex<BackendLog>> {
        Arc::clone(&self.log)
    }

    fn signal(&mut self, id: WorkerId, signal: WorkerSignal) {
        {
            let mut log = self.log.lock().unwrap();
            match signal {
                WorkerSignal::Interrupt => log.interrupts.push(id),
                WorkerSignal::Kill => log.kills.push(id),
            }
        }
        if let Some(tx) = self.controls.get(&id) {
            let _ = tx.send(signal);
        }
    }
}

impl WorkerBackend for ScriptedBackend {
    fn spawn_workers(
        &mut self,
        workers: Vec<WorkerSpec>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for spec in workers {
                let behaviour = self
                    .script
                    .get(&spec.task.id)
                    .copied()
                    .unwrap_or(self.default);
                let (control_tx, control_rx) = mpsc::unbounded_channel();
                self.controls.insert(spec.id, control_tx);

                {
                    let mut log = self.log.lock().unwrap();
                    log.spawned.push(spec.clone());
                    log.running += 1;
                    log.peak_running = log.peak_running.max(log.running);
                }

                tokio::spawn(simulate(
                    spec.id,
                    behaviour,
                    self.runtime_tx.clone(),
                    control_rx,
                    Arc::clone(&self.log),
                ));
            }
            Ok(())
        })
    }

    fn interrupt(&mut self, id: WorkerId) -> Result<()> {
        self.signal(id, WorkerSignal::Interrupt);
        Ok(())
    }

    fn kill(&mut self, id: WorkerId) -> Result<()> {
        self.signal(id, WorkerSignal::Kill);
        Ok(())
    }
}

async fn simulate(
    id: WorkerId,
    behaviour: Behaviour,
    tx: mpsc::Sender<RuntimeEvent>,
    mut control_rx: mpsc::UnboundedReceiver<WorkerSignal>,
    log: Arc<Mutex<BackendLog>>,
) {
    let _ = tx
        .send(RuntimeEvent::WorkerStarted {
            id,
            pid: Some(10_000 + id as u32),
        })
        .await;

    let outcome = match behaviour {
        Behaviour::Exit(outcome, delay) => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => outcome,
                signal = control_rx.recv() => match signal {
                    Some(WorkerSignal::Kill) => TaskOutcome::Failed(-1),
                    _ => TaskOutcome::Failed(130),
                },
            }
        }
        Behaviour::UntilInterrupted => match control_rx.recv().await {
            Some(WorkerSignal::Kill) => TaskOutcome::Failed(-1),
            _ => TaskOutcome::Failed(130),
        },
        Behaviour::IgnoresInterrupt => loop {
            match control_rx.recv().await {
                Some(WorkerSignal::Interrupt) => continue,
                Some(WorkerSignal::Kill) | None => break TaskOutcome::Failed(-1),
            }
        },
    };

    log.lock().unwrap().running -= 1;
    let _ = tx.send(RuntimeEvent::WorkerExited { id, outcome }).await;
}
