// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::outcome::RunReport;
use crate::engine::report::Reporter;
use crate::engine::shutdown::{escalate, EscalationSummary};
use crate::errors::{ForkrunError, Result};
use crate::exec::WorkerBackend;
use crate::fs::FileSystem;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RuntimeEvent, RuntimeOptions};

/// Drives a [`CoreRuntime`] in response to `RuntimeEvent`s and delegates
/// process handling to a `WorkerBackend`.
///
/// This is the completion monitor: it suspends only while waiting for the
/// next event and during the escalation grace period.
pub struct Runtime<B: WorkerBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    backend: B,
    fs: Box<dyn FileSystem>,
    options: RuntimeOptions,
    reporter: Reporter,
    escalations: Vec<EscalationSummary>,
}

impl<B: WorkerBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<B: WorkerBackend> Runtime<B> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        backend: B,
        fs: Box<dyn FileSystem>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            core,
            event_rx,
            backend,
            fs,
            options,
            reporter: Reporter::new(),
            escalations: Vec::new(),
        }
    }

    pub fn core(&self) -> &CoreRuntime {
        &self.core
    }

    /// Every escalation pass that actually had workers to stop.
    pub fn escalations(&self) -> &[EscalationSummary] {
        &self.escalations
    }

    /// Run to completion and return the verdict.
    ///
    /// The output root is reset before anything is dispatched. Escalation
    /// runs on every way out of the event loop, including errors, so no
    /// worker survives the returned future. Use [`run_to_end`](Self::run_to_end)
    /// to keep the runtime around for inspection.
    pub async fn run(mut self) -> Result<RunReport> {
        self.run_to_end().await
    }

    /// Like [`run`](Self::run), but borrowing.
    pub async fn run_to_end(&mut self) -> Result<RunReport> {
        let root = self.core.template().output_root.clone();
        self.fs.reset_dir(&root)?;

        self.reporter.restart();
        let options = self.core.options();
        self.reporter
            .run_started(options.capacity, options.policy, self.core.state().queued(), &root);

        let driven = self.drive().await;

        // Guaranteed cleanup: a no-op unless the loop was left with workers
        // still live.
        self.escalate().await;

        driven?;

        let verdict = self.core.finish();
        self.reporter.run_finished(verdict.is_err());

        match verdict {
            Ok(()) => {
                let mut completed = self.core.state().completed().to_vec();
                completed.sort_by_key(|c| c.worker);
                info!(tasks = completed.len(), "run completed successfully");
                Ok(RunReport {
                    completed,
                    elapsed: self.reporter.elapsed(),
                })
            }
            Err(failure) => {
                if let crate::engine::RunFailure::AggregatedFailure { rerun, .. } = &failure {
                    self.reporter.rerun_failed(rerun);
                }
                Err(ForkrunError::Run(failure))
            }
        }
    }

    /// Main event loop.
    async fn drive(&mut self) -> Result<()> {
        let step = self.core.start();
        self.execute(step).await?;

        while !self.core.is_done() {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    warn!("runtime event channel closed with workers outstanding");
                    break;
                }
            };

            debug!(?event, "runtime received event");
            let step = self.core.step(event);
            self.execute(step).await?;
        }

        Ok(())
    }

    async fn execute(&mut self, step: CoreStep) -> Result<()> {
        for command in step.commands {
            match command {
                CoreCommand::Dispatch(workers) => {
                    let ids: Vec<_> = workers.iter().map(|w| w.id).collect();
                    debug!(?ids, "spawning workers");
                    self.backend.spawn_workers(workers).await?;
                }
                CoreCommand::Report(event) => self.reporter.report(&event),
                CoreCommand::Escalate => self.escalate().await,
            }
        }
        Ok(())
    }

    async fn escalate(&mut self) {
        let summary = escalate(
            &mut self.core,
            &mut self.backend,
            &mut self.event_rx,
            &self.reporter,
            self.options.grace_period,
        )
        .await;

        if !summary.is_noop() {
            self.escalations.push(summary);
        }
    }
}
