// src/engine/state.rs

//! Per-run state and the worker pool controller.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use tracing::debug;

use crate::engine::outcome::{Completion, CompletedTask};
use crate::engine::report::ReportEvent;
use crate::engine::{RunPhase, WorkerId};
use crate::exec::{WorkerSpec, WorkerTemplate};
use crate::tasks::{TaskEntry, TaskId, TaskQueue, TaskSpec};
use crate::types::FailurePolicy;

/// Pool size and failure policy for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreOptions {
    pub capacity: usize,
    pub policy: FailurePolicy,
}

/// A dispatched worker that has not been reaped yet.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub task: TaskSpec,
    /// Known once the backend reports `WorkerStarted`.
    pub pid: Option<u32>,
    pub started_at: Instant,
    pub output_dir: PathBuf,
}

/// Run state, owned exclusively by one [`CoreRuntime`](super::CoreRuntime).
///
/// Every task is in exactly one of: `queue`, `live`, `completed`. Tasks
/// still queued when a run stops dispatching stay in `queue` and end up in
/// the rerun hint.
#[derive(Debug)]
pub struct RunState {
    pub(crate) queue: TaskQueue,
    /// Keyed by isolation index, so iteration follows dispatch order.
    pub(crate) live: BTreeMap<WorkerId, WorkerRecord>,
    pub(crate) completed: Vec<CompletedTask>,
    pub(crate) options: CoreOptions,
    pub(crate) template: WorkerTemplate,
    pub(crate) phase: RunPhase,
    pub(crate) failed: bool,
    /// `(isolation index, task id)` of every recorded failure.
    pub(crate) failed_tasks: Vec<(WorkerId, TaskId)>,
    /// Hint captured when dispatching stopped early.
    pub(crate) stop_hint: Option<Vec<TaskId>>,
    last_index: WorkerId,
    peak_live: usize,
}

impl RunState {
    pub fn new(tasks: Vec<TaskEntry>, options: CoreOptions, template: WorkerTemplate) -> Self {
        let capacity = options.capacity.max(1);
        Self {
            queue: tasks.into_iter().collect(),
            live: BTreeMap::new(),
            completed: Vec::new(),
            options: CoreOptions { capacity, ..options },
            template,
            phase: RunPhase::Running,
            failed: false,
            failed_tasks: Vec::new(),
            stop_hint: None,
            last_index: 0,
            peak_live: 0,
        }
    }

    /// Pool controller: dispatch queued tasks into free slots.
    ///
    /// No-op when the queue is empty, the pool is full, or the run has
    /// stopped dispatching. Returns the workers to start plus one
    /// `Dispatched` report per worker.
    pub fn fill(&mut self) -> (Vec<WorkerSpec>, Vec<ReportEvent>) {
        let mut workers = Vec::new();
        let mut reports = Vec::new();

        if !self.phase.dispatches() {
            return (workers, reports);
        }

        while self.live.len() < self.options.capacity {
            let Some(task) = self.queue.dequeue() else {
                break;
            };

            self.last_index += 1;
            let spec = self.template.worker_spec(task, self.last_index);

            self.live.insert(
                spec.id,
                WorkerRecord {
                    id: spec.id,
                    task: spec.task.clone(),
                    pid: None,
                    started_at: Instant::now(),
                    output_dir: spec.output_dir.clone(),
                },
            );
            self.peak_live = self.peak_live.max(self.live.len());

            debug!(worker = spec.id, task = %spec.task.id, "dispatching worker");
            reports.push(ReportEvent::Dispatched {
                worker: spec.id,
                task: spec.task.display_name.clone(),
                output_dir: spec.output_dir.clone(),
                remaining: self.queue.len(),
            });
            workers.push(spec);
        }

        (workers, reports)
    }

    /// Remove a worker from the live set and account for it.
    pub(crate) fn retire(&mut self, id: WorkerId, completion: Completion) -> Option<WorkerRecord> {
        let record = self.live.remove(&id)?;
        self.completed.push(CompletedTask {
            worker: id,
            task: record.task.clone(),
            output_dir: record.output_dir.clone(),
            completion,
        });
        Some(record)
    }

    /// Identifiers of live workers' tasks, in dispatch order.
    pub(crate) fn live_task_ids(&self) -> Vec<TaskId> {
        self.live.values().map(|r| r.task.id.clone()).collect()
    }

    pub(crate) fn live_display_names(&self) -> Vec<String> {
        self.live.values().map(|r| r.task.display_name.clone()).collect()
    }

    /// Failed task ids ordered by isolation index, independent of the order
    /// in which exits were observed.
    pub(crate) fn sorted_failed_ids(&self) -> Vec<TaskId> {
        let mut failed = self.failed_tasks.clone();
        failed.sort_by_key(|(index, _)| *index);
        failed.into_iter().map(|(_, id)| id).collect()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_ids(&self) -> Vec<WorkerId> {
        self.live.keys().copied().collect()
    }

    pub fn live_worker(&self, id: WorkerId) -> Option<&WorkerRecord> {
        self.live.get(&id)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Highest number of simultaneously live workers seen so far.
    pub fn peak_live(&self) -> usize {
        self.peak_live
    }

    /// Number of workers dispatched so far (= highest isolation index).
    pub fn dispatched(&self) -> u64 {
        self.last_index
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn completed(&self) -> &[CompletedTask] {
        &self.completed
    }

    /// Queue drained (or abandoned) and nothing live.
    pub fn is_done(&self) -> bool {
        self.live.is_empty() && (self.queue.is_empty() || !self.phase.dispatches())
    }
}
