//! Shared State Store
//!
//! Owns every piece of mutable broker state behind `DashMap`s and atomics, so callers
//! never take an external lock and never hold one across a network call.

use super::types::*;

use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Task ids are handed out strictly above this value.
pub const TASK_ID_FLOOR: TaskId = 1000;

pub struct StateStore {
    /// Registered workers. Structure: `address:port -> WorkerRecord`.
    workers: DashMap<WorkerKey, WorkerRecord>,

    /// Pending sub-task keys per worker, used only to derive load.
    assignments: DashMap<WorkerKey, HashSet<String>>,

    /// Every task accepted since startup.
    tasks: DashMap<TaskId, Arc<TaskState>>,

    /// Connections currently held by the progress broadcast engine.
    progress_channels: DashMap<u64, SocketAddr>,

    task_ids: AtomicU64,
    registration_seq: AtomicU64,
}

impl StateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------

    /// Upserts a worker. Re-registration keeps the original snapshot position.
    pub fn register_worker(&self, address: &str, port: u16) {
        let key = WorkerKey::new(address, port);
        let seq = self.registration_seq.fetch_add(1, Ordering::SeqCst);

        self.workers
            .entry(key.clone())
            .and_modify(|worker| {
                worker.address = address.to_string();
                worker.tcp_port = port;
            })
            .or_insert_with(|| WorkerRecord {
                address: address.to_string(),
                tcp_port: port,
                registered_seq: seq,
            });

        tracing::info!("Worker registered: {}", key);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Snapshot of all workers in first-registration order.
    pub fn list_workers(&self) -> Vec<WorkerRecord> {
        let mut workers: Vec<WorkerRecord> = self
            .workers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        workers.sort_by_key(|worker| worker.registered_seq);
        workers
    }

    pub fn pending_subtasks(&self, worker: &WorkerKey) -> usize {
        self.assignments
            .get(worker)
            .map(|pending| pending.len())
            .unwrap_or(0)
    }

    pub fn worker_status(&self, worker: &WorkerKey) -> Option<WorkerStatus> {
        if !self.workers.contains_key(worker) {
            return None;
        }
        Some(WorkerStatus::from_pending(self.pending_subtasks(worker)))
    }

    pub fn worker_statistics(&self) -> BTreeMap<String, WorkerStats> {
        self.list_workers()
            .into_iter()
            .map(|worker| {
                let key = worker.key();
                let pending = self.pending_subtasks(&key);
                (
                    key.0,
                    WorkerStats {
                        address: worker.address,
                        tcp_port: worker.tcp_port,
                        status: WorkerStatus::from_pending(pending),
                        pending_sub_tasks: pending,
                    },
                )
            })
            .collect()
    }

    // ------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------

    /// Marks a sub-task as pending on a worker. Unknown workers are ignored.
    pub fn assign_subtask(&self, worker: &WorkerKey, task_id: TaskId, subtask_id: SubtaskId) {
        if !self.workers.contains_key(worker) {
            tracing::debug!("Ignoring assignment for unknown worker {}", worker);
            return;
        }

        let key = subtask_key(task_id, subtask_id);
        self.assignments
            .entry(worker.clone())
            .or_default()
            .insert(key.clone());

        tracing::debug!("Assigned sub-task {} to worker {}", key, worker);
    }

    /// Removes a pending sub-task. Returns whether anything was removed.
    pub fn complete_subtask_for_worker(
        &self,
        worker: &WorkerKey,
        task_id: TaskId,
        subtask_id: SubtaskId,
    ) -> bool {
        let key = subtask_key(task_id, subtask_id);
        let removed = self
            .assignments
            .get_mut(worker)
            .map(|mut pending| pending.remove(&key))
            .unwrap_or(false);

        if removed {
            tracing::debug!("Removed completed sub-task {} from worker {}", key, worker);
        }
        removed
    }

    // ------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------

    /// Creates a task with `min(requested, max(1, workers))` sub-tasks and returns its id.
    pub fn create_task(&self, name: &str, data: &str, requested_subtasks: usize) -> TaskId {
        let task_id = self.task_ids.fetch_add(1, Ordering::SeqCst) + 1;

        let capacity = self.worker_count().max(1);
        let total = requested_subtasks.min(capacity);
        if total < requested_subtasks {
            tracing::info!(
                "Requested {} sub-tasks but only {} worker(s) available, using {}",
                requested_subtasks,
                capacity,
                total
            );
        }

        self.tasks.insert(
            task_id,
            Arc::new(TaskState::new(name.to_string(), data.to_string(), total)),
        );

        tracing::info!(
            "Task '{}' created with id {} ({} sub-tasks)",
            name,
            task_id,
            total
        );

        task_id
    }

    pub fn task(&self, task_id: TaskId) -> Option<Arc<TaskState>> {
        self.tasks.get(&task_id).map(|entry| entry.value().clone())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Records a sub-task result. Results for unknown task ids are dropped.
    pub fn submit_subtask_result(&self, task_id: TaskId, subtask_id: SubtaskId, result: &str) {
        match self.task(task_id) {
            Some(task) => {
                if !task.record_result(subtask_id, result.to_string()) {
                    tracing::warn!(
                        "Repeated result for sub-task {}, counted again",
                        subtask_key(task_id, subtask_id)
                    );
                }
                tracing::info!(
                    "Sub-task {} completed ({})",
                    subtask_key(task_id, subtask_id),
                    task.progress()
                );
            }
            None => {
                tracing::warn!("Dropping result for unknown task {}", task_id);
            }
        }
    }

    pub fn task_progress(&self, task_id: TaskId) -> String {
        match self.task(task_id) {
            Some(task) => task.progress(),
            None => NO_ACTIVE_TASK.to_string(),
        }
    }

    pub fn task_overview(&self) -> TaskOverview {
        let mut tasks: Vec<(TaskId, Arc<TaskState>)> = self
            .tasks
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        tasks.sort_by_key(|(task_id, _)| *task_id);

        let mut overview = TaskOverview::default();
        for (task_id, task) in tasks {
            let completed = task.completed();
            let phase = if task.is_complete() {
                TaskPhase::Completed
            } else {
                TaskPhase::Pending
            };
            let info = TaskInfo {
                task_id,
                task_name: task.name.clone(),
                completed_sub_tasks: completed,
                total_sub_tasks: task.total_subtasks,
                status: phase,
            };
            match phase {
                TaskPhase::Completed => overview.completed_tasks.push(info),
                TaskPhase::Pending => overview.pending_tasks.push(info),
            }
        }
        overview.total_pending = overview.pending_tasks.len();
        overview.total_completed = overview.completed_tasks.len();
        overview
    }

    // ------------------------------------------------------------
    // Progress channels
    // ------------------------------------------------------------

    pub fn register_progress_channel(&self, channel_id: u64, peer: SocketAddr) {
        self.progress_channels.insert(channel_id, peer);
        tracing::debug!("Progress channel {} registered for {}", channel_id, peer);
    }

    pub fn unregister_progress_channel(&self, channel_id: u64) {
        if let Some((_, peer)) = self.progress_channels.remove(&channel_id) {
            tracing::debug!("Progress channel {} ({}) removed", channel_id, peer);
        }
    }

    pub fn progress_channel_count(&self) -> usize {
        self.progress_channels.len()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self {
            workers: DashMap::new(),
            assignments: DashMap::new(),
            tasks: DashMap::new(),
            progress_channels: DashMap::new(),
            task_ids: AtomicU64::new(TASK_ID_FLOOR),
            registration_seq: AtomicU64::new(0),
        }
    }
}
