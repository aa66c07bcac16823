use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

pub type TaskId = u64;
pub type SubtaskId = u32;

/// Returned by progress queries for a task id the store has never seen.
pub const NO_ACTIVE_TASK: &str = "No active task";

/// Unique worker identity, formatted as `address:port`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerKey(pub String);

impl WorkerKey {
    pub fn new(address: &str, port: u16) -> Self {
        Self(format!("{}:{}", address, port))
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Load-derived lifecycle of a worker. Never stored, only computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkerStatus {
    Idle,
    Active,
    Busy,
}

impl WorkerStatus {
    pub fn from_pending(pending: usize) -> Self {
        match pending {
            0 => WorkerStatus::Idle,
            1 => WorkerStatus::Active,
            _ => WorkerStatus::Busy,
        }
    }
}

/// A worker that announced itself on the registration socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub address: String,
    pub tcp_port: u16,

    /// Position in first-registration order; used to keep snapshots stable.
    #[serde(skip)]
    pub registered_seq: u64,
}

impl WorkerRecord {
    pub fn key(&self) -> WorkerKey {
        WorkerKey::new(&self.address, self.tcp_port)
    }
}

/// Key of one pending assignment in a worker's set.
pub fn subtask_key(task_id: TaskId, subtask_id: SubtaskId) -> String {
    format!("{}-{}", task_id, subtask_id)
}

/// `"<percent>% (<completed>/<total>)"`, integer percent, `0%` when total is zero.
pub fn format_progress(completed: usize, total: usize) -> String {
    let percent = if total > 0 { completed * 100 / total } else { 0 };
    format!("{}% ({}/{})", percent, completed, total)
}

/// Mutable state of one submitted task.
///
/// `completed` and `results` are written by the progress engine and the HTTP
/// completion endpoint concurrently, so both are lock-free.
#[derive(Debug)]
pub struct TaskState {
    pub name: String,
    pub data: String,
    pub total_subtasks: usize,
    completed: AtomicUsize,
    results: DashMap<SubtaskId, String>,
}

impl TaskState {
    pub fn new(name: String, data: String, total_subtasks: usize) -> Self {
        Self {
            name,
            data,
            total_subtasks,
            completed: AtomicUsize::new(0),
            results: DashMap::new(),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.total_subtasks
    }

    /// Records a result and counts it towards completion, repeats included.
    /// Returns `false` when an earlier result for the same sub-task was overwritten.
    pub fn record_result(&self, subtask_id: SubtaskId, result: String) -> bool {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.results.insert(subtask_id, result).is_none()
    }

    pub fn result(&self, subtask_id: SubtaskId) -> Option<String> {
        self.results.get(&subtask_id).map(|r| r.value().clone())
    }

    pub fn results(&self) -> BTreeMap<SubtaskId, String> {
        self.results
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn progress(&self) -> String {
        format_progress(self.completed(), self.total_subtasks)
    }
}

/// Per-worker load snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub address: String,
    pub tcp_port: u16,
    pub status: WorkerStatus,
    pub pending_sub_tasks: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPhase {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub task_name: String,
    pub completed_sub_tasks: usize,
    pub total_sub_tasks: usize,
    pub status: TaskPhase,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskOverview {
    pub pending_tasks: Vec<TaskInfo>,
    pub completed_tasks: Vec<TaskInfo>,
    pub total_pending: usize,
    pub total_completed: usize,
}
