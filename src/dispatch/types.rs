use crate::state::types::{SubtaskId, TaskId, WorkerKey};

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// One sub-task bound to the worker chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtaskAssignment {
    pub task_id: TaskId,
    pub subtask_id: SubtaskId,
    pub worker: WorkerKey,
    pub address: String,
    pub port: u16,
    pub partition: String,
}

/// Why a single sub-task dispatch failed. Terminal; nothing retries.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("connect to {worker} failed: {source}")]
    Connect {
        worker: WorkerKey,
        #[source]
        source: io::Error,
    },

    #[error("i/o with {worker} failed: {source}")]
    Io {
        worker: WorkerKey,
        #[source]
        source: io::Error,
    },

    #[error("{worker} did not answer within {timeout:?}")]
    Timeout { worker: WorkerKey, timeout: Duration },

    #[error("{worker} closed the connection without acknowledging")]
    NoResponse { worker: WorkerKey },

    #[error("{worker} rejected the sub-task: {response}")]
    Rejected { worker: WorkerKey, response: String },

    #[error("dispatch job for {worker} never ran")]
    Aborted { worker: WorkerKey },
}

/// Why a whole task could not be dispatched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error("no workers registered, task {task_id} cannot be dispatched")]
    NoWorkers { task_id: TaskId },
}

/// Handle to a submitted dispatch job.
#[derive(Debug)]
pub struct DispatchTicket {
    pub assignment: SubtaskAssignment,
    pub(crate) handle: JoinHandle<Option<Result<String, DispatchError>>>,
}

impl DispatchTicket {
    /// Waits for the job and returns the worker's acknowledgment line.
    pub async fn wait(self) -> Result<String, DispatchError> {
        match self.handle.await {
            Ok(Some(outcome)) => outcome,
            Ok(None) | Err(_) => Err(DispatchError::Aborted {
                worker: self.assignment.worker,
            }),
        }
    }
}
