//! HTTP Protocol Definitions
//!
//! Request/response bodies for the JSON status surface and the worker completion
//! endpoint. Field names are camelCase on the wire.

use super::types::{SubtaskId, TaskId, WorkerStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ENDPOINT_WORKERS: &str = "/api/workers";
pub const ENDPOINT_WORKER_STATS: &str = "/api/worker-stats";
pub const ENDPOINT_TASK_OVERVIEW: &str = "/api/task-overview";
pub const ENDPOINT_TASK_PROGRESS: &str = "/api/tasks/:id/progress";
pub const ENDPOINT_WORKER_COMPLETE: &str = "/api/worker-complete";
pub const ENDPOINT_SUBMIT_TASK: &str = "/api/submit-task";

/// Result stored when a worker reports completion without a payload.
pub const DEFAULT_RESULT: &str = "Completed";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCompleteRequest {
    pub worker_address: String,
    pub worker_port: u16,
    pub task_id: TaskId,
    pub sub_task_id: SubtaskId,
    pub result: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerCompleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgressResponse {
    pub task_id: TaskId,
    pub progress: String,
    /// Recorded results keyed by sub-task id.
    pub results: BTreeMap<SubtaskId, String>,
}

/// A JSON field that clients send either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(i64),
    Text(String),
}

impl Scalar {
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskRequest {
    /// Client-side reference, echoed back as `originalTaskId`.
    pub task_id: Option<Scalar>,
    pub task_name: Option<String>,
    pub task_data: Option<String>,
    pub sub_task_count: Option<Scalar>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_task_count: Option<usize>,
}

impl SubmitTaskResponse {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            task_id: None,
            original_task_id: None,
            task_name: None,
            sub_task_count: None,
        }
    }
}

/// Entry of `GET /api/workers`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDetails {
    pub address: String,
    pub tcp_port: u16,
    pub status: WorkerStatus,
}
