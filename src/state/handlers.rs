use super::protocol::*;
use super::store::StateStore;
use super::types::*;
use crate::dispatch::engine::DispatchEngine;

use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, extract::Path, http::StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Builds the status, completion and submission router over a shared store.
pub fn router(store: Arc<StateStore>, engine: Arc<DispatchEngine>) -> Router {
    Router::new()
        .route(ENDPOINT_WORKERS, get(handle_list_workers))
        .route(ENDPOINT_WORKER_STATS, get(handle_worker_stats))
        .route(ENDPOINT_TASK_OVERVIEW, get(handle_task_overview))
        .route(ENDPOINT_TASK_PROGRESS, get(handle_task_progress))
        .route(ENDPOINT_WORKER_COMPLETE, post(handle_worker_complete))
        .route(ENDPOINT_SUBMIT_TASK, post(handle_submit_task))
        .layer(Extension(store))
        .layer(Extension(engine))
}

/// Workers in registration order.
pub async fn handle_list_workers(
    Extension(store): Extension<Arc<StateStore>>,
) -> Json<Vec<WorkerDetails>> {
    let workers = store
        .list_workers()
        .into_iter()
        .map(|worker| {
            let status = WorkerStatus::from_pending(store.pending_subtasks(&worker.key()));
            WorkerDetails {
                address: worker.address,
                tcp_port: worker.tcp_port,
                status,
            }
        })
        .collect();

    Json(workers)
}

pub async fn handle_worker_stats(
    Extension(store): Extension<Arc<StateStore>>,
) -> Json<BTreeMap<String, WorkerStats>> {
    Json(store.worker_statistics())
}

pub async fn handle_task_overview(
    Extension(store): Extension<Arc<StateStore>>,
) -> Json<TaskOverview> {
    Json(store.task_overview())
}

pub async fn handle_task_progress(
    Extension(store): Extension<Arc<StateStore>>,
    Path(task_id): Path<TaskId>,
) -> (StatusCode, Json<TaskProgressResponse>) {
    let progress = store.task_progress(task_id);
    let (status, results) = match store.task(task_id) {
        Some(task) => (StatusCode::OK, task.results()),
        None => (StatusCode::NOT_FOUND, BTreeMap::new()),
    };

    (
        status,
        Json(TaskProgressResponse {
            task_id,
            progress,
            results,
        }),
    )
}

/// Explicit completion: records the result and clears the worker's pending entry.
pub async fn handle_worker_complete(
    Extension(store): Extension<Arc<StateStore>>,
    body: Result<Json<WorkerCompleteRequest>, JsonRejection>,
) -> (StatusCode, Json<WorkerCompleteResponse>) {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => {
            tracing::warn!("Rejected completion notification: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(WorkerCompleteResponse {
                    success: false,
                    message: format!("Invalid completion data: {}", e.body_text()),
                }),
            );
        }
    };

    let worker = WorkerKey::new(&req.worker_address, req.worker_port);
    let result = req.result.as_deref().unwrap_or(DEFAULT_RESULT);

    store.submit_subtask_result(req.task_id, req.sub_task_id, result);
    store.complete_subtask_for_worker(&worker, req.task_id, req.sub_task_id);

    tracing::info!(
        "Completion notification from {} for sub-task {}",
        worker,
        subtask_key(req.task_id, req.sub_task_id)
    );

    (
        StatusCode::OK,
        Json(WorkerCompleteResponse {
            success: true,
            message: "Sub-task completion recorded".to_string(),
        }),
    )
}

/// Validated submission. Unlike the TCP listener, this route rejects requests the
/// current worker pool cannot serve.
pub async fn handle_submit_task(
    Extension(store): Extension<Arc<StateStore>>,
    Extension(engine): Extension<Arc<DispatchEngine>>,
    body: Result<Json<SubmitTaskRequest>, JsonRejection>,
) -> (StatusCode, Json<SubmitTaskResponse>) {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => {
            tracing::warn!("Rejected task submission: {}", e);
            return bad_request(format!("Invalid task data: {}", e.body_text()));
        }
    };

    let original_task_id = req
        .task_id
        .as_ref()
        .map(Scalar::as_text)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(auto_task_reference);

    let Some(name) = req.task_name.filter(|name| !name.is_empty()) else {
        return bad_request("Task name is required");
    };
    let Some(data) = req.task_data.filter(|data| !data.is_empty()) else {
        return bad_request("Task data is required");
    };
    let Some(requested) = req.sub_task_count.as_ref().and_then(Scalar::as_int) else {
        return bad_request("Invalid sub-task count");
    };

    let workers = store.worker_count();
    if workers == 0 {
        return bad_request("No workers registered. Start workers first.");
    }
    if requested > workers as i64 {
        return bad_request(format!(
            "Sub-task count ({}) exceeds registered workers ({})",
            requested, workers
        ));
    }
    if requested < 1 {
        return bad_request("Sub-task count must be at least 1");
    }

    let requested = requested as usize;
    let task_id = store.create_task(&name, &data, requested);
    tracing::info!(
        "Task '{}' submitted over HTTP with id {} (client ref {})",
        name,
        task_id,
        original_task_id
    );

    let job_name = name.clone();
    engine.pool().submit({
        let engine = engine.clone();
        async move {
            if let Err(e) = engine
                .process_task(task_id, &job_name, &data, requested)
                .await
            {
                tracing::error!("Task {} not dispatched: {}", task_id, e);
            }
        }
    });

    (
        StatusCode::OK,
        Json(SubmitTaskResponse {
            success: true,
            message: format!("Task '{}' submitted successfully", name),
            task_id: Some(task_id),
            original_task_id: Some(original_task_id),
            task_name: Some(name),
            sub_task_count: Some(requested),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<SubmitTaskResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(SubmitTaskResponse::rejected(message)),
    )
}

fn auto_task_reference() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("AUTO_{}", millis)
}
