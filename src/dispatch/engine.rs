use super::pool::WorkerPool;
use super::protocol::{encode_subtask, is_ack, partition_payload};
use super::types::*;
use crate::multicast::multicaster::ConfigMulticaster;
use crate::progress::engine::CurrentTask;
use crate::state::store::StateStore;
use crate::state::types::{SubtaskId, TaskId, WorkerRecord};

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONFIG_GRACE: Duration = Duration::from_millis(100);

/// Picks worker `i mod len` for each of `count` sub-tasks.
pub fn round_robin_targets(workers: &[WorkerRecord], count: usize) -> Vec<WorkerRecord> {
    if workers.is_empty() {
        return Vec::new();
    }

    (0..count)
        .map(|i| workers[i % workers.len()].clone())
        .collect()
}

pub struct DispatchEngine {
    store: Arc<StateStore>,
    pool: WorkerPool,
    multicaster: ConfigMulticaster,
    current_task: CurrentTask,
    dispatch_timeout: Duration,
    config_grace: Duration,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<StateStore>,
        pool: WorkerPool,
        multicaster: ConfigMulticaster,
        current_task: CurrentTask,
    ) -> Self {
        Self {
            store,
            pool,
            multicaster,
            current_task,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            config_grace: DEFAULT_CONFIG_GRACE,
        }
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn with_config_grace(mut self, grace: Duration) -> Self {
        self.config_grace = grace;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Splits a task and submits one dispatch job per sub-task.
    ///
    /// Returns as soon as every job is queued; the tickets only matter to callers that
    /// want to observe individual outcomes.
    pub async fn process_task(
        &self,
        task_id: TaskId,
        name: &str,
        data: &str,
        requested_subtasks: usize,
    ) -> Result<Vec<DispatchTicket>, ProcessError> {
        self.current_task.set(task_id);

        let workers = self.store.list_workers();
        if workers.is_empty() {
            tracing::error!("No workers registered, cannot process task {}", task_id);
            return Err(ProcessError::NoWorkers { task_id });
        }

        let effective = requested_subtasks.min(workers.len());
        if effective < requested_subtasks {
            tracing::warn!(
                "Requested {} sub-tasks but only {} workers available, using {}",
                requested_subtasks,
                workers.len(),
                effective
            );
        }

        let partitions = partition_payload(data, effective);
        tracing::info!(
            "Processing task {} '{}': {} sub-task(s) over {} worker(s)",
            task_id,
            name,
            effective,
            workers.len()
        );

        if self
            .multicaster
            .broadcast(task_id, name, effective, data, &partitions)
            .await
        {
            tokio::time::sleep(self.config_grace).await;
        } else {
            tracing::warn!("Config broadcast failed, dispatching task {} anyway", task_id);
        }

        let targets = round_robin_targets(&workers, partitions.len());
        let mut tickets = Vec::with_capacity(partitions.len());

        for (index, (partition, worker)) in partitions.into_iter().zip(targets).enumerate() {
            let assignment = SubtaskAssignment {
                task_id,
                subtask_id: (index + 1) as SubtaskId,
                worker: worker.key(),
                address: worker.address,
                port: worker.tcp_port,
                partition,
            };

            self.store
                .assign_subtask(&assignment.worker, task_id, assignment.subtask_id);

            let job = run_dispatch_job(assignment.clone(), self.dispatch_timeout);
            let handle = self.pool.submit(job);

            tracing::debug!(
                "Queued sub-task {} of task {} for {}",
                assignment.subtask_id,
                task_id,
                assignment.worker
            );
            tickets.push(DispatchTicket { assignment, handle });
        }

        tracing::info!("All {} sub-tasks of task {} submitted", tickets.len(), task_id);

        Ok(tickets)
    }
}

async fn run_dispatch_job(
    assignment: SubtaskAssignment,
    timeout: Duration,
) -> Result<String, DispatchError> {
    let outcome = dispatch_subtask(&assignment, timeout).await;

    match &outcome {
        Ok(ack) => tracing::info!(
            "Sub-task {} of task {} acknowledged by {}: {}",
            assignment.subtask_id,
            assignment.task_id,
            assignment.worker,
            ack
        ),
        Err(e) => tracing::warn!(
            "Dispatch of sub-task {} of task {} failed: {}",
            assignment.subtask_id,
            assignment.task_id,
            e
        ),
    }

    outcome
}

/// One connection, one `TASK` line out, one acknowledgment line back.
pub async fn dispatch_subtask(
    assignment: &SubtaskAssignment,
    timeout: Duration,
) -> Result<String, DispatchError> {
    let worker = assignment.worker.clone();

    let stream = match tokio::time::timeout(
        timeout,
        TcpStream::connect((assignment.address.as_str(), assignment.port)),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(DispatchError::Connect { worker, source }),
        Err(_) => return Err(DispatchError::Timeout { worker, timeout }),
    };

    let (reader, mut writer) = stream.into_split();
    let message = encode_subtask(
        assignment.task_id,
        assignment.subtask_id,
        &assignment.partition,
    );

    if let Err(source) = writer.write_all(message.as_bytes()).await {
        return Err(DispatchError::Io { worker, source });
    }

    let mut response = String::new();
    let mut reader = BufReader::new(reader);
    let read = match tokio::time::timeout(timeout, reader.read_line(&mut response)).await {
        Ok(Ok(read)) => read,
        Ok(Err(source)) => return Err(DispatchError::Io { worker, source }),
        Err(_) => return Err(DispatchError::Timeout { worker, timeout }),
    };

    if read == 0 {
        return Err(DispatchError::NoResponse { worker });
    }

    let response = response.trim_end().to_string();
    if is_ack(&response) {
        Ok(response)
    } else {
        Err(DispatchError::Rejected { worker, response })
    }
}
