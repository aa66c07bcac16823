use super::protocol::{SubmissionRequest, encode_accepted};
use crate::dispatch::engine::DispatchEngine;
use crate::state::store::StateStore;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Longest metadata line read from an originator.
const MAX_SUBMISSION_LINE: u64 = 1024 * 1024;

pub struct SubmissionListener {
    listener: TcpListener,
    store: Arc<StateStore>,
    engine: Arc<DispatchEngine>,
}

impl SubmissionListener {
    pub async fn bind(
        bind_addr: SocketAddr,
        store: Arc<StateStore>,
        engine: Arc<DispatchEngine>,
    ) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(bind_addr).await?;
        tracing::info!("Submission listener bound on {}", listener.local_addr()?);

        Ok(Arc::new(Self {
            listener,
            store,
            engine,
        }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.accept_loop().await;
        })
    }

    async fn accept_loop(self: Arc<Self>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("Originator connected: {}", peer);

                    let store = self.store.clone();
                    let engine = self.engine.clone();
                    self.engine.pool().submit(async move {
                        if let Err(e) = handle_submission(stream, peer, store, engine).await {
                            tracing::warn!("Submission from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept submission: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn handle_submission(
    stream: TcpStream,
    peer: SocketAddr,
    store: Arc<StateStore>,
    engine: Arc<DispatchEngine>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader.take(MAX_SUBMISSION_LINE));

    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        tracing::debug!("{} closed before sending a task", peer);
        return Ok(());
    }

    tracing::info!("Received task from {}: {}", peer, line.trim_end());

    let request = SubmissionRequest::parse(&line);
    let requested = request.subtasks_or(store.worker_count());
    let task_id = store.create_task(&request.name, &request.data, requested);

    writer.write_all(encode_accepted(task_id).as_bytes()).await?;
    writer.shutdown().await?;
    tracing::info!("Task '{}' accepted with id {}", request.name, task_id);

    if let Err(e) = engine
        .process_task(task_id, &request.name, &request.data, requested)
        .await
    {
        tracing::error!("Task {} not dispatched: {}", task_id, e);
    }

    Ok(())
}
