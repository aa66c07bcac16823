//! Broker Assembly
//!
//! Wires the five engines around one `StateStore`: a single `WorkerPool` is shared by
//! submission handling and dispatch, and a single `CurrentTask` cell links the dispatch
//! engine to the progress broadcaster.

use crate::config::BrokerConfig;
use crate::dispatch::engine::DispatchEngine;
use crate::dispatch::pool::WorkerPool;
use crate::multicast::multicaster::ConfigMulticaster;
use crate::progress::engine::{CurrentTask, ProgressBroadcaster};
use crate::registration::listener::RegistrationListener;
use crate::state::handlers::router;
use crate::state::store::StateStore;
use crate::submission::listener::SubmissionListener;

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct Broker {
    pub store: Arc<StateStore>,
    pub current_task: CurrentTask,
    pub submission_addr: SocketAddr,
    pub registration_addr: SocketAddr,
    pub progress_addr: SocketAddr,
    pool: WorkerPool,
    engine: Arc<DispatchEngine>,
    handles: Vec<JoinHandle<()>>,
}

impl Broker {
    /// Binds every socket and spawns every loop. Bind failures are returned; nothing
    /// after startup is fatal.
    pub async fn start(config: &BrokerConfig) -> Result<Self> {
        let store = StateStore::new();
        let current_task = CurrentTask::new();
        let pool = WorkerPool::new(config.pool_size);

        let multicaster = ConfigMulticaster::new(config.multicast_target(), config.multicast_ttl);
        let multicast_target = multicaster.target();

        let engine = Arc::new(
            DispatchEngine::new(
                store.clone(),
                pool.clone(),
                multicaster,
                current_task.clone(),
            )
            .with_dispatch_timeout(config.dispatch_timeout())
            .with_config_grace(config.config_grace()),
        );

        let submission =
            SubmissionListener::bind(config.submission_addr, store.clone(), engine.clone())
                .await
                .with_context(|| {
                    format!("binding submission listener on {}", config.submission_addr)
                })?;
        let registration = RegistrationListener::bind(config.registration_addr, store.clone())
            .await
            .with_context(|| {
                format!("binding registration listener on {}", config.registration_addr)
            })?;
        let progress =
            ProgressBroadcaster::bind(config.progress_addr, store.clone(), current_task.clone())
                .await
                .with_context(|| format!("binding progress listener on {}", config.progress_addr))?;

        let submission_addr = submission.local_addr()?;
        let registration_addr = registration.local_addr()?;
        let progress_addr = progress.local_addr()?;

        let handles = vec![submission.start(), registration.start(), progress.start()];

        tracing::info!("Broker started");
        tracing::info!("  Task submission (TCP): {}", submission_addr);
        tracing::info!("  Worker registration (UDP): {}", registration_addr);
        tracing::info!("  Progress broadcast (TCP): {}", progress_addr);
        tracing::info!("  Task config multicast: {}", multicast_target);

        Ok(Self {
            store,
            current_task,
            submission_addr,
            registration_addr,
            progress_addr,
            pool,
            engine,
            handles,
        })
    }

    /// Status, completion and submission API over this broker's store.
    pub fn router(&self) -> Router {
        router(self.store.clone(), self.engine.clone())
    }

    /// Stops every loop. Jobs already holding a pool slot run to completion.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        for handle in &self.handles {
            handle.abort();
        }
        tracing::info!("Broker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::protocol::REPLY_REGISTERED;
    use crate::submission::protocol::parse_accepted;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream, UdpSocket};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn test_config() -> BrokerConfig {
        let mut config = BrokerConfig::local_ephemeral();
        config.multicast_group = std::net::Ipv4Addr::LOCALHOST;
        config.multicast_port = 9;
        config.config_grace_ms = 10;
        config.dispatch_timeout_ms = 1000;
        config
    }

    async fn worker_endpoint() -> (u16, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let (reader, mut writer) = stream.into_split();
                    let mut line = String::new();
                    let mut reader = BufReader::new(reader);
                    if reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                        let _ = tx.send(line.trim_end().to_string());
                        let _ = writer.write_all(b"ACK:RECEIVED\n").await;
                    }
                });
            }
        });

        (port, rx)
    }

    async fn register(broker: &Broker, tcp_port: u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(format!("REGISTER:{}", tcp_port).as_bytes(), broker.registration_addr)
            .await
            .unwrap();
        let mut buf = [0u8; 32];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("registration reply")
            .unwrap();
        assert_eq!(&buf[..len], REPLY_REGISTERED.as_bytes());
    }

    #[tokio::test]
    async fn test_end_to_end_submit_dispatch_report() {
        let broker = Broker::start(&test_config()).await.unwrap();
        let (port, mut dispatched) = worker_endpoint().await;
        register(&broker, port).await;

        // Worker joins the progress channel before the task exists
        let progress = TcpStream::connect(broker.progress_addr).await.unwrap();
        let (progress_read, mut progress_write) = progress.into_split();

        let mut originator = TcpStream::connect(broker.submission_addr).await.unwrap();
        originator
            .write_all(b"Name:E2E | Data:payload | SubTasks:1\n")
            .await
            .unwrap();
        let mut reply = String::new();
        BufReader::new(&mut originator)
            .read_line(&mut reply)
            .await
            .unwrap();
        let task_id = parse_accepted(&reply).unwrap();

        let line = tokio::time::timeout(Duration::from_secs(3), dispatched.recv())
            .await
            .expect("dispatch in time")
            .unwrap();
        assert!(line.starts_with(&format!("TASK:{}:SUBTASK:1:", task_id)));

        progress_write
            .write_all(format!("RESULT:{}:1:done\n", task_id).as_bytes())
            .await
            .unwrap();

        // A later broadcast reports the finished task
        let mut lines = BufReader::new(progress_read).lines();
        let expected = format!("PROGRESS:{}:100% (1/1)", task_id);
        let seen = tokio::time::timeout(Duration::from_secs(8), async {
            while let Ok(Some(line)) = lines.next_line().await {
                if line == expected {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(seen);

        broker.shutdown();
    }

    #[tokio::test]
    async fn test_http_completion_clears_pending_assignment() {
        let broker = Broker::start(&test_config()).await.unwrap();
        let (port, mut dispatched) = worker_endpoint().await;
        register(&broker, port).await;

        let mut originator = TcpStream::connect(broker.submission_addr).await.unwrap();
        originator.write_all(b"Name:H | Data:d\n").await.unwrap();
        let mut reply = String::new();
        BufReader::new(&mut originator)
            .read_line(&mut reply)
            .await
            .unwrap();
        let task_id = parse_accepted(&reply).unwrap();
        tokio::time::timeout(Duration::from_secs(3), dispatched.recv())
            .await
            .expect("dispatch in time");

        let body = serde_json::json!({
            "workerAddress": "127.0.0.1",
            "workerPort": port,
            "taskId": task_id,
            "subTaskId": 1,
        });
        let response = broker
            .router()
            .oneshot(
                Request::post("/api/worker-complete")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(broker.store.task_progress(task_id), "100% (1/1)");
        let key = crate::state::types::WorkerKey::new("127.0.0.1", port);
        assert_eq!(broker.store.pending_subtasks(&key), 0);

        broker.shutdown();
    }
}
