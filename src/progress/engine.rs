//! Readiness-Multiplexed Broadcast Loop
//!
//! `ProgressBroadcaster` owns its listener and all worker connections outright; nothing
//! else touches them, so no locking is involved. The loop body is:
//!
//! 1. **Poll**: wait for the listener or any worker socket to become ready, bounded by
//!    `POLL_TIMEOUT` so the timer below fires even when the network is silent.
//! 2. **Broadcast**: if the interval elapsed, write one progress line to every worker,
//!    dropping connections whose write fails.
//! 3. **Dispatch**: register newly accepted workers, or drain a readable socket and feed
//!    complete `RESULT` lines into the state store.

use super::protocol::{ResultReport, encode_progress};
use crate::state::store::StateStore;
use crate::state::types::TaskId;

use anyhow::Result;
use futures::future::select_all;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(2);
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 1024;
/// Reads per readiness event, so one chatty worker cannot starve the timer.
const MAX_READS_PER_EVENT: usize = 16;
/// Unterminated input beyond this is discarded.
const MAX_PENDING_LINE: usize = 64 * 1024;

/// The task whose progress is broadcast. Shared with the dispatch engine.
#[derive(Debug, Clone, Default)]
pub struct CurrentTask(Arc<AtomicU64>);

impl CurrentTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, task_id: TaskId) {
        self.0.store(task_id, Ordering::SeqCst);
        tracing::debug!("Now tracking progress for task {}", task_id);
    }

    pub fn get(&self) -> TaskId {
        self.0.load(Ordering::SeqCst)
    }
}

struct WorkerChannel {
    stream: TcpStream,
    peer: SocketAddr,
    inbound: Vec<u8>,
}

enum ReadyEvent {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Readable(u64, io::Result<()>),
}

pub struct ProgressBroadcaster {
    listener: TcpListener,
    store: Arc<StateStore>,
    current_task: CurrentTask,
    broadcast_interval: Duration,
    channels: HashMap<u64, WorkerChannel>,
    next_channel_id: u64,
    last_broadcast: Option<Instant>,
}

impl ProgressBroadcaster {
    pub async fn bind(
        bind_addr: SocketAddr,
        store: Arc<StateStore>,
        current_task: CurrentTask,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        tracing::info!(
            "Progress broadcaster listening on {} (every {:?})",
            listener.local_addr()?,
            BROADCAST_INTERVAL
        );

        Ok(Self {
            listener,
            store,
            current_task,
            broadcast_interval: BROADCAST_INTERVAL,
            channels: HashMap::new(),
            next_channel_id: 1,
            last_broadcast: None,
        })
    }

    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        loop {
            let event = self.poll_ready().await;

            if self.broadcast_due() {
                self.broadcast_progress();
            }

            if let Some(event) = event {
                self.handle_event(event);
            }
        }
    }

    /// Waits for the first ready socket, or returns `None` after `POLL_TIMEOUT`.
    async fn poll_ready(&self) -> Option<ReadyEvent> {
        let next_readable = async {
            if self.channels.is_empty() {
                return std::future::pending::<(u64, io::Result<()>)>().await;
            }

            let waits = self.channels.iter().map(|(&id, channel)| {
                Box::pin(async move { (id, channel.stream.readable().await) })
            });
            select_all(waits).await.0
        };

        tokio::select! {
            accepted = self.listener.accept() => Some(ReadyEvent::Accepted(accepted)),
            (id, ready) = next_readable => Some(ReadyEvent::Readable(id, ready)),
            _ = tokio::time::sleep(POLL_TIMEOUT) => None,
        }
    }

    fn broadcast_due(&self) -> bool {
        self.last_broadcast
            .map(|last| last.elapsed() >= self.broadcast_interval)
            .unwrap_or(true)
    }

    fn broadcast_progress(&mut self) {
        self.last_broadcast = Some(Instant::now());

        if self.channels.is_empty() {
            return;
        }

        let task_id = self.current_task.get();
        let line = encode_progress(task_id, &self.store.task_progress(task_id));

        let total = self.channels.len();
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (&id, channel) in &self.channels {
            // Short writes are not resumed; the next broadcast starts a fresh line.
            match channel.stream.try_write(line.as_bytes()) {
                Ok(_) => delivered += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tracing::debug!("Send buffer full for {}, skipping", channel.peer);
                }
                Err(e) => {
                    tracing::warn!("Broadcast to {} failed: {}", channel.peer, e);
                    failed.push(id);
                }
            }
        }

        for id in failed {
            self.drop_channel(id);
        }

        tracing::info!(
            "Broadcast {} to {}/{} workers",
            line.trim_end(),
            delivered,
            total
        );
    }

    fn handle_event(&mut self, event: ReadyEvent) {
        match event {
            ReadyEvent::Accepted(Ok((stream, peer))) => {
                let id = self.next_channel_id;
                self.next_channel_id += 1;

                self.store.register_progress_channel(id, peer);
                self.channels.insert(
                    id,
                    WorkerChannel {
                        stream,
                        peer,
                        inbound: Vec::new(),
                    },
                );
                tracing::info!("Worker connected for progress updates: {}", peer);
            }
            ReadyEvent::Accepted(Err(e)) => {
                tracing::warn!("Failed to accept progress connection: {}", e);
            }
            ReadyEvent::Readable(id, Ok(())) => {
                self.read_channel(id);
            }
            ReadyEvent::Readable(id, Err(e)) => {
                tracing::warn!("Progress channel {} errored: {}", id, e);
                self.drop_channel(id);
            }
        }
    }

    fn read_channel(&mut self, id: u64) {
        let Some(channel) = self.channels.get_mut(&id) else {
            return;
        };

        let mut buf = [0u8; READ_CHUNK];
        let mut closed = false;

        for _ in 0..MAX_READS_PER_EVENT {
            match channel.stream.try_read(&mut buf) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => channel.inbound.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!("Read from {} failed: {}", channel.peer, e);
                    closed = true;
                    break;
                }
            }
        }

        if channel.inbound.len() > MAX_PENDING_LINE && !channel.inbound.contains(&b'\n') {
            tracing::warn!("Discarding oversized unterminated input from {}", channel.peer);
            channel.inbound.clear();
        }

        let lines = drain_lines(&mut channel.inbound, closed);
        for line in lines {
            self.handle_line(&line);
        }

        if closed {
            self.drop_channel(id);
        }
    }

    fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match ResultReport::parse(line) {
            Some(report) => {
                self.store
                    .submit_subtask_result(report.task_id, report.subtask_id, &report.result);
            }
            None => {
                tracing::debug!("Ignoring worker message: {}", line);
            }
        }
    }

    fn drop_channel(&mut self, id: u64) {
        if let Some(channel) = self.channels.remove(&id) {
            self.store.unregister_progress_channel(id);
            tracing::info!("Worker {} disconnected from progress updates", channel.peer);
        }
    }
}

/// Splits off every complete line. With `flush`, a trailing partial line is returned too.
fn drain_lines(buf: &mut Vec<u8>, flush: bool) -> Vec<String> {
    let mut lines = Vec::new();

    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).to_string());
    }

    if flush && !buf.is_empty() {
        lines.push(String::from_utf8_lossy(buf).to_string());
        buf.clear();
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::NO_ACTIVE_TASK;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut buf = b"RESULT:1:1:a\nRESULT:1:2:b\nRESU".to_vec();

        let lines = drain_lines(&mut buf, false);

        assert_eq!(lines, vec!["RESULT:1:1:a\n", "RESULT:1:2:b\n"]);
        assert_eq!(buf, b"RESU");
    }

    #[test]
    fn test_drain_lines_flushes_tail_on_close() {
        let mut buf = b"RESULT:1:3:c".to_vec();

        let lines = drain_lines(&mut buf, true);

        assert_eq!(lines, vec!["RESULT:1:3:c"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_current_task_defaults_to_zero() {
        let current = CurrentTask::new();
        assert_eq!(current.get(), 0);

        let shared = current.clone();
        shared.set(1005);
        assert_eq!(current.get(), 1005);
    }

    #[tokio::test]
    async fn test_failed_broadcast_write_drops_only_that_channel() {
        let store = StateStore::new();
        let bind_addr = "127.0.0.1:0".parse().unwrap();
        let mut engine = ProgressBroadcaster::bind(bind_addr, store.clone(), CurrentTask::new())
            .await
            .unwrap();
        let addr = engine.local_addr().unwrap();

        let _broken_peer = TcpStream::connect(addr).await.unwrap();
        let healthy_peer = TcpStream::connect(addr).await.unwrap();
        for _ in 0..2 {
            let accepted = engine.listener.accept().await;
            engine.handle_event(ReadyEvent::Accepted(accepted));
        }
        assert_eq!(store.progress_channel_count(), 2);

        for channel in engine.channels.values() {
            channel.stream.writable().await.unwrap();
        }

        // Closing our own write half makes the next write fail while nothing is readable
        let broken = engine.channels.get_mut(&1).unwrap();
        broken.stream.shutdown().await.unwrap();

        engine.broadcast_progress();

        assert_eq!(store.progress_channel_count(), 1);
        assert!(!engine.channels.contains_key(&1));
        assert!(engine.channels.contains_key(&2));

        let mut lines = BufReader::new(healthy_peer).lines();
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .expect("broadcast in time")
            .unwrap()
            .unwrap();
        assert_eq!(line, format!("PROGRESS:0:{}", NO_ACTIVE_TASK));
    }
}
