//! Progress Module Tests
//!
//! ## Test Scopes
//! - **Protocol**: `PROGRESS` encoding and `RESULT` parsing, including malformed input.
//! - **Engine**: Periodic broadcasts, result ingestion and disconnect handling over
//!   loopback TCP.

#[cfg(test)]
mod tests {
    use crate::progress::engine::{CurrentTask, ProgressBroadcaster};
    use crate::progress::protocol::*;
    use crate::state::store::StateStore;
    use crate::state::types::NO_ACTIVE_TASK;

    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    async fn start_engine(
        store: Arc<StateStore>,
        current: CurrentTask,
        interval: Duration,
    ) -> std::net::SocketAddr {
        let engine = ProgressBroadcaster::bind("127.0.0.1:0".parse().unwrap(), store, current)
            .await
            .unwrap()
            .with_broadcast_interval(interval);
        let addr = engine.local_addr().unwrap();
        let _handle = engine.start();
        addr
    }

    // ============================================================
    // PROTOCOL TESTS
    // ============================================================

    #[test]
    fn test_encode_progress() {
        assert_eq!(encode_progress(1001, "40% (2/5)"), "PROGRESS:1001:40% (2/5)\n");
    }

    #[test]
    fn test_parse_result_report() {
        let report = ResultReport::parse("RESULT:1001:2:sum=42").unwrap();
        assert_eq!(report.task_id, 1001);
        assert_eq!(report.subtask_id, 2);
        assert_eq!(report.result, "sum=42");
    }

    #[test]
    fn test_parse_result_keeps_colons_in_payload() {
        let report = ResultReport::parse("RESULT:1001:1:a:b:c\n").unwrap();
        assert_eq!(report.result, "a:b:c");
    }

    #[test]
    fn test_parse_result_without_payload() {
        let report = ResultReport::parse("RESULT:1001:3").unwrap();
        assert_eq!(report.result, "");
    }

    #[test]
    fn test_parse_result_rejects_malformed() {
        assert_eq!(ResultReport::parse("RESULT:abc:1:x"), None);
        assert_eq!(ResultReport::parse("RESULT:1001"), None);
        assert_eq!(ResultReport::parse("RESULT:1001:-1:x"), None);
        assert_eq!(ResultReport::parse("PROGRESS:1001:1"), None);
    }

    // ============================================================
    // ENGINE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_broadcast_without_task_sends_sentinel() {
        let store = StateStore::new();
        let addr = start_engine(store, CurrentTask::new(), Duration::from_millis(200)).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();

        let line = tokio::time::timeout(Duration::from_secs(3), lines.next_line())
            .await
            .expect("broadcast in time")
            .unwrap()
            .unwrap();
        assert_eq!(line, format!("PROGRESS:0:{}", NO_ACTIVE_TASK));
    }

    #[tokio::test]
    async fn test_broadcast_tracks_current_task_progress() {
        let store = StateStore::new();
        store.register_worker("127.0.0.1", 6000);
        store.register_worker("127.0.0.1", 6001);
        let task_id = store.create_task("X", "payload", 2);
        let current = CurrentTask::new();
        current.set(task_id);
        store.submit_subtask_result(task_id, 1, "done");

        let addr = start_engine(store, current, Duration::from_millis(200)).await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();

        let line = tokio::time::timeout(Duration::from_secs(3), lines.next_line())
            .await
            .expect("broadcast in time")
            .unwrap()
            .unwrap();
        assert_eq!(line, format!("PROGRESS:{}:50% (1/2)", task_id));
    }

    #[tokio::test]
    async fn test_broadcast_repeats_on_interval() {
        let store = StateStore::new();
        let addr = start_engine(store, CurrentTask::new(), Duration::from_millis(150)).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();

        for _ in 0..3 {
            let line = tokio::time::timeout(Duration::from_secs(3), lines.next_line())
                .await
                .expect("broadcast in time")
                .unwrap()
                .unwrap();
            assert!(line.starts_with("PROGRESS:0:"));
        }
    }

    #[tokio::test]
    async fn test_result_lines_are_ingested() {
        let store = StateStore::new();
        store.register_worker("127.0.0.1", 6000);
        store.register_worker("127.0.0.1", 6001);
        let task_id = store.create_task("X", "payload", 2);
        let addr = start_engine(store.clone(), CurrentTask::new(), Duration::from_secs(2)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let report = ResultReport {
            task_id,
            subtask_id: 2,
            result: "beta".to_string(),
        };
        let batch = format!(
            "RESULT:{}:1:alpha\nRESULT:bogus\n{}",
            task_id,
            report.encode()
        );
        stream.write_all(batch.as_bytes()).await.unwrap();

        let task = store.task(task_id).unwrap();
        assert!(wait_until(|| task.completed() == 2).await);
        assert_eq!(task.result(1).as_deref(), Some("alpha"));
        assert_eq!(task.result(2).as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn test_result_for_unknown_task_is_dropped() {
        let store = StateStore::new();
        let addr = start_engine(store.clone(), CurrentTask::new(), Duration::from_secs(2)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"RESULT:424242:1:lost\n").await.unwrap();

        assert!(wait_until(|| store.progress_channel_count() == 1).await);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.task_count(), 0);
        assert_eq!(store.progress_channel_count(), 1, "channel survives bad input");
    }

    #[tokio::test]
    async fn test_connections_are_recorded_and_released() {
        let store = StateStore::new();
        let addr = start_engine(store.clone(), CurrentTask::new(), Duration::from_secs(2)).await;

        let first = TcpStream::connect(addr).await.unwrap();
        let second = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| store.progress_channel_count() == 2).await);

        drop(first);
        assert!(wait_until(|| store.progress_channel_count() == 1).await);

        drop(second);
        assert!(wait_until(|| store.progress_channel_count() == 0).await);
    }

    #[tokio::test]
    async fn test_unterminated_result_is_applied_on_close() {
        let store = StateStore::new();
        store.register_worker("127.0.0.1", 6000);
        let task_id = store.create_task("X", "payload", 1);
        let addr = start_engine(store.clone(), CurrentTask::new(), Duration::from_secs(2)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("RESULT:{}:1:tail", task_id).as_bytes())
            .await
            .unwrap();
        stream.shutdown().await.unwrap();
        drop(stream);

        assert!(wait_until(|| store.task_progress(task_id) == "100% (1/1)").await);
    }
}
