use crate::state::types::TaskId;

use anyhow::Result;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;

const TASK_CONFIG_PREFIX: &str = "TASKCONFIG";
const PARTITION_DELIMITER: &str = "|";

/// `TASKCONFIG:<taskId>:<name>:<splitCount>:<data>:<part1>|<part2>|...`
///
/// Fields are not escaped; a `:` or `|` inside the name, data or partitions makes the
/// line ambiguous for receivers.
pub fn encode_task_config(
    task_id: TaskId,
    name: &str,
    split_count: usize,
    data: &str,
    partitions: &[String],
) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}",
        TASK_CONFIG_PREFIX,
        task_id,
        name,
        split_count,
        data,
        partitions.join(PARTITION_DELIMITER)
    )
}

/// Sends one task config datagram per call to a fixed group/port.
#[derive(Debug, Clone)]
pub struct ConfigMulticaster {
    target: SocketAddrV4,
    ttl: u32,
}

impl ConfigMulticaster {
    pub fn new(target: SocketAddrV4, ttl: u32) -> Self {
        tracing::info!("Task config multicast target {} (ttl={})", target, ttl);
        Self { target, ttl }
    }

    pub fn target(&self) -> SocketAddrV4 {
        self.target
    }

    /// Returns whether the datagram left this host; errors are logged, not returned.
    pub async fn broadcast(
        &self,
        task_id: TaskId,
        name: &str,
        split_count: usize,
        data: &str,
        partitions: &[String],
    ) -> bool {
        let message = encode_task_config(task_id, name, split_count, data, partitions);

        match self.send(&message).await {
            Ok(bytes) => {
                tracing::info!(
                    "Broadcasted config for task {} '{}' (splits: {}, {} bytes)",
                    task_id,
                    name,
                    split_count,
                    bytes
                );
                true
            }
            Err(e) => {
                tracing::warn!("Config broadcast for task {} failed: {}", task_id, e);
                false
            }
        }
    }

    async fn send(&self, message: &str) -> Result<usize> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_multicast_ttl_v4(self.ttl)?;
        let sent = socket.send_to(message.as_bytes(), self.target).await?;
        Ok(sent)
    }
}
