use super::protocol::{REPLY_HEARTBEAT, REPLY_REGISTERED, RegistrationMessage};
use crate::state::store::StateStore;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const MAX_DATAGRAM: usize = 1024;

/// Blocking receive loop for `REGISTER` / `HEARTBEAT` datagrams.
pub struct RegistrationListener {
    socket: UdpSocket,
    store: Arc<StateStore>,
}

impl RegistrationListener {
    pub async fn bind(bind_addr: SocketAddr, store: Arc<StateStore>) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        tracing::info!("Registration listener bound on {}", socket.local_addr()?);

        Ok(Arc::new(Self { socket, store }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.receive_loop().await;
        })
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => {
                    let raw = String::from_utf8_lossy(&buf[..len]);
                    if let Err(e) = self.handle_datagram(&raw, src).await {
                        tracing::warn!("Failed to answer {}: {}", src, e);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_datagram(&self, raw: &str, src: SocketAddr) -> Result<()> {
        tracing::debug!("Received {:?} from {}", raw.trim(), src);

        match RegistrationMessage::parse(raw) {
            Some(RegistrationMessage::Register { tcp_port }) => {
                self.store.register_worker(&src.ip().to_string(), tcp_port);
                self.socket.send_to(REPLY_REGISTERED.as_bytes(), src).await?;
            }
            Some(RegistrationMessage::Heartbeat) => {
                tracing::debug!("Heartbeat from {}", src);
                self.socket.send_to(REPLY_HEARTBEAT.as_bytes(), src).await?;
            }
            None => {
                tracing::debug!("Ignoring unrecognized datagram from {}", src);
            }
        }

        Ok(())
    }
}
