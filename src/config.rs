//! Broker Configuration
//!
//! Every listener address, the multicast target and the pool/timeout knobs. Values come
//! from command-line flags, falling back to `BROKER_*` environment variables and then
//! to the defaults below.

use crate::dispatch::engine::{DEFAULT_CONFIG_GRACE, DEFAULT_DISPATCH_TIMEOUT};

use clap::{Parser, ValueEnum};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

pub const DEFAULT_SUBMISSION_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_REGISTRATION_ADDR: &str = "0.0.0.0:5001";
pub const DEFAULT_PROGRESS_ADDR: &str = "0.0.0.0:5002";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(230, 0, 0, 1);
pub const DEFAULT_MULTICAST_PORT: u16 = 6005;
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = DEFAULT_DISPATCH_TIMEOUT.as_millis() as u64;
pub const DEFAULT_CONFIG_GRACE_MS: u64 = DEFAULT_CONFIG_GRACE.as_millis() as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "task-broker", about = "Splits submitted tasks across registered workers")]
pub struct BrokerConfig {
    /// TCP address originators submit tasks to.
    #[arg(long, env = "BROKER_SUBMISSION_ADDR", default_value = DEFAULT_SUBMISSION_ADDR)]
    pub submission_addr: SocketAddr,

    /// UDP address workers register and heartbeat on.
    #[arg(long, env = "BROKER_REGISTRATION_ADDR", default_value = DEFAULT_REGISTRATION_ADDR)]
    pub registration_addr: SocketAddr,

    /// TCP address workers connect to for progress broadcasts and result reports.
    #[arg(long, env = "BROKER_PROGRESS_ADDR", default_value = DEFAULT_PROGRESS_ADDR)]
    pub progress_addr: SocketAddr,

    /// HTTP address of the JSON status and completion API.
    #[arg(long, env = "BROKER_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: SocketAddr,

    #[arg(long, env = "BROKER_MULTICAST_GROUP", default_value_t = DEFAULT_MULTICAST_GROUP)]
    pub multicast_group: Ipv4Addr,

    #[arg(long, env = "BROKER_MULTICAST_PORT", default_value_t = DEFAULT_MULTICAST_PORT)]
    pub multicast_port: u16,

    /// Multicast hop limit. 1 keeps datagrams on the local segment.
    #[arg(long, default_value_t = 1)]
    pub multicast_ttl: u32,

    /// Size of the pool shared by submission handling and sub-task dispatch.
    #[arg(long, env = "BROKER_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Upper bound for connecting to a worker and for awaiting its acknowledgment.
    #[arg(long, default_value_t = DEFAULT_DISPATCH_TIMEOUT_MS)]
    pub dispatch_timeout_ms: u64,

    /// Pause between the multicast config broadcast and the first dispatch.
    #[arg(long, default_value_t = DEFAULT_CONFIG_GRACE_MS)]
    pub config_grace_ms: u64,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl BrokerConfig {
    pub fn multicast_target(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.multicast_group, self.multicast_port)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn config_grace(&self) -> Duration {
        Duration::from_millis(self.config_grace_ms)
    }

    /// Loopback config on ephemeral ports.
    pub fn local_ephemeral() -> Self {
        let any_port = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        Self {
            submission_addr: any_port,
            registration_addr: any_port,
            progress_addr: any_port,
            http_addr: any_port,
            ..Self::default()
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            submission_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5000)),
            registration_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5001)),
            progress_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5002)),
            http_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            multicast_group: DEFAULT_MULTICAST_GROUP,
            multicast_port: DEFAULT_MULTICAST_PORT,
            multicast_ttl: 1,
            pool_size: DEFAULT_POOL_SIZE,
            dispatch_timeout_ms: DEFAULT_DISPATCH_TIMEOUT_MS,
            config_grace_ms: DEFAULT_CONFIG_GRACE_MS,
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_flag_defaults() {
        let parsed = BrokerConfig::try_parse_from(["task-broker"]).unwrap();
        let defaults = BrokerConfig::default();

        assert_eq!(parsed.submission_addr.port(), defaults.submission_addr.port());
        assert_eq!(parsed.registration_addr, defaults.registration_addr);
        assert_eq!(parsed.multicast_target(), defaults.multicast_target());
        assert_eq!(parsed.pool_size, 10);
        assert_eq!(defaults.config_grace(), Duration::from_millis(100));
        assert_eq!(parsed.config_grace(), DEFAULT_CONFIG_GRACE);
        assert_eq!(parsed.dispatch_timeout(), DEFAULT_DISPATCH_TIMEOUT);
        assert_eq!(defaults.dispatch_timeout(), DEFAULT_DISPATCH_TIMEOUT);
    }

    #[test]
    fn test_flags_override_defaults() {
        let parsed = BrokerConfig::try_parse_from([
            "task-broker",
            "--pool-size",
            "4",
            "--multicast-group",
            "239.1.2.3",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(parsed.pool_size, 4);
        assert_eq!(parsed.multicast_group, Ipv4Addr::new(239, 1, 2, 3));
        assert_eq!(parsed.log_format, LogFormat::Json);
    }
}
