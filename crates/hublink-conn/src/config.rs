//! Connection tunables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and size limits for one hub connection.
///
/// `Default` gives the production values: retry every 5 s, heartbeat every
/// 1 s, drop the link after 7 s without a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Fixed delay before reconnecting after a failure or disconnect.
    pub retry_interval_ms: u64,
    /// How often a heartbeat frame is sent.
    pub heartbeat_interval_ms: u64,
    /// How long to wait for the next heartbeat once one has arrived.
    pub heartbeat_timeout_ms: u64,
    /// TCP connect timeout. None blocks until the OS gives up.
    pub connect_timeout_ms: Option<u64>,
    /// Largest inbound frame accepted.
    pub max_frame_len: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 5_000,
            heartbeat_interval_ms: 1_000,
            heartbeat_timeout_ms: 7_000,
            connect_timeout_ms: Some(10_000),
            max_frame_len: hublink_wire::DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ConnectionConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(7));
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.max_frame_len, 16 * 1024 * 1024);
    }
}
