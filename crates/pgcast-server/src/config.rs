//! Server configuration.

use std::time::Duration;

use pgcast_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Minimum per-client queue: both handshake frames must fit before the
/// writer task starts draining.
const MIN_SEND_QUEUE: usize = 2;

/// Runtime configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Outbound frames buffered per client before frames are dropped.
    pub max_send_queue: usize,
    /// Seconds between server Ping frames.
    pub heartbeat_interval_secs: u64,
    /// Seconds of client silence before the connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Channel named in the `subscribe` handshake frame.
    pub default_channel: String,
}

impl ServerConfig {
    pub fn send_queue_capacity(&self) -> usize {
        self.max_send_queue.max(MIN_SEND_QUEUE)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_send_queue: s.max_send_queue,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            max_message_size: s.max_message_size,
            default_channel: s.default_channel.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgcast_core::DEFAULT_NOTIFY_CHANNEL;

    #[test]
    fn defaults_match_settings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_send_queue, 256);
        assert_eq!(cfg.default_channel, DEFAULT_NOTIFY_CHANNEL);
    }

    #[test]
    fn bind_addr_format() {
        let cfg = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn queue_capacity_fits_handshake() {
        let cfg = ServerConfig {
            max_send_queue: 1,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.send_queue_capacity(), 2);
    }

    #[test]
    fn heartbeat_durations() {
        let cfg = ServerConfig {
            heartbeat_interval_secs: 0,
            heartbeat_timeout_secs: 45,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port, cfg.port);
        assert_eq!(back.default_channel, cfg.default_channel);
    }
}
