//! Settings types.

use std::fmt;

use pgcast_core::DEFAULT_NOTIFY_CHANNEL;
use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PgcastSettings {
    /// WebSocket fan-out server settings.
    pub server: ServerSettings,
    /// Upstream PostgreSQL settings.
    pub upstream: UpstreamSettings,
    /// Console and file logging settings.
    pub logging: LoggingSettings,
}

/// Downstream WebSocket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Outbound frames queued per client before frames are dropped.
    pub max_send_queue: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of client silence before the connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Channel named in the subscribe handshake frame.
    pub default_channel: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            default_channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
        }
    }
}

/// Upstream PostgreSQL connection and channel.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    pub user: String,
    pub host: String,
    pub database: String,
    pub password: Option<String>,
    pub port: u16,
    /// The one notification channel the relay forwards.
    pub channel: String,
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            host: "localhost".to_string(),
            database: "postgres".to_string(),
            password: None,
            port: 5432,
            channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("port", &self.port)
            .field("channel", &self.channel)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Log file rotation cadence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Console and file logging.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter; `RUST_LOG` takes precedence.
    pub level: String,
    /// Directory for the rotating log file. `None` logs to the console only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    pub file_name: String,
    pub rotation: LogRotation,
    /// Source label printed on every line.
    pub label: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_name: "server.log".to_string(),
            rotation: LogRotation::Daily,
            label: "pgcast".to_string(),
        }
    }
}
