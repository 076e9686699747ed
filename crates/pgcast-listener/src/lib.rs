//! # pgcast-listener
//!
//! Upstream notification sources. A source subscribes to one named channel
//! and yields `(channel, payload)` events in the order the upstream emits
//! them, until the subscription is closed or the upstream fails.
//!
//! - [`PgNotificationSource`]: PostgreSQL `LISTEN`/`NOTIFY`
//! - [`MemorySource`]: in-process source driven by a [`MemoryPublisher`]

#![deny(unsafe_code)]

pub mod memory;
pub mod postgres;

pub use memory::{MemoryPublisher, MemorySource};
pub use postgres::PgNotificationSource;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use pgcast_core::{NotificationEvent, RelayError};
use thiserror::Error;

/// Ordered stream of upstream events. An `Err` item is terminal.
pub type NotificationStream =
    Pin<Box<dyn Stream<Item = Result<NotificationEvent, UpstreamError>> + Send>>;

/// Failures of the upstream subscription.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("failed to connect to upstream: {0}")]
    Connect(String),
    #[error("failed to LISTEN on `{channel}`: {reason}")]
    Listen { channel: String, reason: String },
    #[error("upstream connection lost: {0}")]
    ConnectionLost(String),
    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),
    #[error("source already subscribed")]
    AlreadySubscribed,
    #[error("source is closed")]
    Closed,
}

impl From<UpstreamError> for RelayError {
    fn from(e: UpstreamError) -> Self {
        RelayError::UpstreamSubscription(e.to_string())
    }
}

/// A subscription primitive on an external event bus.
#[async_trait]
pub trait NotificationSource: Send {
    /// Start listening on `channel`. Each source supports one subscription.
    async fn subscribe(&mut self, channel: &str) -> Result<NotificationStream, UpstreamError>;

    /// Tear the subscription down. The stream returned by `subscribe` ends.
    async fn close(&mut self) -> Result<(), UpstreamError>;
}

/// Reject channel names that cannot be listened on.
pub(crate) fn check_channel(channel: &str) -> Result<(), UpstreamError> {
    if channel.trim().is_empty() || channel.contains('\0') {
        return Err(UpstreamError::InvalidChannel(channel.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_validation() {
        assert!(check_channel("http_response_inserted").is_ok());
        assert!(check_channel("").is_err());
        assert!(check_channel("   ").is_err());
        assert!(check_channel("a\0b").is_err());
    }

    #[test]
    fn upstream_error_converts_to_fatal_relay_error() {
        let relay: RelayError = UpstreamError::ConnectionLost("reset".into()).into();
        assert!(relay.is_fatal());
        assert!(relay.to_string().contains("reset"));
    }
}
