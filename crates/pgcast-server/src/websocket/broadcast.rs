//! Notification fan-out.

use std::sync::Arc;

use pgcast_core::{HttpResponseRecord, NotificationEvent, RelayError};
use tracing::{debug, trace};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;

/// Per-event delivery counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Connections in the snapshot.
    pub recipients: usize,
    pub sent: usize,
    /// No longer open at send time.
    pub skipped: usize,
    /// Queue full or closed.
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Event was on a channel this relay does not forward.
    Discarded,
    Delivered(FanOutReport),
}

/// Forwards events on one channel to every open connection.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    channel: String,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, channel: impl Into<String>) -> Self {
        Self {
            registry,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Filter, decode for logging, snapshot, fan out.
    ///
    /// Every open connection gets the payload regardless of its recorded
    /// subscription.
    pub fn dispatch(&self, event: &NotificationEvent) -> Dispatch {
        if !event.is_on(&self.channel) {
            trace!(channel = %event.channel, "discarding notification on unforwarded channel");
            return Dispatch::Discarded;
        }

        let record = HttpResponseRecord::decode(&event.payload);
        debug!(
            node_tag = ?record.node_tag,
            src_ip = ?record.src_ip,
            src_port = ?record.src_port,
            code = ?record.code,
            complete = record.is_complete(),
            "notification received"
        );

        let snapshot = self.registry.snapshot_open();
        let report = fan_out(&snapshot, &event.payload);
        debug!(
            recipients = report.recipients,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "fan-out complete"
        );
        Dispatch::Delivered(report)
    }
}

/// Queue `payload` on each connection that is still open. Never blocks and
/// never stops early.
pub fn fan_out(connections: &[Arc<ClientConnection>], payload: &Arc<str>) -> FanOutReport {
    let mut report = FanOutReport {
        recipients: connections.len(),
        ..FanOutReport::default()
    };
    for conn in connections {
        if !conn.is_open() {
            report.skipped += 1;
            continue;
        }
        if conn.send(Arc::clone(payload)) {
            report.sent += 1;
        } else {
            report.failed += 1;
            let err = RelayError::TransportSend {
                client_id: conn.id.clone(),
                reason: "send queue full or closed".into(),
            };
            debug!(error = %err, kind = err.error_kind(), dropped = conn.drop_count(), "frame dropped");
        }
    }
    report
}
