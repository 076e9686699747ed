//! Inbound control frame routing.
//!
//! Never fails: every outcome, including unreadable input, is reported as a
//! [`RouteOutcome`] and logged here. Connection state is never touched.

use pgcast_core::protocol::hex_preview;
use pgcast_core::{ClientId, InboundControlMessage, ParseError, RelayError};
use tracing::{debug, info, warn};

use super::registry::ConnectionRegistry;

/// What the router did with one frame.
#[derive(Debug)]
pub enum RouteOutcome {
    /// Client asserted its own identity. Logged only; the server-assigned
    /// identity stays authoritative.
    ClientIdAsserted(String),
    /// The connection's subscription was updated.
    Subscribed(String),
    /// Recognized envelope with nothing to do.
    Ignored(String),
    /// Unreadable frame.
    Rejected(RelayError),
}

/// Route a text frame.
pub fn route_text(registry: &ConnectionRegistry, id: &ClientId, text: &str) -> RouteOutcome {
    match InboundControlMessage::parse(text) {
        Ok(msg) => apply(registry, id, msg),
        Err(source) => reject(id, source, text.as_bytes()),
    }
}

/// Route a binary frame. Valid UTF-8 is treated as text.
pub fn route_binary(registry: &ConnectionRegistry, id: &ClientId, bytes: &[u8]) -> RouteOutcome {
    match InboundControlMessage::parse_bytes(bytes) {
        Ok(msg) => apply(registry, id, msg),
        Err(source) => reject(id, source, bytes),
    }
}

fn apply(registry: &ConnectionRegistry, id: &ClientId, msg: InboundControlMessage) -> RouteOutcome {
    match msg {
        InboundControlMessage::ClientId { client_id } => {
            info!(client_id = %id, asserted = %client_id, "client asserted identity");
            RouteOutcome::ClientIdAsserted(client_id)
        }
        InboundControlMessage::Subscribe { channel } => {
            if registry.update_subscription(id, &channel) {
                info!(client_id = %id, channel = %channel, "client subscribed");
                RouteOutcome::Subscribed(channel)
            } else {
                debug!(client_id = %id, channel = %channel, "subscribe for unregistered connection");
                RouteOutcome::Ignored("subscribe".into())
            }
        }
        InboundControlMessage::Unknown { action, .. } => {
            info!(client_id = %id, action = %action, "ignoring unhandled action");
            RouteOutcome::Ignored(action)
        }
    }
}

fn reject(id: &ClientId, source: ParseError, raw: &[u8]) -> RouteOutcome {
    let err = RelayError::Parse {
        client_id: id.clone(),
        source,
    };
    warn!(
        error = %err,
        kind = err.error_kind(),
        raw_hex = %hex_preview(raw),
        "malformed client frame"
    );
    RouteOutcome::Rejected(err)
}
