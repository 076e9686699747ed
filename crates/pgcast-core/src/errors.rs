//! Relay error taxonomy.
//!
//! Per-connection errors (`Parse`, `TransportSend`, `TransportClosed`) are
//! contained to the connection that raised them. `UpstreamSubscription` is
//! the only class allowed to end the process.

use thiserror::Error;

use crate::ids::ClientId;
use crate::protocol::ParseError;

#[derive(Debug, Error)]
pub enum RelayError {
    /// An inbound client frame could not be decoded.
    #[error("client {client_id}: unreadable frame: {source}")]
    Parse {
        client_id: ClientId,
        #[source]
        source: ParseError,
    },

    /// A write to a client connection failed.
    #[error("client {client_id}: send failed: {reason}")]
    TransportSend { client_id: ClientId, reason: String },

    /// The client transport closed or errored.
    #[error("client {client_id}: transport closed")]
    TransportClosed { client_id: ClientId },

    /// The upstream subscription could not be established or was lost.
    #[error("upstream subscription failed: {0}")]
    UpstreamSubscription(String),
}

impl RelayError {
    /// Whether this error should end the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UpstreamSubscription(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::TransportSend { .. } => "transport_send",
            Self::TransportClosed { .. } => "transport_closed",
            Self::UpstreamSubscription(_) => "upstream_subscription",
        }
    }
}
