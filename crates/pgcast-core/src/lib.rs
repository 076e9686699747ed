//! # pgcast-core
//!
//! Domain types shared by every pgcast crate:
//!
//! - [`ids::ClientId`]: server-assigned connection identity
//! - [`events::NotificationEvent`]: one upstream notification
//! - [`protocol`]: client control frames and server handshake frames
//! - [`errors::RelayError`]: the relay's error taxonomy

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod protocol;

pub use errors::RelayError;
pub use events::{HttpResponseRecord, NotificationEvent, DEFAULT_NOTIFY_CHANNEL};
pub use ids::ClientId;
pub use protocol::{InboundControlMessage, ParseError, ServerFrame};
