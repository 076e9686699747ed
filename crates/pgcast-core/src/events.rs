//! Upstream notification events and their positional payload format.

use std::sync::Arc;

/// The notification channel the relay forwards by default.
pub const DEFAULT_NOTIFY_CHANNEL: &str = "http_response_inserted";

/// Payload field delimiter for positional payloads.
const FIELD_DELIMITER: char = ',';

/// One notification received from the upstream event source.
///
/// The payload is kept behind an `Arc` so the broadcaster can hand the same
/// buffer to every connection without copying it per client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationEvent {
    pub channel: String,
    pub payload: Arc<str>,
}

impl NotificationEvent {
    pub fn new(channel: impl Into<String>, payload: impl AsRef<str>) -> Self {
        Self {
            channel: channel.into(),
            payload: Arc::from(payload.as_ref()),
        }
    }

    /// Whether this event was published on `channel`.
    pub fn is_on(&self, channel: &str) -> bool {
        self.channel == channel
    }
}

/// Positional view over an `http_response_inserted` payload:
/// `node_tag,src_ip,src_port,code`.
///
/// Decoding is best-effort. Missing or empty fields come back as `None`
/// and extra trailing fields are kept in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponseRecord {
    pub node_tag: Option<String>,
    pub src_ip: Option<String>,
    pub src_port: Option<u16>,
    pub code: Option<u16>,
    pub extra: Vec<String>,
}

impl HttpResponseRecord {
    pub fn decode(payload: &str) -> Self {
        let mut fields = payload.split(FIELD_DELIMITER).map(str::trim);
        let mut next_text = || {
            fields
                .next()
                .filter(|f| !f.is_empty())
                .map(ToOwned::to_owned)
        };

        let node_tag = next_text();
        let src_ip = next_text();
        let src_port = next_text().and_then(|p| p.parse().ok());
        let code = next_text().and_then(|c| c.parse().ok());
        let extra = fields.map(ToOwned::to_owned).collect();

        Self {
            node_tag,
            src_ip,
            src_port,
            code,
            extra,
        }
    }

    /// True when all four positional fields decoded.
    pub fn is_complete(&self) -> bool {
        self.node_tag.is_some()
            && self.src_ip.is_some()
            && self.src_port.is_some()
            && self.code.is_some()
    }
}
