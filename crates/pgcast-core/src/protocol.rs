//! Client wire protocol.
//!
//! Client to server: a JSON object whose `action` (or `kind`) field selects
//! the message. Server to client: two JSON handshake frames, then raw
//! upstream payloads with no envelope.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::ids::ClientId;

/// Discriminator fields accepted on inbound control frames, in lookup order.
const DISCRIMINATORS: [&str; 2] = ["action", "kind"];

/// Why an inbound frame could not be read as a control message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no string `action` field")]
    MissingAction,
    #[error("`{action}` frame is missing string field `{field}`")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },
}

/// A control message sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundControlMessage {
    /// The client asserts an identity of its own. Advisory only.
    ClientId { client_id: String },
    /// The client declares the channel it is interested in.
    Subscribe { channel: String },
    /// A well-formed envelope carrying an action the relay does not handle.
    Unknown { action: String, raw: String },
}

impl InboundControlMessage {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(ParseError::NotAnObject);
        };

        let action = DISCRIMINATORS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .ok_or(ParseError::MissingAction)?;

        match action {
            "client_id" => {
                let client_id = map
                    .get("clientId")
                    .and_then(Value::as_str)
                    .ok_or(ParseError::MissingField {
                        action: "client_id",
                        field: "clientId",
                    })?;
                Ok(Self::ClientId {
                    client_id: client_id.to_owned(),
                })
            }
            "subscribe" => {
                let channel = map
                    .get("channel")
                    .and_then(Value::as_str)
                    .ok_or(ParseError::MissingField {
                        action: "subscribe",
                        field: "channel",
                    })?;
                Ok(Self::Subscribe {
                    channel: channel.to_owned(),
                })
            }
            other => Ok(Self::Unknown {
                action: other.to_owned(),
                raw: text.to_owned(),
            }),
        }
    }

    /// Parse raw frame bytes; non UTF-8 input is a parse error.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
        Self::parse(text)
    }

    pub fn action(&self) -> &str {
        match self {
            Self::ClientId { .. } => "client_id",
            Self::Subscribe { .. } => "subscribe",
            Self::Unknown { action, .. } => action,
        }
    }
}

/// Handshake frames the server sends right after accepting a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerFrame {
    ClientId {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    Subscribe { channel: String },
}

impl ServerFrame {
    pub fn client_id(id: &ClientId) -> Self {
        Self::ClientId {
            client_id: id.as_str().to_owned(),
        }
    }

    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self::Subscribe {
            channel: channel.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Hex rendering of a raw frame for logging untrusted input.
pub fn hex_preview(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_client_id() {
        let msg = InboundControlMessage::parse(r#"{"action":"client_id","clientId":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            InboundControlMessage::ClientId {
                client_id: "abc".into()
            }
        );
    }

    #[test]
    fn parse_subscribe() {
        let msg = InboundControlMessage::parse(r#"{"action":"subscribe","channel":"alerts"}"#).unwrap();
        assert_eq!(
            msg,
            InboundControlMessage::Subscribe {
                channel: "alerts".into()
            }
        );
    }

    #[test]
    fn kind_is_accepted_as_discriminator() {
        let msg = InboundControlMessage::parse(r#"{"kind":"subscribe","channel":"a"}"#).unwrap();
        assert_eq!(msg.action(), "subscribe");
    }

    #[test]
    fn unknown_action_keeps_raw_text() {
        let raw = r#"{"action":"ping","n":1}"#;
        let msg = InboundControlMessage::parse(raw).unwrap();
        match msg {
            InboundControlMessage::Unknown { action, raw: kept } => {
                assert_eq!(action, "ping");
                assert_eq!(kept, raw);
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn non_json_is_parse_error() {
        let err = InboundControlMessage::parse("hello there").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn array_is_not_an_envelope() {
        let err = InboundControlMessage::parse("[1,2]").unwrap_err();
        assert_eq!(err, ParseError::NotAnObject);
    }

    #[test]
    fn missing_action_is_parse_error() {
        let err = InboundControlMessage::parse(r#"{"channel":"a"}"#).unwrap_err();
        assert_eq!(err, ParseError::MissingAction);
    }

    #[test]
    fn non_string_action_is_parse_error() {
        let err = InboundControlMessage::parse(r#"{"action":7}"#).unwrap_err();
        assert_eq!(err, ParseError::MissingAction);
    }

    #[test]
    fn subscribe_without_channel_is_parse_error() {
        let err = InboundControlMessage::parse(r#"{"action":"subscribe"}"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingField {
                action: "subscribe",
                field: "channel"
            }
        );
    }

    #[test]
    fn invalid_utf8_bytes() {
        let err = InboundControlMessage::parse_bytes(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err, ParseError::NotUtf8);
    }

    #[test]
    fn handshake_frames_match_wire_format() {
        let id = ClientId::from_raw("client_1");
        let json: Value = serde_json::from_str(&ServerFrame::client_id(&id).to_json().unwrap()).unwrap();
        assert_eq!(json["action"], "client_id");
        assert_eq!(json["clientId"], "client_1");

        let json: Value =
            serde_json::from_str(&ServerFrame::subscribe("http_response_inserted").to_json().unwrap())
                .unwrap();
        assert_eq!(json["action"], "subscribe");
        assert_eq!(json["channel"], "http_response_inserted");
    }

    #[test]
    fn hex_preview_encodes_bytes() {
        assert_eq!(hex_preview(b"hi"), "6869");
    }
}
