//! Feed wire frames and the events forwarded to the application.
//!
//! Every frame on the feed is a JSON array whose first element is an
//! integer type tag. Outbound frames are built with [`OutboundFrame`];
//! inbound text is split into tag + elements by [`InboundFrame::parse`]
//! and classified by the dispatcher.

use crate::error::{WsError, WsResult};
use crate::handshake::{Credentials, SubscriptionTarget};
use crate::session::SessionState;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use sicbo_core::{ChannelId, Round};
use std::time::Duration;

/// Leading type tags.
pub mod tag {
    pub const HEARTBEAT: u64 = 0;
    pub const AUTH: u64 = 1;
    pub const DATA: u64 = 5;
    pub const SUBSCRIBE: u64 = 6;
    pub const SUBSCRIBE_ACK: u64 = 7;
}

// ============================================================================
// Outbound
// ============================================================================

/// Frame sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// `[1, appId, username, password, authDetails]`
    Auth(Credentials),
    /// `[6, appId, plugin, {cmd, ...params}]`
    Subscribe {
        app_id: String,
        target: SubscriptionTarget,
    },
    /// `[0, sessionId]`, empty string before the session is established.
    Heartbeat { session_id: Option<String> },
}

impl OutboundFrame {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Auth(creds) => json!([
                tag::AUTH,
                creds.app_id,
                creds.username,
                creds.password,
                creds.auth_details,
            ]),
            Self::Subscribe { app_id, target } => {
                // `cmd` leads the payload object; params never override it.
                let mut payload = Map::new();
                payload.insert("cmd".to_string(), Value::from(target.cmd));
                for (key, value) in &target.params {
                    if key != "cmd" {
                        payload.insert(key.clone(), value.clone());
                    }
                }
                json!([tag::SUBSCRIBE, app_id, target.plugin, Value::Object(payload)])
            }
            Self::Heartbeat { session_id } => {
                json!([tag::HEARTBEAT, session_id.as_deref().unwrap_or("")])
            }
        }
    }

    /// Serialize to the text sent on the socket.
    pub fn encode(&self) -> WsResult<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }

    /// Short name for logging. Never includes credentials.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Subscribe { .. } => "subscribe",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Inbound frame split into its tag and remaining elements.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub tag: u64,
    /// Full array, including the tag at index 0.
    pub elements: Vec<Value>,
}

impl InboundFrame {
    pub fn parse(text: &str) -> WsResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(elements) = value else {
            return Err(WsError::ParseError("frame is not an array".to_string()));
        };
        let tag = elements
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| WsError::ParseError("missing integer type tag".to_string()))?;
        Ok(Self { tag, elements })
    }

    /// Element at `index` of the full array.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.elements.get(index)
    }

    /// Payload object of a data frame (element 1).
    pub fn payload(&self) -> Option<&Map<String, Value>> {
        self.get(1).and_then(Value::as_object)
    }
}

// ============================================================================
// Events forwarded to the application
// ============================================================================

/// Why an inbound frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Not JSON, not an array, or no integer tag.
    Malformed,
    /// Well-formed but matched no dispatch rule.
    Unrecognized,
    /// A round inside a snapshot failed validation.
    InvalidRound,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Unrecognized => "unrecognized",
            Self::InvalidRound => "invalid_round",
        }
    }
}

/// Event sent from the connection task to the application loop.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Complete replacement snapshot for one channel.
    Snapshot {
        channel: ChannelId,
        rounds: Vec<Round>,
        received_at: DateTime<Utc>,
    },
    /// Session moved to a new state.
    StateChanged { state: SessionState },
    /// A reconnect was scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// Frames (or rounds inside a frame) were dropped.
    FrameDiscarded { reason: DiscardReason, count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(plugin: &str, cmd: u32, params: Value) -> SubscriptionTarget {
        SubscriptionTarget {
            plugin: plugin.to_string(),
            cmd,
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_auth_frame_layout() {
        let creds = Credentials {
            app_id: "MiniGame".to_string(),
            username: "player".to_string(),
            password: "secret".to_string(),
            auth_details: json!({"pid": 4}),
        };
        let text = OutboundFrame::Auth(creds).encode().unwrap();
        assert_eq!(text, r#"[1,"MiniGame","player","secret",{"pid":4}]"#);
    }

    #[test]
    fn test_subscribe_frame_puts_cmd_first() {
        let frame = OutboundFrame::Subscribe {
            app_id: "MiniGame".to_string(),
            target: target("liveRoomPlugin", 1305, json!({"rid": 0, "cmd": 9})),
        };
        assert_eq!(
            frame.encode().unwrap(),
            r#"[6,"MiniGame","liveRoomPlugin",{"cmd":1305,"rid":0}]"#
        );
    }

    #[test]
    fn test_heartbeat_frame_without_session() {
        let frame = OutboundFrame::Heartbeat { session_id: None };
        assert_eq!(frame.encode().unwrap(), r#"[0,""]"#);

        let frame = OutboundFrame::Heartbeat {
            session_id: Some("abc".to_string()),
        };
        assert_eq!(frame.encode().unwrap(), r#"[0,"abc"]"#);
    }

    #[test]
    fn test_inbound_parse() {
        let frame = InboundFrame::parse(r#"[5,{"cmd":1005,"htr":[]}]"#).unwrap();
        assert_eq!(frame.tag, tag::DATA);
        assert_eq!(frame.payload().and_then(|p| p.get("cmd")), Some(&json!(1005)));
    }

    #[test]
    fn test_inbound_parse_rejects_non_array() {
        assert!(matches!(
            InboundFrame::parse(r#"{"cmd":1}"#),
            Err(WsError::ParseError(_))
        ));
        assert!(matches!(
            InboundFrame::parse(r#"["x", 1]"#),
            Err(WsError::ParseError(_))
        ));
        assert!(matches!(InboundFrame::parse("not json"), Err(WsError::Json(_))));
    }
}
