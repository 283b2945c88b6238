//! Inbound frame classification.
//!
//! Rules are checked in priority order: monitored channel data, auth
//! success, session establishment, subscription ack, heartbeat. Anything
//! else is `Ignored`.

use crate::error::WsResult;
use crate::handshake::MonitoredChannel;
use crate::message::{tag, InboundFrame};
use serde::Deserialize;
use serde_json::Value;
use sicbo_core::{ChannelId, Round};
use std::collections::HashMap;
use tracing::warn;

/// Routing decision for one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Snapshot for a monitored channel. `rounds` may be empty.
    ChannelData {
        channel: ChannelId,
        rounds: Vec<Round>,
        /// Entries dropped by round validation.
        skipped: usize,
    },
    AuthSuccess { user: String },
    SessionInit { session_id: String },
    SubscriptionAck { plugin: String },
    HeartbeatAck,
    Ignored { tag: u64 },
}

/// Maps command codes to channels and classifies frames.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    app_id: String,
    channels: HashMap<u32, ChannelId>,
}

impl Dispatcher {
    pub fn new(app_id: impl Into<String>, channels: &[MonitoredChannel]) -> Self {
        Self {
            app_id: app_id.into(),
            channels: channels
                .iter()
                .map(|c| (c.target.cmd, c.id.clone()))
                .collect(),
        }
    }

    /// Channel bound to `cmd`, if monitored.
    pub fn channel_for(&self, cmd: u32) -> Option<&ChannelId> {
        self.channels.get(&cmd)
    }

    /// Classify raw frame text. Errors only on malformed frames.
    pub fn classify(&self, text: &str) -> WsResult<Dispatch> {
        let frame = InboundFrame::parse(text)?;
        Ok(self.classify_frame(&frame))
    }

    pub fn classify_frame(&self, frame: &InboundFrame) -> Dispatch {
        match frame.tag {
            tag::DATA => self.classify_data(frame),
            tag::AUTH => {
                let app_matches = frame
                    .get(4)
                    .and_then(Value::as_str)
                    .is_some_and(|app| app == self.app_id);
                match frame.get(3) {
                    Some(id) if app_matches && !id.is_null() => Dispatch::SessionInit {
                        session_id: value_to_string(id),
                    },
                    _ => Dispatch::Ignored { tag: frame.tag },
                }
            }
            tag::SUBSCRIBE_ACK => Dispatch::SubscriptionAck {
                plugin: frame
                    .get(2)
                    .map(value_to_string)
                    .unwrap_or_else(|| "unknown".to_string()),
            },
            tag::HEARTBEAT => Dispatch::HeartbeatAck,
            other => Dispatch::Ignored { tag: other },
        }
    }

    fn classify_data(&self, frame: &InboundFrame) -> Dispatch {
        let Some(payload) = frame.payload() else {
            return Dispatch::Ignored { tag: frame.tag };
        };

        let channel = payload
            .get("cmd")
            .and_then(Value::as_u64)
            .and_then(|cmd| u32::try_from(cmd).ok())
            .and_then(|cmd| self.channel_for(cmd));

        if let Some(channel) = channel {
            let (rounds, skipped) = parse_rounds(channel, payload.get("htr"));
            return Dispatch::ChannelData {
                channel: channel.clone(),
                rounds,
                skipped,
            };
        }

        match payload.get("u") {
            Some(user) if !user.is_null() => Dispatch::AuthSuccess {
                user: value_to_string(user),
            },
            _ => Dispatch::Ignored { tag: frame.tag },
        }
    }
}

/// Parse `htr` entries, skipping invalid ones.
fn parse_rounds(channel: &ChannelId, htr: Option<&Value>) -> (Vec<Round>, usize) {
    let Some(entries) = htr.and_then(Value::as_array) else {
        return (Vec::new(), 0);
    };

    let mut rounds = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in entries {
        match Round::deserialize(entry) {
            Ok(round) => rounds.push(round),
            Err(e) => {
                skipped += 1;
                warn!(channel = %channel, error = %e, "Skipping invalid round");
            }
        }
    }
    (rounds, skipped)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
