//! Heartbeat tracking for the feed session.
//!
//! The feed does not require a reply to `[0, sessionId]`; acks are only
//! recorded for diagnostics.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Heartbeat monitor shared between the connection task and readers.
pub struct HeartbeatMonitor {
    /// How often a heartbeat is sent while the session is active.
    interval_ms: u64,
    /// Last heartbeat sent.
    last_sent: Arc<RwLock<Option<DateTime<Utc>>>>,
    /// Last heartbeat frame received.
    last_ack: Arc<RwLock<Option<DateTime<Utc>>>>,
    /// Last frame of any kind received.
    last_message: Arc<RwLock<Option<DateTime<Utc>>>>,
    /// Heartbeats sent on the current connection.
    sent_count: Arc<RwLock<u64>>,
}

impl HeartbeatMonitor {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_sent: Arc::new(RwLock::new(None)),
            last_ack: Arc::new(RwLock::new(None)),
            last_message: Arc::new(RwLock::new(None)),
            sent_count: Arc::new(RwLock::new(0)),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Reset heartbeat state (called on connection open).
    pub fn reset(&self) {
        *self.last_sent.write() = None;
        *self.last_ack.write() = None;
        *self.last_message.write() = Some(Utc::now());
        *self.sent_count.write() = 0;
    }

    pub fn record_sent(&self) {
        let now = Utc::now();
        *self.last_sent.write() = Some(now);
        *self.sent_count.write() += 1;
        debug!(time = %now, "Recorded heartbeat sent");
    }

    pub fn record_ack(&self) {
        let now = Utc::now();
        *self.last_ack.write() = Some(now);

        if let Some(sent) = *self.last_sent.read() {
            let rtt_ms = (now - sent).num_milliseconds();
            debug!(rtt_ms, "Received heartbeat ack");
        }
    }

    /// Record that any frame was received.
    pub fn record_message(&self) {
        *self.last_message.write() = Some(Utc::now());
    }

    pub fn time_since_last_message_ms(&self) -> Option<i64> {
        self.last_message
            .read()
            .map(|t| (Utc::now() - t).num_milliseconds())
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            interval_ms: self.interval_ms,
            last_sent: *self.last_sent.read(),
            last_ack: *self.last_ack.read(),
            last_message: *self.last_message.read(),
            sent_count: *self.sent_count.read(),
            time_since_last_message_ms: self.time_since_last_message_ms(),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatStats {
    pub interval_ms: u64,
    pub last_sent: Option<DateTime<Utc>>,
    pub last_ack: Option<DateTime<Utc>>,
    pub last_message: Option<DateTime<Utc>>,
    pub sent_count: u64,
    pub time_since_last_message_ms: Option<i64>,
}
