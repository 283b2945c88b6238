//! Authentication and subscription sequencing.
//!
//! After the socket opens the client sends one auth frame. Once the feed
//! acknowledges it, subscriptions go out on a fixed schedule: a settle
//! delay, then one frame per stagger step. The same staggering is used for
//! periodic refreshes.
//!
//! Plans are relative (`ScheduledFrame::delay`); `FrameSchedule` anchors
//! them to an instant and is owned by one connection, so dropping it
//! cancels everything still pending.

use crate::message::OutboundFrame;
use serde_json::{Map, Value};
use sicbo_core::ChannelId;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// One plugin subscription request.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionTarget {
    pub plugin: String,
    pub cmd: u32,
    /// Extra payload fields sent after `cmd`.
    pub params: Map<String, Value>,
}

/// Channel whose data frames are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredChannel {
    pub id: ChannelId,
    pub target: SubscriptionTarget,
}

/// Login material for the auth frame.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub app_id: String,
    pub username: String,
    pub password: String,
    /// Opaque object sent as the last auth element.
    pub auth_details: Value,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Handshake content and timings.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub credentials: Credentials,
    pub channels: Vec<MonitoredChannel>,
    /// Subscribed once per connection, never refreshed, data not stored.
    pub extra_subscriptions: Vec<SubscriptionTarget>,
    /// Wait between auth success and the first subscription.
    pub settle_delay_ms: u64,
    pub subscribe_stagger_ms: u64,
    pub refresh_interval_ms: u64,
    pub refresh_stagger_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            channels: Vec::new(),
            extra_subscriptions: Vec::new(),
            settle_delay_ms: 2000,
            subscribe_stagger_ms: 1000,
            refresh_interval_ms: 30000,
            refresh_stagger_ms: 1000,
        }
    }
}

/// Frame to send `delay` after the plan is anchored.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledFrame {
    pub delay: Duration,
    pub frame: OutboundFrame,
}

/// Builds auth, subscription and refresh frames from `HandshakeConfig`.
#[derive(Debug, Clone)]
pub struct HandshakeSequencer {
    config: HandshakeConfig,
}

impl HandshakeSequencer {
    pub fn new(config: HandshakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    pub fn channels(&self) -> &[MonitoredChannel] {
        &self.config.channels
    }

    pub fn app_id(&self) -> &str {
        &self.config.credentials.app_id
    }

    pub fn auth_frame(&self) -> OutboundFrame {
        OutboundFrame::Auth(self.config.credentials.clone())
    }

    fn subscribe(&self, target: &SubscriptionTarget) -> OutboundFrame {
        OutboundFrame::Subscribe {
            app_id: self.config.credentials.app_id.clone(),
            target: target.clone(),
        }
    }

    /// Post-auth plan: monitored channels first, then extras, one stagger
    /// step apart after the settle delay.
    pub fn subscription_plan(&self) -> Vec<ScheduledFrame> {
        let settle = Duration::from_millis(self.config.settle_delay_ms);
        let stagger = Duration::from_millis(self.config.subscribe_stagger_ms);

        self.config
            .channels
            .iter()
            .map(|c| &c.target)
            .chain(self.config.extra_subscriptions.iter())
            .enumerate()
            .map(|(i, target)| ScheduledFrame {
                delay: settle + stagger * i as u32,
                frame: self.subscribe(target),
            })
            .collect()
    }

    /// Refresh plan: monitored channels only, first one immediately.
    pub fn refresh_plan(&self) -> Vec<ScheduledFrame> {
        let stagger = Duration::from_millis(self.config.refresh_stagger_ms);

        self.config
            .channels
            .iter()
            .enumerate()
            .map(|(i, channel)| ScheduledFrame {
                delay: stagger * i as u32,
                frame: self.subscribe(&channel.target),
            })
            .collect()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.config.refresh_interval_ms)
    }
}

/// Pending frames ordered by due time.
#[derive(Debug, Default)]
pub struct FrameSchedule {
    queue: VecDeque<(Instant, OutboundFrame)>,
}

impl FrameSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor `plan` at `now`. Frames with equal due times keep insertion
    /// order.
    pub fn push_plan(&mut self, now: Instant, plan: Vec<ScheduledFrame>) {
        for scheduled in plan {
            let due = now + scheduled.delay;
            let pos = self.queue.partition_point(|(at, _)| *at <= due);
            self.queue.insert(pos, (due, scheduled.frame));
        }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.queue.front().map(|(at, _)| *at)
    }

    /// Remove and return every frame due at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Vec<OutboundFrame> {
        let mut due = Vec::new();
        while self.queue.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, frame)) = self.queue.pop_front() {
                due.push(frame);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
