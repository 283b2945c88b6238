//! Session state machine.
//!
//! `transition` is a pure function over named events; `Session` wraps it
//! with the bookkeeping that travels with each state change (auth flag,
//! identity, reconnect counter).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Protocol-level session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingAuth,
    SubscribingChannels,
    Active,
    /// Reconnect budget exhausted. Terminal.
    Failed,
}

impl SessionState {
    pub const ALL: [SessionState; 6] = [
        SessionState::Disconnected,
        SessionState::Connecting,
        SessionState::AwaitingAuth,
        SessionState::SubscribingChannels,
        SessionState::Active,
        SessionState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingAuth => "awaiting_auth",
            Self::SubscribingChannels => "subscribing_channels",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Socket is open (any state between open and close).
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::AwaitingAuth | Self::SubscribingChannels | Self::Active
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connect,
    Opened,
    AuthSucceeded,
    SubscriptionsSent,
    Closed,
    GiveUp,
}

/// Next state for `event` in `state`, or `None` when the event is not
/// valid there.
pub fn transition(state: SessionState, event: SessionEvent) -> Option<SessionState> {
    use SessionEvent as E;
    use SessionState as S;

    match (state, event) {
        (S::Failed, _) => None,
        (S::Disconnected, E::Connect) => Some(S::Connecting),
        (S::Disconnected, E::GiveUp) => Some(S::Failed),
        (S::Connecting, E::Opened) => Some(S::AwaitingAuth),
        (S::AwaitingAuth, E::AuthSucceeded) => Some(S::SubscribingChannels),
        (S::SubscribingChannels, E::SubscriptionsSent) => Some(S::Active),
        (S::Connecting | S::AwaitingAuth | S::SubscribingChannels | S::Active, E::Closed) => {
            Some(S::Disconnected)
        }
        _ => None,
    }
}

/// Session bookkeeping shared with readers through `SessionHandle`.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub state: SessionState,
    pub authenticated: bool,
    pub session_id: Option<String>,
    pub user: Option<String>,
    pub reconnect_attempts: u32,
    pub connected_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            authenticated: false,
            session_id: None,
            user: None,
            reconnect_attempts: 0,
            connected_at: None,
        }
    }

    /// Apply `event`. Returns `false` and leaves everything untouched when
    /// the event is rejected.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        let Some(next) = transition(self.state, event) else {
            return false;
        };

        match event {
            SessionEvent::Opened => {
                self.reconnect_attempts = 0;
                self.connected_at = Some(Utc::now());
            }
            SessionEvent::AuthSucceeded => {
                self.authenticated = true;
            }
            SessionEvent::Closed => {
                self.authenticated = false;
                self.user = None;
                self.session_id = None;
                self.connected_at = None;
            }
            SessionEvent::Connect | SessionEvent::SubscriptionsSent | SessionEvent::GiveUp => {}
        }

        self.state = next;
        true
    }

    /// Count a closed or failed connection. Returns the new attempt number.
    pub fn record_disconnect(&mut self) -> u32 {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        self.reconnect_attempts
    }

    /// Refresh is only meaningful on an open, authenticated socket.
    pub fn can_refresh(&self) -> bool {
        self.authenticated && self.state.is_open()
    }
}
