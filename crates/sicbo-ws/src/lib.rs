//! WebSocket session client for the sic bo round feed.
//!
//! Provides:
//! - Explicit session state machine (connect, auth, subscribe, active)
//! - Staggered subscription handshake and periodic refresh
//! - Heartbeat while active
//! - Linear reconnect backoff with a bounded attempt budget
//! - Channel-based delivery of round snapshots

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod heartbeat;
pub mod message;
pub mod session;
pub mod session_handle;

pub use connection::{ConnectionConfig, ConnectionManager, ReconnectPolicy};
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{WsError, WsResult};
pub use handshake::{
    Credentials, FrameSchedule, HandshakeConfig, HandshakeSequencer, MonitoredChannel,
    ScheduledFrame, SubscriptionTarget,
};
pub use heartbeat::{HeartbeatMonitor, HeartbeatStats};
pub use message::{DiscardReason, FeedEvent, InboundFrame, OutboundFrame};
pub use session::{transition, Session, SessionEvent, SessionState};
pub use session_handle::{RefreshError, SessionCommand, SessionHandle};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
