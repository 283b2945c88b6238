//! Read/command handle onto a running session.
//!
//! Cloned into query layers. Refresh requests travel over a channel to the
//! connection task, so they are safe across reconnects.

use crate::heartbeat::{HeartbeatMonitor, HeartbeatStats};
use crate::session::{Session, SessionState};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Command sent to the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Re-issue monitored channel subscriptions.
    Refresh,
}

/// Error type for refresh requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshError {
    /// Socket closed or not yet authenticated.
    NotReady,
    /// Reconnect budget exhausted; the session will not come back.
    SessionFailed,
    /// Connection task is gone.
    ChannelClosed,
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "session not ready"),
            Self::SessionFailed => write!(f, "session failed"),
            Self::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for RefreshError {}

#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    session: Arc<RwLock<Session>>,
    heartbeat: Arc<HeartbeatMonitor>,
}

impl SessionHandle {
    pub fn new(
        tx: mpsc::Sender<SessionCommand>,
        session: Arc<RwLock<Session>>,
        heartbeat: Arc<HeartbeatMonitor>,
    ) -> Self {
        Self {
            tx,
            session,
            heartbeat,
        }
    }

    /// Copy of the current session.
    pub fn status(&self) -> Session {
        self.session.read().clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.read().state
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().authenticated
    }

    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        self.heartbeat.stats()
    }

    /// Ask the connection task to refresh subscriptions.
    ///
    /// Only confirms the request was queued. A refresh that is already
    /// queued absorbs this one.
    pub fn request_refresh(&self) -> Result<(), RefreshError> {
        {
            let session = self.session.read();
            if session.state.is_terminal() {
                return Err(RefreshError::SessionFailed);
            }
            if !session.can_refresh() {
                return Err(RefreshError::NotReady);
            }
        }

        match self.tx.try_send(SessionCommand::Refresh) {
            Ok(()) => {
                debug!("Refresh queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Refresh already queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RefreshError::ChannelClosed),
        }
    }
}
