//! Feed connection manager.
//!
//! Owns the socket and drives the session: auth on open, staged
//! subscriptions after auth success, periodic refresh and heartbeat once
//! active, linear backoff reconnects with a bounded attempt budget.
//!
//! Every timer lives in a per-connection `ConnectionTimers` value that is
//! dropped when the socket loop returns, so a closed connection can never
//! fire frames into the next one.

use crate::dispatcher::{Dispatch, Dispatcher};
use crate::error::{WsError, WsResult};
use crate::handshake::{FrameSchedule, HandshakeConfig, HandshakeSequencer};
use crate::heartbeat::HeartbeatMonitor;
use crate::message::{DiscardReason, FeedEvent, OutboundFrame};
use crate::session::{Session, SessionEvent, SessionState};
use crate::session_handle::{SessionCommand, SessionHandle};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Headers the WebSocket client negotiates itself.
const RESERVED_HEADERS: [&str; 6] = [
    "host",
    "connection",
    "upgrade",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
];

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Extra handshake headers (Origin, User-Agent, ...).
    pub headers: Vec<(String, String)>,
    /// Reconnects allowed before the session fails.
    pub max_reconnect_attempts: u32,
    /// Linear backoff step.
    pub reconnect_base_delay_ms: u64,
    /// Heartbeat interval once active.
    pub heartbeat_interval_ms: u64,
    pub handshake: HandshakeConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: Vec::new(),
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 5000,
            heartbeat_interval_ms: 25000,
            handshake: HandshakeConfig::default(),
        }
    }
}

/// Linear reconnect backoff with a hard attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before reconnect `attempt` (1-based), or `None` once the
    /// budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * attempt)
    }
}

/// Deferred actions of one connection.
struct ConnectionTimers {
    schedule: FrameSchedule,
    refresh: Option<Interval>,
    heartbeat: Option<Interval>,
}

impl ConnectionTimers {
    fn new() -> Self {
        Self {
            schedule: FrameSchedule::new(),
            refresh: None,
            heartbeat: None,
        }
    }
}

/// Feed connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    policy: ReconnectPolicy,
    sequencer: HandshakeSequencer,
    dispatcher: Dispatcher,
    session: Arc<RwLock<Session>>,
    heartbeat: Arc<HeartbeatMonitor>,
    event_tx: mpsc::Sender<FeedEvent>,
    /// Command sender (for SessionHandle).
    command_tx: mpsc::Sender<SessionCommand>,
    /// Command receiver (consumed by the socket loop).
    command_rx: TokioMutex<mpsc::Receiver<SessionCommand>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, event_tx: mpsc::Sender<FeedEvent>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(1);
        let sequencer = HandshakeSequencer::new(config.handshake.clone());
        let dispatcher = Dispatcher::new(sequencer.app_id(), sequencer.channels());
        Self {
            policy: ReconnectPolicy::new(
                Duration::from_millis(config.reconnect_base_delay_ms),
                config.max_reconnect_attempts,
            ),
            heartbeat: Arc::new(HeartbeatMonitor::new(config.heartbeat_interval_ms)),
            config,
            sequencer,
            dispatcher,
            session: Arc::new(RwLock::new(Session::new())),
            event_tx,
            command_tx,
            command_rx: TokioMutex::new(command_rx),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Handle for status reads and refresh requests.
    pub fn session_handle(&self) -> SessionHandle {
        SessionHandle::new(
            self.command_tx.clone(),
            self.session.clone(),
            self.heartbeat.clone(),
        )
    }

    pub fn state(&self) -> SessionState {
        self.session.read().state
    }

    /// Signal graceful shutdown.
    ///
    /// Interrupts both the socket loop (a Close frame is sent) and any
    /// backoff wait.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and keep the session alive until shutdown or until the
    /// reconnect budget is exhausted.
    ///
    /// A `Failed` session stays failed: later calls return
    /// `ReconnectExhausted` without opening a socket.
    pub async fn connect(&self) -> WsResult<()> {
        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                return Ok(());
            }

            if !self.apply(SessionEvent::Connect).await {
                error!(state = %self.state(), "Session cannot connect from this state");
                return Err(WsError::ReconnectExhausted {
                    attempts: self.policy.max_attempts,
                });
            }

            match self.run_connection().await {
                Ok(()) => info!("Feed connection closed"),
                Err(e) => error!(error = %e, "Feed connection error"),
            }

            self.apply(SessionEvent::Closed).await;

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                return Ok(());
            }

            let attempt = self.session.write().record_disconnect();
            let Some(delay) = self.policy.delay_for(attempt) else {
                self.apply(SessionEvent::GiveUp).await;
                error!(
                    attempts = self.policy.max_attempts,
                    "Reconnect budget exhausted, giving up"
                );
                return Err(WsError::ReconnectExhausted {
                    attempts: self.policy.max_attempts,
                });
            };

            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            warn!(attempt, delay_ms, "Reconnecting");
            self.emit(FeedEvent::Reconnecting { attempt, delay }).await;

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    return Ok(());
                }
            }
        }
    }

    fn build_request(&self) -> WsResult<Request> {
        let mut request = self.config.url.as_str().into_client_request()?;
        let headers = request.headers_mut();

        for (name, value) in &self.config.headers {
            if RESERVED_HEADERS
                .iter()
                .any(|reserved| name.eq_ignore_ascii_case(reserved))
            {
                debug!(header = %name, "Skipping client-managed handshake header");
                continue;
            }
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WsError::InvalidHeader(format!("{name}: {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| WsError::InvalidHeader(format!("{name}: {e}")))?;
            headers.insert(header_name, header_value);
        }

        Ok(request)
    }

    async fn run_connection(&self) -> WsResult<()> {
        let request = self.build_request()?;
        info!(url = %self.config.url, "Connecting to feed");

        let (ws_stream, _response) =
            connect_async_tls_with_config(request, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        self.apply(SessionEvent::Opened).await;
        self.heartbeat.reset();
        info!("Feed socket opened");

        send_frame(&mut write, &self.sequencer.auth_frame()).await?;
        debug!("Sent auth frame");

        let mut timers = ConnectionTimers::new();
        let mut commands = self.command_rx.lock().await;
        // Drop refresh requests queued against a previous connection.
        while commands.try_recv().is_ok() {}

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text, &mut timers).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason): (u16, String) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Feed closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(?e, "Feed read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Feed stream ended");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                    }
                }

                () = sleep_until_due(timers.schedule.next_due()) => {
                    for frame in timers.schedule.pop_due(Instant::now()) {
                        send_frame(&mut write, &frame).await?;
                        debug!(kind = frame.kind(), remaining = timers.schedule.len(), "Sent scheduled frame");
                    }
                    self.maybe_complete_handshake(&mut timers).await;
                }

                () = tick(&mut timers.refresh) => {
                    self.schedule_refresh(&mut timers);
                }

                () = tick(&mut timers.heartbeat) => {
                    let session_id = self.session.read().session_id.clone();
                    send_frame(&mut write, &OutboundFrame::Heartbeat { session_id }).await?;
                    self.heartbeat.record_sent();
                }

                Some(command) = commands.recv() => {
                    match command {
                        SessionCommand::Refresh => {
                            info!("On-demand refresh requested");
                            self.schedule_refresh(&mut timers);
                        }
                    }
                }
            }
        }
    }

    async fn handle_text_message(&self, text: &str, timers: &mut ConnectionTimers) {
        self.heartbeat.record_message();

        let dispatch = match self.dispatcher.classify(text) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                warn!(error = %e, "Discarding malformed frame");
                self.emit(FeedEvent::FrameDiscarded {
                    reason: DiscardReason::Malformed,
                    count: 1,
                })
                .await;
                return;
            }
        };

        match dispatch {
            Dispatch::ChannelData {
                channel,
                rounds,
                skipped,
            } => {
                if skipped > 0 {
                    self.emit(FeedEvent::FrameDiscarded {
                        reason: DiscardReason::InvalidRound,
                        count: skipped,
                    })
                    .await;
                }
                let Some(latest) = rounds.iter().max_by_key(|r| r.sid) else {
                    debug!(channel = %channel, "Empty history, snapshot unchanged");
                    return;
                };
                debug!(
                    channel = %channel,
                    sid = latest.sid,
                    rounds = rounds.len(),
                    "Received channel snapshot"
                );
                self.emit(FeedEvent::Snapshot {
                    channel,
                    rounds,
                    received_at: Utc::now(),
                })
                .await;
            }
            Dispatch::AuthSuccess { user } => {
                if !self.apply(SessionEvent::AuthSucceeded).await {
                    debug!(%user, "Duplicate auth acknowledgment ignored");
                    return;
                }
                info!(%user, "Authenticated");
                self.session.write().user = Some(user);
                timers
                    .schedule
                    .push_plan(Instant::now(), self.sequencer.subscription_plan());
                self.maybe_complete_handshake(timers).await;
            }
            Dispatch::SessionInit { session_id } => {
                info!(%session_id, "Session established");
                self.session.write().session_id = Some(session_id);
            }
            Dispatch::SubscriptionAck { plugin } => {
                debug!(%plugin, "Subscription acknowledged");
            }
            Dispatch::HeartbeatAck => {
                self.heartbeat.record_ack();
            }
            Dispatch::Ignored { tag } => {
                debug!(tag, "Ignoring unrecognized frame");
                self.emit(FeedEvent::FrameDiscarded {
                    reason: DiscardReason::Unrecognized,
                    count: 1,
                })
                .await;
            }
        }
    }

    /// Promote to `Active` once every staged subscription is out, then arm
    /// the refresh and heartbeat intervals.
    async fn maybe_complete_handshake(&self, timers: &mut ConnectionTimers) {
        if self.state() != SessionState::SubscribingChannels || !timers.schedule.is_empty() {
            return;
        }
        if !self.apply(SessionEvent::SubscriptionsSent).await {
            return;
        }

        let now = Instant::now();
        timers.refresh = Some(interval_from(now, self.sequencer.refresh_interval()));
        timers.heartbeat = Some(interval_from(now, self.heartbeat.interval()));
        info!(
            channels = self.sequencer.channels().len(),
            "Subscriptions sent, session active"
        );
    }

    fn schedule_refresh(&self, timers: &mut ConnectionTimers) {
        if !self.session.read().can_refresh() {
            debug!("Refresh skipped, session not ready");
            return;
        }
        let plan = self.sequencer.refresh_plan();
        debug!(frames = plan.len(), "Scheduling subscription refresh");
        timers.schedule.push_plan(Instant::now(), plan);
    }

    /// Apply a session event and publish the new state.
    async fn apply(&self, event: SessionEvent) -> bool {
        let next = {
            let mut session = self.session.write();
            session.apply(event).then_some(session.state)
        };

        match next {
            Some(state) => {
                debug!(?event, state = %state, "Session transition");
                self.emit(FeedEvent::StateChanged { state }).await;
                true
            }
            None => {
                debug!(?event, state = %self.state(), "Session event rejected");
                false
            }
        }
    }

    async fn emit(&self, event: FeedEvent) {
        if self.event_tx.send(event).await.is_err() {
            warn!("Feed event receiver dropped");
        }
    }
}

async fn send_frame(write: &mut WsSink, frame: &OutboundFrame) -> WsResult<()> {
    let text = frame.encode()?;
    write.send(Message::Text(text)).await?;
    Ok(())
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Interval whose first tick is one `period` after `now`.
fn interval_from(now: Instant, period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(now + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(config: ConnectionConfig) -> ConnectionManager {
        let (tx, _rx) = mpsc::channel(16);
        ConnectionManager::new(config, tx)
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_base_delay_ms, 5000);
        assert_eq!(config.heartbeat_interval_ms, 25000);
    }

    #[test]
    fn test_reconnect_policy_linear_then_exhausted() {
        let policy = ReconnectPolicy::new(Duration::from_secs(5), 5);
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| policy.delay_for(attempt).unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 15, 20, 25]);
        assert_eq!(policy.delay_for(6), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn test_build_request_skips_reserved_headers() {
        let config = ConnectionConfig {
            url: "wss://feed.example.com/websocket".to_string(),
            headers: vec![
                ("Origin".to_string(), "https://play.example.com".to_string()),
                ("User-Agent".to_string(), "sicbo-feed/0.1".to_string()),
                (
                    "Sec-WebSocket-Extensions".to_string(),
                    "permessage-deflate".to_string(),
                ),
            ],
            ..ConnectionConfig::default()
        };
        let request = manager(config).build_request().unwrap();
        let headers = request.headers();
        assert_eq!(headers["origin"], "https://play.example.com");
        assert_eq!(headers["user-agent"], "sicbo-feed/0.1");
        assert!(headers.get("sec-websocket-extensions").is_none());
        assert!(headers.get("sec-websocket-key").is_some());
    }

    #[test]
    fn test_build_request_rejects_bad_header() {
        let config = ConnectionConfig {
            url: "ws://127.0.0.1:1".to_string(),
            headers: vec![("Bad Header".to_string(), "x".to_string())],
            ..ConnectionConfig::default()
        };
        assert!(matches!(
            manager(config).build_request(),
            Err(WsError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_before_connect_returns_ok() {
        let manager = manager(ConnectionConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ..ConnectionConfig::default()
        });
        manager.shutdown();
        assert!(manager.connect().await.is_ok());
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_session_never_reconnects() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let manager = manager(ConnectionConfig {
            url: format!("ws://{addr}/websocket"),
            max_reconnect_attempts: 0,
            ..ConnectionConfig::default()
        });

        // Accept and drop the socket so the WebSocket handshake fails.
        let (first, ()) = tokio::join!(manager.connect(), async {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });
        assert!(matches!(
            first,
            Err(WsError::ReconnectExhausted { attempts: 0 })
        ));
        assert_eq!(manager.state(), SessionState::Failed);

        let second = manager.connect().await;
        assert!(matches!(
            second,
            Err(WsError::ReconnectExhausted { .. })
        ));
        assert_eq!(manager.state(), SessionState::Failed);

        let accepted =
            tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(accepted.is_err(), "no socket opened after Failed");
    }

    #[tokio::test]
    async fn test_refresh_skipped_when_not_authenticated() {
        let manager = manager(ConnectionConfig::default());
        let mut timers = ConnectionTimers::new();
        manager.schedule_refresh(&mut timers);
        assert!(timers.schedule.is_empty());
    }
}
