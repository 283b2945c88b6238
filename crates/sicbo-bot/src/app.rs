//! Main application orchestration.
//!
//! Coordinates all components:
//! - Feed session (connection task)
//! - Round history store
//! - Query API server
//! - Per-update forecasts in the logs

use crate::config::AppConfig;
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use sicbo_api::{run_server, FeedService};
use sicbo_core::{ChannelId, Round};
use sicbo_feed::RoundHistoryStore;
use sicbo_predict::OutcomePredictor;
use sicbo_telemetry::Metrics;
use sicbo_ws::{ConnectionManager, FeedEvent, SessionHandle, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Buffered events between the connection task and the main loop.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// How long shutdown waits for the connection task and the API server.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Main application.
pub struct Application {
    config: AppConfig,
    store: Arc<RoundHistoryStore>,
    predictor: OutcomePredictor,
    connection: Arc<ConnectionManager>,
    event_rx: mpsc::Receiver<FeedEvent>,
}

impl Application {
    /// Create a new application. Nothing connects until `run()`.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let ws_config = config.connection_config()?;
        let store = Arc::new(RoundHistoryStore::new(config.channel_ids()?));
        let predictor = OutcomePredictor::new(config.predictor.clone());

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let connection = Arc::new(ConnectionManager::new(ws_config, event_tx));

        Ok(Self {
            config,
            store,
            predictor,
            connection,
            event_rx,
        })
    }

    pub fn store(&self) -> Arc<RoundHistoryStore> {
        self.store.clone()
    }

    pub fn session_handle(&self) -> SessionHandle {
        self.connection.session_handle()
    }

    /// Query service backing the HTTP API.
    pub fn feed_service(&self) -> FeedService {
        FeedService::new(
            self.store.clone(),
            self.session_handle(),
            self.predictor.clone(),
        )
    }

    /// Run until Ctrl-C.
    ///
    /// A session that exhausts its reconnect budget does not stop the
    /// process; the API keeps serving and reports `failed`.
    pub async fn run(mut self) -> AppResult<()> {
        info!(
            url = %self.config.ws_url,
            channels = ?self.store.channels().iter().map(ChannelId::as_str).collect::<Vec<_>>(),
            "Starting application"
        );

        Metrics::session_disconnected();
        Self::record_state(SessionState::Disconnected);

        let connection = self.connection.clone();
        let mut ws_handle = tokio::spawn(async move {
            match connection.connect().await {
                Ok(()) => info!("Feed session stopped"),
                Err(e) => error!(error = %e, "Feed session failed permanently"),
            }
        });

        let api_shutdown = CancellationToken::new();
        let api_handle = self.spawn_api(api_shutdown.clone());

        info!("Entering main event loop");
        let mut snapshot_count = 0u64;

        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    if matches!(event, FeedEvent::Snapshot { .. }) {
                        snapshot_count += 1;
                    }
                    self.handle_event(event);
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(snapshot_count, "Shutting down");
        self.connection.shutdown();
        api_shutdown.cancel();

        // Keep draining so the connection task never blocks on a full channel.
        let deadline = tokio::time::sleep(SHUTDOWN_GRACE);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut ws_handle => break,
                Some(event) = self.event_rx.recv() => self.handle_event(event),
                _ = &mut deadline => {
                    warn!("Connection task did not stop in time");
                    ws_handle.abort();
                    break;
                }
            }
        }

        if let Some(handle) = api_handle {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!(error = %e, "Query API exited with error"),
                Ok(Err(e)) => error!(error = %e, "Query API task panicked"),
                Err(_) => warn!("Query API did not stop in time"),
            }
        }

        Ok(())
    }

    fn spawn_api(
        &self,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<Result<(), sicbo_api::ApiError>>> {
        if !self.config.api.enabled {
            info!("Query API disabled");
            return None;
        }
        let service = Arc::new(self.feed_service());
        let config = self.config.api.clone();
        Some(tokio::spawn(async move {
            let result = run_server(service, config, shutdown).await;
            if let Err(e) = &result {
                error!(error = %e, "Query API stopped");
            }
            result
        }))
    }

    /// Apply one event from the connection task.
    pub fn handle_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Snapshot {
                channel,
                rounds,
                received_at,
            } => self.apply_snapshot(&channel, rounds, received_at),
            FeedEvent::StateChanged { state } => {
                Self::record_state(state);
                if state.is_terminal() {
                    error!(state = %state, "Feed session failed; API stays up");
                } else {
                    info!(state = %state, "Session state changed");
                }
            }
            FeedEvent::Reconnecting { attempt, delay } => {
                Metrics::reconnect_scheduled();
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                debug!(attempt, delay_ms, "Reconnect scheduled");
            }
            FeedEvent::FrameDiscarded { reason, count } => {
                Metrics::frames_discarded(reason.as_str(), count);
            }
        }
    }

    fn record_state(state: SessionState) {
        Metrics::session_state_set(
            state.as_str(),
            SessionState::ALL.iter().map(|s| s.as_str()),
        );
        if state.is_open() {
            Metrics::session_connected();
        } else {
            Metrics::session_disconnected();
        }
    }

    fn apply_snapshot(&self, channel: &ChannelId, rounds: Vec<Round>, received_at: DateTime<Utc>) {
        let count = rounds.len();
        let latest = match self.store.replace(channel, rounds, received_at) {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "Dropping snapshot");
                return;
            }
        };

        Metrics::channel_updated(channel.as_str(), count, latest.map(|r| r.sid));

        let Some(round) = latest else {
            debug!(channel = %channel, "Empty snapshot");
            return;
        };
        info!(
            channel = %channel,
            sid = round.sid,
            d1 = round.d1,
            d2 = round.d2,
            d3 = round.d3,
            total = round.total(),
            outcome = %round.outcome(),
            rounds = count,
            "Latest round"
        );

        if let Ok(snapshot) = self.store.snapshot(channel) {
            let prediction = self.predictor.predict(snapshot.rounds());
            debug!(
                channel = %channel,
                forecast = prediction.forecast.map_or("none", |f| f.as_str()),
                confidence = %prediction.confidence_display(),
                success = prediction.success,
                "Forecast"
            );
        }
    }
}
