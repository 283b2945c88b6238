//! Production [`FeedQuery`] over the live feed.

use std::sync::Arc;

use chrono::Utc;
use sicbo_core::ChannelId;
use sicbo_feed::{ChannelSnapshot, RoundHistoryStore};
use sicbo_predict::OutcomePredictor;
use sicbo_telemetry::Metrics;
use sicbo_ws::SessionHandle;

use crate::error::{QueryError, QueryResult};
use crate::query::FeedQuery;
use crate::types::{
    ChannelHistory, ChannelPrediction, ChannelStatus, LatestRound, RoundView, StatusReport,
};

/// Store, session and predictor behind the API.
#[derive(Clone)]
pub struct FeedService {
    store: Arc<RoundHistoryStore>,
    session: SessionHandle,
    predictor: Arc<OutcomePredictor>,
}

impl FeedService {
    pub fn new(
        store: Arc<RoundHistoryStore>,
        session: SessionHandle,
        predictor: OutcomePredictor,
    ) -> Self {
        Self {
            store,
            session,
            predictor: Arc::new(predictor),
        }
    }

    /// Snapshot that has received at least one update.
    fn populated(&self, channel: &ChannelId) -> QueryResult<Arc<ChannelSnapshot>> {
        let snapshot = self.store.snapshot(channel)?;
        if snapshot.is_empty() {
            return Err(QueryError::NoData(channel.to_string()));
        }
        Ok(snapshot)
    }
}

impl FeedQuery for FeedService {
    fn channels(&self) -> Vec<ChannelId> {
        self.store.channels().to_vec()
    }

    fn latest_round(&self, channel: &ChannelId) -> QueryResult<LatestRound> {
        let snapshot = self.populated(channel)?;
        let round = snapshot
            .latest()
            .ok_or_else(|| QueryError::NoData(channel.to_string()))?;
        Ok(LatestRound {
            channel: channel.clone(),
            round: RoundView::from(round),
            last_updated: snapshot.updated_at(),
            timestamp: Utc::now(),
        })
    }

    fn history(&self, channel: &ChannelId, limit: usize) -> QueryResult<ChannelHistory> {
        let snapshot = self.populated(channel)?;
        let rounds: Vec<RoundView> = snapshot.history(limit).iter().map(RoundView::from).collect();
        Ok(ChannelHistory {
            channel: channel.clone(),
            count: rounds.len(),
            rounds,
            last_updated: snapshot.updated_at(),
            timestamp: Utc::now(),
        })
    }

    fn predict(&self, channel: &ChannelId) -> QueryResult<ChannelPrediction> {
        let snapshot = self.populated(channel)?;
        let prediction = self.predictor.predict(snapshot.rounds());

        let label = prediction.forecast.map_or("none", |f| f.as_str());
        Metrics::prediction(channel.as_str(), label);

        Ok(ChannelPrediction {
            channel: channel.clone(),
            latest_sid: snapshot.latest().map(|r| r.sid),
            prediction,
            timestamp: Utc::now(),
        })
    }

    fn status(&self) -> StatusReport {
        let channels = self
            .store
            .channels()
            .iter()
            .map(|channel| {
                let snapshot = self.store.snapshot(channel).ok();
                ChannelStatus {
                    channel: channel.clone(),
                    has_data: snapshot.as_ref().is_some_and(|s| !s.is_empty()),
                    rounds: snapshot.as_ref().map_or(0, |s| s.len()),
                    latest_sid: snapshot.as_ref().and_then(|s| s.latest()).map(|r| r.sid),
                    last_updated: snapshot.as_ref().and_then(|s| s.updated_at()),
                }
            })
            .collect();

        StatusReport {
            session: self.session.status(),
            heartbeat: self.session.heartbeat_stats(),
            channels,
            timestamp: Utc::now(),
        }
    }

    fn request_refresh(&self) -> QueryResult<()> {
        self.session.request_refresh()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sicbo_core::Round;
    use sicbo_ws::{ConnectionConfig, ConnectionManager, SessionState};
    use tokio::sync::mpsc;

    fn channel(name: &str) -> ChannelId {
        ChannelId::new(name).unwrap()
    }

    fn service() -> (FeedService, Arc<RoundHistoryStore>) {
        let (tx, _rx) = mpsc::channel(8);
        let manager = ConnectionManager::new(ConnectionConfig::default(), tx);
        let store = Arc::new(RoundHistoryStore::new([channel("tx"), channel("md5")]));
        let service = FeedService::new(
            store.clone(),
            manager.session_handle(),
            OutcomePredictor::default(),
        );
        (service, store)
    }

    fn rounds() -> Vec<Round> {
        vec![
            Round::new(100, 1, 2, 3).unwrap(),
            Round::new(102, 6, 6, 6).unwrap(),
            Round::new(101, 4, 5, 6).unwrap(),
        ]
    }

    #[test]
    fn test_latest_round_is_max_sid() {
        let (service, store) = service();
        store.replace(&channel("tx"), rounds(), Utc::now()).unwrap();

        let latest = service.latest_round(&channel("tx")).unwrap();
        assert_eq!(latest.round.sid, 102);
        assert_eq!(latest.round.total, 18);
        assert_eq!(latest.round.outcome, sicbo_core::Outcome::High);
        assert!(latest.last_updated.is_some());
    }

    #[test]
    fn test_no_data_before_first_snapshot() {
        let (service, _) = service();
        assert_eq!(
            service.latest_round(&channel("md5")).unwrap_err(),
            QueryError::NoData("md5".into())
        );
        assert_eq!(
            service.predict(&channel("md5")).unwrap_err(),
            QueryError::NoData("md5".into())
        );
    }

    #[test]
    fn test_unknown_channel() {
        let (service, _) = service();
        assert_eq!(
            service.history(&channel("nope"), 5).unwrap_err(),
            QueryError::ChannelNotFound("nope".into())
        );
    }

    #[test]
    fn test_history_limit_newest_first() {
        let (service, store) = service();
        store.replace(&channel("tx"), rounds(), Utc::now()).unwrap();

        let history = service.history(&channel("tx"), 2).unwrap();
        assert_eq!(history.count, 2);
        let sids: Vec<u64> = history.rounds.iter().map(|r| r.sid).collect();
        assert_eq!(sids, vec![102, 101]);
    }

    #[test]
    fn test_predict_with_short_history() {
        let (service, store) = service();
        store.replace(&channel("tx"), rounds(), Utc::now()).unwrap();

        let prediction = service.predict(&channel("tx")).unwrap();
        assert_eq!(prediction.latest_sid, Some(102));
        assert!(!prediction.prediction.success);
        assert_eq!(prediction.prediction.confidence, None);
    }

    #[test]
    fn test_status_reports_channels() {
        let (service, store) = service();
        store.replace(&channel("tx"), rounds(), Utc::now()).unwrap();

        let status = service.status();
        assert_eq!(status.session.state, SessionState::Disconnected);
        assert_eq!(status.channels.len(), 2);
        assert!(status.channels[0].has_data);
        assert_eq!(status.channels[0].rounds, 3);
        assert_eq!(status.channels[0].latest_sid, Some(102));
        assert!(!status.channels[1].has_data);
    }

    #[test]
    fn test_refresh_requires_authenticated_session() {
        let (service, _) = service();
        assert_eq!(service.request_refresh(), Err(QueryError::NotReady));
    }
}
