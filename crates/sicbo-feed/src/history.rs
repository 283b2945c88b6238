//! Per-channel round history.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sicbo_core::{ChannelId, Round};
use std::sync::Arc;
use tracing::debug;

/// Immutable snapshot of one channel's rounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    /// Rounds ordered by descending `sid`.
    rounds: Vec<Round>,
    /// When this snapshot was received. `None` before the first one.
    updated_at: Option<DateTime<Utc>>,
}

impl ChannelSnapshot {
    fn empty() -> Self {
        Self {
            rounds: Vec::new(),
            updated_at: None,
        }
    }

    fn new(mut rounds: Vec<Round>, received_at: DateTime<Utc>) -> Self {
        rounds.sort_unstable_by(|a, b| b.sid.cmp(&a.sid));
        Self {
            rounds,
            updated_at: Some(received_at),
        }
    }

    /// Round with the highest `sid`.
    pub fn latest(&self) -> Option<&Round> {
        self.rounds.first()
    }

    /// Up to `limit` rounds, newest first.
    pub fn history(&self, limit: usize) -> &[Round] {
        &self.rounds[..limit.min(self.rounds.len())]
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// Round history store keyed by channel.
///
/// The channel set is fixed at construction.
pub struct RoundHistoryStore {
    /// Channels in configuration order.
    channels: Vec<ChannelId>,
    snapshots: DashMap<ChannelId, Arc<ChannelSnapshot>>,
}

impl RoundHistoryStore {
    pub fn new(channels: impl IntoIterator<Item = ChannelId>) -> Self {
        let channels: Vec<ChannelId> = channels.into_iter().collect();
        let snapshots = DashMap::with_capacity(channels.len());
        for channel in &channels {
            snapshots.insert(channel.clone(), Arc::new(ChannelSnapshot::empty()));
        }
        Self {
            channels,
            snapshots,
        }
    }

    /// Configured channels, in configuration order.
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.snapshots.contains_key(channel)
    }

    /// Replace a channel's snapshot wholesale. Returns the new latest round.
    pub fn replace(
        &self,
        channel: &ChannelId,
        rounds: Vec<Round>,
        received_at: DateTime<Utc>,
    ) -> FeedResult<Option<Round>> {
        let mut entry = self
            .snapshots
            .get_mut(channel)
            .ok_or_else(|| FeedError::ChannelNotFound(channel.to_string()))?;

        let snapshot = Arc::new(ChannelSnapshot::new(rounds, received_at));
        let latest = snapshot.latest().copied();
        debug!(
            channel = %channel,
            rounds = snapshot.len(),
            sid = latest.map(|r| r.sid),
            "Snapshot replaced"
        );
        *entry = snapshot;
        Ok(latest)
    }

    /// Current snapshot for a channel.
    pub fn snapshot(&self, channel: &ChannelId) -> FeedResult<Arc<ChannelSnapshot>> {
        self.snapshots
            .get(channel)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FeedError::ChannelNotFound(channel.to_string()))
    }

    /// Highest-`sid` round, or `None` when the channel has no data.
    pub fn latest_round(&self, channel: &ChannelId) -> FeedResult<Option<Round>> {
        Ok(self.snapshot(channel)?.latest().copied())
    }

    /// Up to `limit` rounds by descending `sid`.
    pub fn history(&self, channel: &ChannelId, limit: usize) -> FeedResult<Vec<Round>> {
        Ok(self.snapshot(channel)?.history(limit).to_vec())
    }

    pub fn last_updated(&self, channel: &ChannelId) -> FeedResult<Option<DateTime<Utc>>> {
        Ok(self.snapshot(channel)?.updated_at())
    }

    pub fn has_data(&self, channel: &ChannelId) -> bool {
        self.snapshot(channel).is_ok_and(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn channel(name: &str) -> ChannelId {
        ChannelId::new(name).unwrap()
    }

    fn round(sid: u64, d1: u8, d2: u8, d3: u8) -> Round {
        Round::new(sid, d1, d2, d3).unwrap()
    }

    fn store() -> RoundHistoryStore {
        RoundHistoryStore::new([channel("tx"), channel("md5")])
    }

    #[test]
    fn test_new_store_has_no_data() {
        let store = store();
        assert_eq!(store.channels(), &[channel("tx"), channel("md5")]);
        assert_eq!(store.latest_round(&channel("tx")), Ok(None));
        assert_eq!(store.last_updated(&channel("tx")), Ok(None));
        assert!(!store.has_data(&channel("md5")));
    }

    #[test]
    fn test_latest_round_is_max_sid() {
        let store = store();
        let md5 = channel("md5");
        let latest = assert_ok!(store.replace(
            &md5,
            vec![round(101, 3, 4, 5), round(102, 6, 6, 6), round(99, 1, 1, 2)],
            Utc::now(),
        ));

        let latest = latest.unwrap();
        assert_eq!(latest.sid, 102);
        assert_eq!(latest.total(), 18);
        assert_eq!(latest.outcome(), sicbo_core::Outcome::High);
        assert_eq!(store.latest_round(&md5), Ok(Some(latest)));
        assert!(store.last_updated(&md5).unwrap().is_some());
    }

    #[test]
    fn test_history_descending_and_limited() {
        let store = store();
        let tx = channel("tx");
        store
            .replace(
                &tx,
                vec![round(5, 1, 1, 1), round(7, 2, 2, 2), round(6, 3, 3, 3)],
                Utc::now(),
            )
            .unwrap();

        let sids: Vec<u64> = store.history(&tx, 2).unwrap().iter().map(|r| r.sid).collect();
        assert_eq!(sids, vec![7, 6]);
        assert_eq!(store.history(&tx, 100).unwrap().len(), 3);
        assert!(store.history(&tx, 0).unwrap().is_empty());
    }

    #[test]
    fn test_replace_not_merge() {
        let store = store();
        let tx = channel("tx");
        store
            .replace(&tx, vec![round(1, 1, 2, 3), round(2, 4, 5, 6)], Utc::now())
            .unwrap();
        store
            .replace(&tx, vec![round(3, 6, 6, 6)], Utc::now())
            .unwrap();

        let sids: Vec<u64> = store.history(&tx, 10).unwrap().iter().map(|r| r.sid).collect();
        assert_eq!(sids, vec![3]);
    }

    #[test]
    fn test_replace_with_empty_reports_no_data() {
        let store = store();
        let tx = channel("tx");
        store
            .replace(&tx, vec![round(1, 1, 2, 3)], Utc::now())
            .unwrap();
        assert_eq!(store.replace(&tx, Vec::new(), Utc::now()), Ok(None));
        assert_eq!(store.latest_round(&tx), Ok(None));
        assert!(!store.has_data(&tx));
    }

    #[test]
    fn test_old_snapshot_survives_replace() {
        let store = store();
        let tx = channel("tx");
        store
            .replace(&tx, vec![round(1, 1, 2, 3)], Utc::now())
            .unwrap();
        let held = store.snapshot(&tx).unwrap();

        store
            .replace(&tx, vec![round(2, 6, 6, 6)], Utc::now())
            .unwrap();

        assert_eq!(held.latest().map(|r| r.sid), Some(1));
        assert_eq!(store.latest_round(&tx).unwrap().map(|r| r.sid), Some(2));
    }

    #[test]
    fn test_unknown_channel() {
        let store = store();
        let nope = channel("nope");
        assert_eq!(
            store.latest_round(&nope),
            Err(FeedError::ChannelNotFound("nope".to_string()))
        );
        assert!(store.replace(&nope, Vec::new(), Utc::now()).is_err());
        assert!(!store.contains(&nope));
        assert!(!store.has_data(&nope));
    }
}
