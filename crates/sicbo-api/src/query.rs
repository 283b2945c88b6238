//! Read side consumed by the HTTP handlers.

use sicbo_core::ChannelId;

use crate::error::QueryResult;
use crate::types::{ChannelHistory, ChannelPrediction, LatestRound, StatusReport};

/// Queries over the live feed.
#[cfg_attr(test, mockall::automock)]
pub trait FeedQuery: Send + Sync {
    /// Configured channels, in configuration order.
    fn channels(&self) -> Vec<ChannelId>;

    /// Highest-sid round of the current snapshot.
    fn latest_round(&self, channel: &ChannelId) -> QueryResult<LatestRound>;

    /// Up to `limit` rounds, newest first.
    fn history(&self, channel: &ChannelId, limit: usize) -> QueryResult<ChannelHistory>;

    fn predict(&self, channel: &ChannelId) -> QueryResult<ChannelPrediction>;

    fn status(&self) -> StatusReport;

    /// Queue a subscription refresh on the live session.
    fn request_refresh(&self) -> QueryResult<()>;
}
