//! Response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sicbo_core::{ChannelId, Outcome, Round};
use sicbo_predict::Prediction;
use sicbo_ws::{HeartbeatStats, Session};

/// Error payload returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// One round with its derived total and outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundView {
    pub sid: u64,
    pub d1: u8,
    pub d2: u8,
    pub d3: u8,
    pub total: u8,
    pub outcome: Outcome,
}

impl From<&Round> for RoundView {
    fn from(round: &Round) -> Self {
        Self {
            sid: round.sid,
            d1: round.d1,
            d2: round.d2,
            d3: round.d3,
            total: round.total(),
            outcome: round.outcome(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestRound {
    pub channel: ChannelId,
    #[serde(flatten)]
    pub round: RoundView,
    pub last_updated: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelHistory {
    pub channel: ChannelId,
    pub count: usize,
    /// Newest first.
    pub rounds: Vec<RoundView>,
    pub last_updated: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelPrediction {
    pub channel: ChannelId,
    pub latest_sid: Option<u64>,
    #[serde(flatten)]
    pub prediction: Prediction,
    pub timestamp: DateTime<Utc>,
}

/// Compact forecast: label plus display confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortPrediction {
    pub channel: ChannelId,
    pub success: bool,
    pub forecast: Option<String>,
    pub confidence: String,
    pub latest_sid: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl From<ChannelPrediction> for ShortPrediction {
    fn from(p: ChannelPrediction) -> Self {
        Self {
            confidence: p.prediction.confidence_display(),
            forecast: p.prediction.forecast.map(|f| f.as_str().to_string()),
            success: p.prediction.success,
            channel: p.channel,
            latest_sid: p.latest_sid,
            timestamp: p.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub channel: ChannelId,
    pub has_data: bool,
    pub rounds: usize,
    pub latest_sid: Option<u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Session, heartbeat and per-channel data state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub session: Session,
    pub heartbeat: HeartbeatStats,
    pub channels: Vec<ChannelStatus>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
}

/// Per-channel entry of the aggregate endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChannelResult<T> {
    Ready(T),
    Unavailable(ErrorBody),
}
