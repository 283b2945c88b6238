//! Prometheus metrics for the feed client.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter, CounterVec,
    Encoder, Gauge, GaugeVec, IntCounter, TextEncoder,
};

/// Feed socket state (1 = open, 0 = closed).
pub static SESSION_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "sicbo_session_connected",
        "Feed socket state (1=open)"
    )
    .unwrap()
});

/// Session state machine current state.
/// Labels: state
pub static SESSION_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sicbo_session_state",
        "Session state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnect attempts scheduled.
pub static RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sicbo_reconnect_total",
        "Total reconnect attempts scheduled"
    )
    .unwrap()
});

/// Inbound frames or rounds dropped.
/// Labels: reason (malformed/unrecognized/invalid_round)
pub static FRAMES_DISCARDED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sicbo_frames_discarded_total",
        "Total inbound frames or rounds discarded",
        &["reason"]
    )
    .unwrap()
});

/// Rounds held in the current snapshot.
pub static CHANNEL_ROUNDS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sicbo_channel_rounds",
        "Rounds in the current channel snapshot",
        &["channel"]
    )
    .unwrap()
});

/// Highest round sequence number seen per channel.
pub static CHANNEL_LATEST_SID: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sicbo_channel_latest_sid",
        "Sequence number of the latest round per channel",
        &["channel"]
    )
    .unwrap()
});

/// Snapshot replacements per channel.
pub static CHANNEL_UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sicbo_channel_updates_total",
        "Total channel snapshot replacements",
        &["channel"]
    )
    .unwrap()
});

/// Predictions computed.
/// Labels: channel, forecast (high/low/indeterminate/none)
pub static PREDICTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sicbo_predictions_total",
        "Total predictions computed",
        &["channel", "forecast"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn session_connected() {
        SESSION_CONNECTED.set(1.0);
    }

    pub fn session_disconnected() {
        SESSION_CONNECTED.set(0.0);
    }

    /// Set the session state gauge.
    /// Only `active` is set to 1; every other entry of `states` is set to 0.
    pub fn session_state_set<'a>(active: &str, states: impl IntoIterator<Item = &'a str>) {
        for s in states {
            SESSION_STATE.with_label_values(&[s]).set(0.0);
        }
        SESSION_STATE.with_label_values(&[active]).set(1.0);
    }

    pub fn reconnect_scheduled() {
        RECONNECT_TOTAL.inc();
    }

    pub fn frames_discarded(reason: &str, count: usize) {
        FRAMES_DISCARDED_TOTAL
            .with_label_values(&[reason])
            .inc_by(count as f64);
    }

    /// Record a snapshot replacement.
    pub fn channel_updated(channel: &str, rounds: usize, latest_sid: Option<u64>) {
        CHANNEL_UPDATES_TOTAL.with_label_values(&[channel]).inc();
        CHANNEL_ROUNDS
            .with_label_values(&[channel])
            .set(rounds as f64);
        if let Some(sid) = latest_sid {
            CHANNEL_LATEST_SID
                .with_label_values(&[channel])
                .set(sid as f64);
        }
    }

    pub fn prediction(channel: &str, forecast: &str) {
        PREDICTIONS_TOTAL
            .with_label_values(&[channel, forecast])
            .inc();
    }

    /// Render every registered metric in Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_gauge_one_hot() {
        let states = ["disconnected", "connecting", "active"];
        Metrics::session_state_set("connecting", states);
        Metrics::session_state_set("active", states);

        assert_eq!(SESSION_STATE.with_label_values(&["active"]).get(), 1.0);
        assert_eq!(SESSION_STATE.with_label_values(&["connecting"]).get(), 0.0);
    }

    #[test]
    fn test_gather_text_contains_recorded_metrics() {
        Metrics::channel_updated("test_gather", 12, Some(102));
        Metrics::frames_discarded("malformed", 2);
        Metrics::prediction("test_gather", "high");

        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("sicbo_channel_rounds{channel=\"test_gather\"} 12"));
        assert!(text.contains("sicbo_channel_latest_sid{channel=\"test_gather\"} 102"));
        assert!(text.contains("sicbo_frames_discarded_total"));
        assert!(text.contains("sicbo_predictions_total"));
    }
}
