//! Prediction result types.

use crate::estimators::{OutcomeProbabilities, PatternSignal, StreakStats};
use serde::Serialize;
use sicbo_core::Outcome;
use std::fmt;

/// Forecast label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Forecast {
    High,
    Low,
    /// Ensemble scores tied.
    Indeterminate,
}

impl Forecast {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
            Self::Indeterminate => "indeterminate",
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::High => Some(Outcome::High),
            Self::Low => Some(Outcome::Low),
            Self::Indeterminate => None,
        }
    }
}

impl From<Outcome> for Forecast {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::High => Self::High,
            Outcome::Low => Self::Low,
        }
    }
}

impl fmt::Display for Forecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight each estimator carried. Zero means the estimator abstained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weights {
    pub overall: f64,
    pub streak: f64,
    pub markov1: f64,
    pub markov2: f64,
    pub pattern: f64,
    pub total: f64,
}

/// Per-estimator breakdown behind a prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Rounds used (after windowing).
    pub total_sessions: usize,
    /// Most recent outcomes, newest first.
    pub recent_results: Vec<Outcome>,
    pub overall: OutcomeProbabilities,
    /// `prob_continue` rounded to 2 decimals.
    pub streak: StreakStats,
    pub markov1: OutcomeProbabilities,
    pub markov2: Option<OutcomeProbabilities>,
    pub pattern: Option<PatternSignal>,
    pub weights: Weights,
    /// Final normalized scores rounded to 3 decimals.
    pub weighted_scores: OutcomeProbabilities,
}

/// Forecast for the next round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Forecast>,
    /// Winning probability as a percentage, one decimal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl Prediction {
    pub(crate) fn insufficient(available: usize, required: usize) -> Self {
        Self {
            success: false,
            forecast: None,
            confidence: None,
            message: Some(format!(
                "only {available} rounds available, at least {required} required"
            )),
            diagnostics: None,
        }
    }

    pub(crate) fn unavailable(diagnostics: Diagnostics) -> Self {
        Self {
            success: false,
            forecast: Some(Forecast::Indeterminate),
            confidence: Some(0.0),
            message: Some("prediction unavailable".to_string()),
            diagnostics: Some(diagnostics),
        }
    }

    /// Confidence as shown to users, e.g. `"57.1%"`.
    pub fn confidence_display(&self) -> String {
        format!("{:.1}%", self.confidence.unwrap_or(0.0))
    }
}
