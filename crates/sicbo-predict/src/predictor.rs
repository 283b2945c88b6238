//! Weighted ensemble over the estimators.

use crate::config::PredictorConfig;
use crate::estimators::{self, OutcomeProbabilities, PatternSignal, StreakStats};
use crate::types::{Diagnostics, Forecast, Prediction, Weights};
use sicbo_core::{Outcome, Round};
use tracing::debug;

const W_OVERALL: f64 = 1.0;
const W_STREAK: f64 = 1.0;
const W_STREAK_LONG: f64 = 2.0;
/// Runs at least this long get `W_STREAK_LONG`.
const LONG_STREAK: usize = 3;
const W_MARKOV1: f64 = 1.5;
const W_MARKOV2: f64 = 2.0;
const W_PATTERN_STRONG: f64 = 1.2;
const W_PATTERN_WEAK: f64 = 0.5;
/// Pattern confidence above this earns `W_PATTERN_STRONG`.
const PATTERN_STRONG_ABOVE: f64 = 0.6;

/// Accumulated per-outcome scores.
#[derive(Debug, Default)]
struct Scores {
    high: f64,
    low: f64,
    total_weight: f64,
}

impl Scores {
    fn add(&mut self, p: OutcomeProbabilities, weight: f64) {
        self.high += p.high * weight;
        self.low += p.low * weight;
        self.total_weight += weight;
    }

    fn normalized(&self) -> Option<OutcomeProbabilities> {
        if self.total_weight == 0.0 {
            return None;
        }
        let high = self.high / self.total_weight;
        let low = self.low / self.total_weight;
        (high.is_finite() && low.is_finite()).then_some(OutcomeProbabilities::new(high, low))
    }
}

/// Next-outcome predictor.
#[derive(Debug, Clone, Default)]
pub struct OutcomePredictor {
    config: PredictorConfig,
}

impl OutcomePredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Outcomes of the newest `window` rounds, newest first.
    pub fn recent_outcomes(&self, history: &[Round]) -> Vec<Outcome> {
        let mut rounds: Vec<&Round> = history.iter().collect();
        rounds.sort_unstable_by(|a, b| b.sid.cmp(&a.sid));
        rounds
            .into_iter()
            .take(self.config.window)
            .map(Round::outcome)
            .collect()
    }

    /// Forecast the next round from `history` (any order).
    pub fn predict(&self, history: &[Round]) -> Prediction {
        self.predict_outcomes(&self.recent_outcomes(history))
    }

    /// Forecast from outcomes already ordered newest first.
    pub fn predict_outcomes(&self, results: &[Outcome]) -> Prediction {
        if results.len() < self.config.min_history {
            return Prediction::insufficient(results.len(), self.config.min_history);
        }

        let overall = estimators::overall(results);
        let streak = estimators::streak(results);
        let markov1 = estimators::markov1(results);
        let markov2 = estimators::markov2(results);
        let pattern = estimators::pattern(results, self.config.pattern_min_history);

        let weights = weights_for(&streak, markov2.is_some(), pattern.as_ref());

        let mut scores = Scores::default();
        scores.add(overall, weights.overall);
        scores.add(
            match streak.outcome {
                Some(outcome) => OutcomeProbabilities::favoring(outcome, streak.prob_continue),
                None => OutcomeProbabilities::EVEN,
            },
            weights.streak,
        );
        scores.add(markov1, weights.markov1);
        if let Some(m2) = markov2 {
            scores.add(m2, weights.markov2);
        }
        if let Some(signal) = &pattern {
            scores.add(
                OutcomeProbabilities::favoring(signal.prediction, signal.confidence),
                weights.pattern,
            );
        }

        let normalized = scores.normalized();
        let diagnostics = Diagnostics {
            total_sessions: results.len(),
            recent_results: results
                .iter()
                .take(self.config.recent_display)
                .copied()
                .collect(),
            overall,
            streak: StreakStats {
                prob_continue: round_to(streak.prob_continue, 2),
                ..streak
            },
            markov1,
            markov2,
            pattern,
            weights,
            weighted_scores: normalized
                .map(|p| OutcomeProbabilities::new(round_to(p.high, 3), round_to(p.low, 3)))
                .unwrap_or(OutcomeProbabilities::new(0.0, 0.0)),
        };

        let Some(final_p) = normalized else {
            debug!(total_weight = scores.total_weight, "Degenerate ensemble scores");
            return Prediction::unavailable(diagnostics);
        };

        let (forecast, winning) = if final_p.high > final_p.low {
            (Forecast::High, final_p.high)
        } else if final_p.low > final_p.high {
            (Forecast::Low, final_p.low)
        } else {
            (Forecast::Indeterminate, 0.0)
        };
        let confidence = round_to(winning * 100.0, 1);

        debug!(
            forecast = %forecast,
            confidence,
            sessions = results.len(),
            "Prediction computed"
        );

        Prediction {
            success: true,
            forecast: Some(forecast),
            confidence: Some(confidence),
            message: None,
            diagnostics: Some(diagnostics),
        }
    }
}

fn weights_for(
    streak: &StreakStats,
    has_markov2: bool,
    pattern: Option<&PatternSignal>,
) -> Weights {
    let streak_w = if streak.length >= LONG_STREAK {
        W_STREAK_LONG
    } else {
        W_STREAK
    };
    let markov2_w = if has_markov2 { W_MARKOV2 } else { 0.0 };
    let pattern_w = match pattern {
        Some(p) if p.confidence > PATTERN_STRONG_ABOVE => W_PATTERN_STRONG,
        Some(_) => W_PATTERN_WEAK,
        None => 0.0,
    };

    Weights {
        overall: W_OVERALL,
        streak: streak_w,
        markov1: W_MARKOV1,
        markov2: markov2_w,
        pattern: pattern_w,
        total: W_OVERALL + streak_w + W_MARKOV1 + markov2_w + pattern_w,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
