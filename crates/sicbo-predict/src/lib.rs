//! Ensemble next-outcome predictor.
//!
//! Combines five estimators over the recent outcome sequence (overall
//! frequency, streak continuation, first- and second-order Markov, and a
//! short-pattern heuristic) into one weighted forecast with a full
//! diagnostic breakdown.
//!
//! Everything here is pure: the same history always yields the same
//! prediction.

pub mod config;
pub mod estimators;
pub mod predictor;
pub mod types;

pub use config::PredictorConfig;
pub use estimators::{OutcomeProbabilities, PatternKind, PatternSignal, StreakStats};
pub use predictor::OutcomePredictor;
pub use types::{Diagnostics, Forecast, Prediction, Weights};
