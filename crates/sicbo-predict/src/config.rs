//! Predictor configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the outcome predictor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Most recent rounds considered.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Fewer rounds than this yields no prediction.
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    /// The pattern estimator abstains below this many rounds.
    #[serde(default = "default_pattern_min_history")]
    pub pattern_min_history: usize,
    /// Outcomes echoed back in diagnostics.
    #[serde(default = "default_recent_display")]
    pub recent_display: usize,
}

fn default_window() -> usize {
    50
}

fn default_min_history() -> usize {
    5
}

fn default_pattern_min_history() -> usize {
    10
}

fn default_recent_display() -> usize {
    15
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            min_history: default_min_history(),
            pattern_min_history: default_pattern_min_history(),
            recent_display: default_recent_display(),
        }
    }
}

impl PredictorConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_history < 2 {
            return Err(format!(
                "min_history ({}) must be at least 2",
                self.min_history
            ));
        }
        if self.window < self.min_history {
            return Err(format!(
                "window ({}) must be at least min_history ({})",
                self.window, self.min_history
            ));
        }
        if self.pattern_min_history < 2 {
            return Err(format!(
                "pattern_min_history ({}) must be at least 2",
                self.pattern_min_history
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = PredictorConfig::default();
        assert_eq!(config.window, 50);
        assert_eq!(config.min_history, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_below_min_history_rejected() {
        let config = PredictorConfig {
            window: 3,
            ..PredictorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
