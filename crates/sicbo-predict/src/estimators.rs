//! Individual estimators.
//!
//! Every function takes outcomes ordered most recent first.

use serde::Serialize;
use sicbo_core::Outcome;

/// Probability pair over the two outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutcomeProbabilities {
    pub high: f64,
    pub low: f64,
}

impl OutcomeProbabilities {
    pub const EVEN: Self = Self {
        high: 0.5,
        low: 0.5,
    };

    pub fn new(high: f64, low: f64) -> Self {
        Self { high, low }
    }

    /// `p` for `outcome`, `1 - p` for the other.
    pub fn favoring(outcome: Outcome, p: f64) -> Self {
        match outcome {
            Outcome::High => Self::new(p, 1.0 - p),
            Outcome::Low => Self::new(1.0 - p, p),
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::High => self.high,
            Outcome::Low => self.low,
        }
    }
}

/// Current run and how often runs of that length continued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreakStats {
    pub length: usize,
    pub outcome: Option<Outcome>,
    pub prob_continue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Last two equal: predict continuation.
    Repeat,
    /// Last two differ: predict a flip.
    Alternation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternSignal {
    pub prediction: Outcome,
    pub confidence: f64,
    pub kind: PatternKind,
}

const REPEAT_CONFIDENCE: f64 = 0.6;
const ALTERNATION_CONFIDENCE: f64 = 0.65;

/// Fraction of each outcome.
pub fn overall(results: &[Outcome]) -> OutcomeProbabilities {
    if results.is_empty() {
        return OutcomeProbabilities::EVEN;
    }
    let n = results.len() as f64;
    let high = results.iter().filter(|o| **o == Outcome::High).count() as f64;
    OutcomeProbabilities::new(high / n, (n - high) / n)
}

/// Length of the current run and the historical rate at which a run of
/// that length of that outcome continued.
///
/// Every window start in `0..len - length` is scanned, the current run
/// included.
pub fn streak(results: &[Outcome]) -> StreakStats {
    let Some(&current) = results.first() else {
        return StreakStats {
            length: 0,
            outcome: None,
            prob_continue: 0.5,
        };
    };

    let length = results.iter().take_while(|o| **o == current).count();

    let mut occurrences = 0u32;
    let mut continued = 0u32;
    for i in 0..results.len() - length {
        if results[i..i + length].iter().all(|o| *o == current) {
            occurrences += 1;
            if results[i + length] == current {
                continued += 1;
            }
        }
    }

    let prob_continue = if occurrences > 0 {
        f64::from(continued) / f64::from(occurrences)
    } else {
        0.5
    };

    StreakStats {
        length,
        outcome: Some(current),
        prob_continue,
    }
}

/// First-order transition from the latest outcome: share of "same"
/// versus "different" successors.
pub fn markov1(results: &[Outcome]) -> OutcomeProbabilities {
    if results.len() < 2 {
        return OutcomeProbabilities::EVEN;
    }
    let last = results[0];

    let (mut same, mut different) = (0u32, 0u32);
    for pair in results.windows(2) {
        if pair[0] == last {
            if pair[1] == last {
                same += 1;
            } else {
                different += 1;
            }
        }
    }

    let total = same + different;
    if total == 0 {
        return OutcomeProbabilities::EVEN;
    }
    OutcomeProbabilities::favoring(last, f64::from(same) / f64::from(total))
}

/// Second-order transition keyed by the two latest outcomes. `None` when
/// the history is too short or the pair was never followed.
pub fn markov2(results: &[Outcome]) -> Option<OutcomeProbabilities> {
    if results.len() < 3 {
        return None;
    }

    // [first][second][next]
    let mut table = [[[0u32; 2]; 2]; 2];
    for triple in results.windows(3) {
        table[triple[0].index()][triple[1].index()][triple[2].index()] += 1;
    }

    let counts = table[results[0].index()][results[1].index()];
    let total = counts[0] + counts[1];
    if total == 0 {
        return None;
    }
    Some(OutcomeProbabilities::new(
        f64::from(counts[Outcome::High.index()]) / f64::from(total),
        f64::from(counts[Outcome::Low.index()]) / f64::from(total),
    ))
}

/// Repeat/alternation heuristic on the two latest outcomes.
pub fn pattern(results: &[Outcome], min_history: usize) -> Option<PatternSignal> {
    if results.len() < min_history.max(2) {
        return None;
    }
    let signal = if results[0] == results[1] {
        PatternSignal {
            prediction: results[0],
            confidence: REPEAT_CONFIDENCE,
            kind: PatternKind::Repeat,
        }
    } else {
        PatternSignal {
            prediction: results[0].opposite(),
            confidence: ALTERNATION_CONFIDENCE,
            kind: PatternKind::Alternation,
        }
    };
    Some(signal)
}
