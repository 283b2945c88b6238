//! Round and outcome types.
//!
//! A round is one resolved throw of three dice. The feed assigns each
//! round a sequence number (`sid`); totals of 11 and above are "high",
//! everything below is "low".

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest valid die face.
pub const MIN_FACE: u8 = 1;
/// Largest valid die face.
pub const MAX_FACE: u8 = 6;
/// Totals at or above this value are classified as [`Outcome::High`].
pub const HIGH_THRESHOLD: u8 = 11;

/// Binary classification of a round total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    High,
    Low,
}

impl Outcome {
    /// Both outcomes, in a fixed order usable for table indexing.
    pub const ALL: [Outcome; 2] = [Outcome::High, Outcome::Low];

    /// Classify a dice total.
    pub fn from_total(total: u8) -> Self {
        if total >= HIGH_THRESHOLD {
            Self::High
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::High => Self::Low,
            Self::Low => Self::High,
        }
    }

    /// Stable index (High = 0, Low = 1).
    pub fn index(self) -> usize {
        match self {
            Self::High => 0,
            Self::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of a round, before face validation.
#[derive(Debug, Deserialize)]
struct RawRound {
    sid: u64,
    d1: u8,
    d2: u8,
    d3: u8,
}

impl TryFrom<RawRound> for Round {
    type Error = CoreError;

    fn try_from(raw: RawRound) -> Result<Self> {
        Round::new(raw.sid, raw.d1, raw.d2, raw.d3)
    }
}

/// One resolved round.
///
/// Faces are validated on construction, so `total()` is always in
/// `3..=18`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRound")]
pub struct Round {
    /// Feed-assigned sequence number, unique within one snapshot.
    pub sid: u64,
    pub d1: u8,
    pub d2: u8,
    pub d3: u8,
}

impl Round {
    /// Create a round, rejecting faces outside `1..=6`.
    pub fn new(sid: u64, d1: u8, d2: u8, d3: u8) -> Result<Self> {
        for face in [d1, d2, d3] {
            if !(MIN_FACE..=MAX_FACE).contains(&face) {
                return Err(CoreError::InvalidFace { sid, face });
            }
        }
        Ok(Self { sid, d1, d2, d3 })
    }

    pub fn faces(&self) -> [u8; 3] {
        [self.d1, self.d2, self.d3]
    }

    pub fn total(&self) -> u8 {
        self.d1 + self.d2 + self.d3
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_total(self.total())
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} ({},{},{}) = {} {}",
            self.sid,
            self.d1,
            self.d2,
            self.d3,
            self.total(),
            self.outcome()
        )
    }
}
