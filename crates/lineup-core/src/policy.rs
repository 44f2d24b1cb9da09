//! Match policy: which comparison results qualify and how scores normalize.

use crate::comparator::{ComparisonResult, ScoreKind};
use serde::{Deserialize, Serialize};

/// Default distance threshold for the authoritative policy.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.40;

/// Largest distance that still maps to a distinct confidence. Farther
/// results all normalize to 0 and could not be ranked, so they never qualify.
pub const MAX_RANKABLE_DISTANCE: f32 = 1.0;

/// Qualifying condition for a single comparison result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "threshold")]
pub enum Qualifier {
    /// The comparator's own `verified` flag decides.
    Verified,
    /// Distance strictly below the threshold, or confidence at or above it.
    Threshold(f32),
    /// Both of the above.
    VerifiedAndThreshold(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    pub score_kind: ScoreKind,
    pub qualifier: Qualifier,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            score_kind: ScoreKind::Distance,
            qualifier: Qualifier::Threshold(DEFAULT_DISTANCE_THRESHOLD),
        }
    }
}

impl MatchPolicy {
    pub fn distance_below(threshold: f32) -> Self {
        Self {
            score_kind: ScoreKind::Distance,
            qualifier: Qualifier::Threshold(threshold),
        }
    }

    /// Distance threshold, optionally also requiring the comparator's verdict.
    pub fn for_distance(threshold: f32, require_verified: bool) -> Self {
        let qualifier = if require_verified {
            Qualifier::VerifiedAndThreshold(threshold)
        } else {
            Qualifier::Threshold(threshold)
        };
        Self {
            score_kind: ScoreKind::Distance,
            qualifier,
        }
    }

    pub fn verified(score_kind: ScoreKind) -> Self {
        Self {
            score_kind,
            qualifier: Qualifier::Verified,
        }
    }

    /// Whether `result` satisfies the qualifying condition.
    pub fn qualifies(&self, result: &ComparisonResult) -> bool {
        if result.kind() == ScoreKind::Distance && result.score() > MAX_RANKABLE_DISTANCE {
            return false;
        }
        match self.qualifier {
            Qualifier::Verified => result.verified(),
            Qualifier::Threshold(t) => self.within_threshold(result.score(), t),
            Qualifier::VerifiedAndThreshold(t) => {
                result.verified() && self.within_threshold(result.score(), t)
            }
        }
    }

    fn within_threshold(&self, score: f32, threshold: f32) -> bool {
        match self.score_kind {
            ScoreKind::Distance => score < threshold,
            ScoreKind::Confidence => score >= threshold,
        }
    }

    /// Map a raw score onto 0–100 confidence, higher = more similar.
    pub fn normalize(&self, score: f32) -> f32 {
        normalize_score(self.score_kind, score)
    }
}

/// Distances map to `(1 - d) * 100`; confidences pass through. Clamped to [0, 100].
pub fn normalize_score(kind: ScoreKind, score: f32) -> f32 {
    let confidence = match kind {
        ScoreKind::Confidence => score,
        ScoreKind::Distance => (1.0 - score) * 100.0,
    };
    confidence.clamp(0.0, 100.0)
}
