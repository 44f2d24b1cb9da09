//! Comparator boundary: the opaque face-comparison capability.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// How a comparator reports similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Lower = more similar.
    Distance,
    /// Percentage in [0, 100]. Higher = more similar.
    Confidence,
}

/// Per-candidate comparison failure. Never fatal to a scan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparisonFailure {
    #[error("image could not be decoded: {0}")]
    Decode(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("image unreadable: {0}")]
    Unreadable(String),
    #[error("comparison timed out after {0:?}")]
    TimedOut(std::time::Duration),
    #[error("expected {expected:?} score, comparator reported {actual:?}")]
    UnexpectedScoreKind { expected: ScoreKind, actual: ScoreKind },
    #[error("invalid {kind:?} score: {score}")]
    InvalidScore { kind: ScoreKind, score: f32 },
}

/// Validated result of one (query, reference) comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonResult {
    verified: bool,
    score: f32,
    kind: ScoreKind,
}

impl ComparisonResult {
    /// Build a result, rejecting non-finite scores, negative distances and
    /// confidences outside [0, 100].
    pub fn new(verified: bool, score: f32, kind: ScoreKind) -> Result<Self, ComparisonFailure> {
        let valid = score.is_finite()
            && match kind {
                ScoreKind::Distance => score >= 0.0,
                ScoreKind::Confidence => (0.0..=100.0).contains(&score),
            };
        if !valid {
            return Err(ComparisonFailure::InvalidScore { kind, score });
        }
        Ok(Self {
            verified,
            score,
            kind,
        })
    }

    pub fn distance(verified: bool, distance: f32) -> Result<Self, ComparisonFailure> {
        Self::new(verified, distance, ScoreKind::Distance)
    }

    pub fn confidence(verified: bool, confidence: f32) -> Result<Self, ComparisonFailure> {
        Self::new(verified, confidence, ScoreKind::Confidence)
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn kind(&self) -> ScoreKind {
        self.kind
    }
}

/// Face comparison capability.
///
/// Implementations must be safe to call from several threads; the daemon may
/// run comparisons for different candidates concurrently.
pub trait Comparator: Send + Sync {
    fn compare(&self, query: &Path, reference: &Path) -> Result<ComparisonResult, ComparisonFailure>;

    /// Hint that `image` will not be compared again (its file has been removed).
    fn release(&self, _image: &Path) {}
}

impl<C: Comparator + ?Sized> Comparator for std::sync::Arc<C> {
    fn compare(&self, query: &Path, reference: &Path) -> Result<ComparisonResult, ComparisonFailure> {
        (**self).compare(query, reference)
    }

    fn release(&self, image: &Path) {
        (**self).release(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_nan_score() {
        let err = ComparisonResult::distance(true, f32::NAN).unwrap_err();
        assert!(matches!(err, ComparisonFailure::InvalidScore { .. }));
    }

    #[test]
    fn test_rejects_negative_distance() {
        assert!(ComparisonResult::distance(true, -0.1).is_err());
        assert!(ComparisonResult::distance(true, 0.0).is_ok());
    }

    #[test]
    fn test_confidence_range() {
        assert!(ComparisonResult::confidence(true, 100.0).is_ok());
        assert!(ComparisonResult::confidence(true, 100.5).is_err());
        assert!(ComparisonResult::confidence(false, -1.0).is_err());
    }

    #[test]
    fn test_accessors() {
        let r = ComparisonResult::distance(false, 0.25).unwrap();
        assert!(!r.verified());
        assert_eq!(r.score(), 0.25);
        assert_eq!(r.kind(), ScoreKind::Distance);
    }
}
