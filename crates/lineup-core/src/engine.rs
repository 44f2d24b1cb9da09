//! Identification engine: scores a query image against every gallery entry
//! and keeps the best qualifying candidate.

use crate::comparator::{Comparator, ComparisonFailure, ComparisonResult};
use crate::policy::MatchPolicy;
use crate::types::{GalleryEntry, IdentificationOutcome, OutcomeError};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked before each comparison.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Gallery entries offered to the scan.
    pub candidates: usize,
    /// Comparator results observed (successes and failures).
    pub compared: usize,
    /// Results that satisfied the policy's qualifier.
    pub qualified: usize,
    /// Isolated per-candidate comparison failures.
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub outcome: IdentificationOutcome,
    pub stats: ScanStats,
}

#[derive(Debug, Clone)]
struct Candidate {
    identifier: String,
    confidence: f32,
}

/// Running-best accumulator.
///
/// Results must be observed in gallery enumeration order: a candidate only
/// replaces the current best on a strictly higher confidence, so the first
/// of several equal maxima wins.
#[derive(Debug)]
pub struct Scan {
    policy: MatchPolicy,
    best: Option<Candidate>,
    stats: ScanStats,
}

impl Scan {
    pub fn new(policy: MatchPolicy, candidates: usize) -> Self {
        Self {
            policy,
            best: None,
            stats: ScanStats {
                candidates,
                ..ScanStats::default()
            },
        }
    }

    pub fn observe(
        &mut self,
        entry: &GalleryEntry,
        result: Result<ComparisonResult, ComparisonFailure>,
    ) {
        self.stats.compared += 1;

        let result = result.and_then(|r| {
            if r.kind() == self.policy.score_kind {
                Ok(r)
            } else {
                Err(ComparisonFailure::UnexpectedScoreKind {
                    expected: self.policy.score_kind,
                    actual: r.kind(),
                })
            }
        });

        let result = match result {
            Ok(r) => r,
            Err(failure) => {
                self.stats.failures += 1;
                tracing::warn!(
                    identifier = %entry.identifier,
                    reference = %entry.reference_image.display(),
                    error = %failure,
                    "comparison failed; candidate skipped"
                );
                return;
            }
        };

        if !self.policy.qualifies(&result) {
            tracing::debug!(
                identifier = %entry.identifier,
                verified = result.verified(),
                score = result.score(),
                "candidate below threshold"
            );
            return;
        }
        self.stats.qualified += 1;

        let confidence = self.policy.normalize(result.score());
        tracing::debug!(identifier = %entry.identifier, confidence, "candidate qualifies");

        let is_better = match &self.best {
            None => true,
            Some(prev) => confidence > prev.confidence,
        };
        if is_better {
            self.best = Some(Candidate {
                identifier: entry.identifier.clone(),
                confidence,
            });
        }
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn finish(self) -> ScanReport {
        let outcome = match self.best {
            Some(best) => IdentificationOutcome::Match {
                identifier: best.identifier,
                confidence: best.confidence,
            },
            None => IdentificationOutcome::NoMatch,
        };
        ScanReport {
            outcome,
            stats: self.stats,
        }
    }

    /// Abort the scan with an error outcome, keeping the counters gathered so far.
    pub fn abort(self, reason: OutcomeError) -> ScanReport {
        ScanReport {
            outcome: IdentificationOutcome::Error { reason },
            stats: self.stats,
        }
    }
}

/// Confirm the query image can be opened at all.
pub fn check_query_readable(query: &Path) -> Result<(), OutcomeError> {
    let unreadable = |detail: String| OutcomeError::InputUnreadable {
        path: query.to_path_buf(),
        detail,
    };
    let file = std::fs::File::open(query).map_err(|e| unreadable(e.to_string()))?;
    let meta = file.metadata().map_err(|e| unreadable(e.to_string()))?;
    if !meta.is_file() {
        return Err(unreadable("not a regular file".into()));
    }
    Ok(())
}

/// Identify `query` against `gallery`, returning only the decision.
pub fn identify<C: Comparator + ?Sized>(
    query: &Path,
    gallery: &[GalleryEntry],
    comparator: &C,
    policy: &MatchPolicy,
) -> IdentificationOutcome {
    scan(query, gallery, comparator, policy).outcome
}

/// Identify `query` against `gallery` with scan statistics.
pub fn scan<C: Comparator + ?Sized>(
    query: &Path,
    gallery: &[GalleryEntry],
    comparator: &C,
    policy: &MatchPolicy,
) -> ScanReport {
    scan_with(query, gallery, comparator, policy, None)
}

/// Sequential scan with optional cancellation.
pub fn scan_with<C: Comparator + ?Sized>(
    query: &Path,
    gallery: &[GalleryEntry],
    comparator: &C,
    policy: &MatchPolicy,
    cancel: Option<&CancelToken>,
) -> ScanReport {
    let mut scan = Scan::new(*policy, gallery.len());

    if let Err(reason) = check_query_readable(query) {
        tracing::warn!(error = %reason, "query image rejected");
        return scan.abort(reason);
    }

    for entry in gallery {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            tracing::info!(compared = scan.stats().compared, "scan cancelled");
            return scan.abort(OutcomeError::Cancelled);
        }
        let result = comparator.compare(query, &entry.reference_image);
        scan.observe(entry, result);
    }

    let report = scan.finish();
    tracing::info!(
        candidates = report.stats.candidates,
        qualified = report.stats.qualified,
        failures = report.stats.failures,
        matched = report.outcome.is_match(),
        "scan complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::ScoreKind;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    /// Comparator double answering from a table keyed by reference file name.
    #[derive(Default)]
    struct ScriptedComparator {
        answers: HashMap<String, Result<ComparisonResult, ComparisonFailure>>,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl ScriptedComparator {
        fn with(mut self, name: &str, answer: Result<ComparisonResult, ComparisonFailure>) -> Self {
            self.answers.insert(name.to_string(), answer);
            self
        }

        fn distance(self, name: &str, d: f32) -> Self {
            self.with(name, ComparisonResult::distance(true, d))
        }

        fn failing(self, name: &str) -> Self {
            self.with(name, Err(ComparisonFailure::Decode("corrupt jpeg".into())))
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Comparator for ScriptedComparator {
        fn compare(&self, _query: &Path, reference: &Path) -> Result<ComparisonResult, ComparisonFailure> {
            self.calls.lock().unwrap().push(reference.to_path_buf());
            let name = reference.file_name().unwrap().to_string_lossy().into_owned();
            self.answers
                .get(&name)
                .cloned()
                .unwrap_or_else(|| Err(ComparisonFailure::Unreadable(name)))
        }
    }

    fn entry(identifier: &str) -> GalleryEntry {
        GalleryEntry {
            identifier: identifier.to_string(),
            reference_image: PathBuf::from(format!("/gallery/{identifier}.jpg")),
        }
    }

    fn query_file() -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"\xff\xd8\xff").unwrap();
        file
    }

    fn assert_match(outcome: &IdentificationOutcome, id: &str, conf: f32) {
        match outcome {
            IdentificationOutcome::Match { identifier, confidence } => {
                assert_eq!(identifier, id);
                assert!((confidence - conf).abs() < 1e-3, "confidence {confidence}, expected {conf}");
            }
            other => panic!("expected match for {id}, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_gallery_is_no_match() {
        let q = query_file();
        let comparator = ScriptedComparator::default();
        let outcome = identify(q.path(), &[], &comparator, &MatchPolicy::default());
        assert_eq!(outcome, IdentificationOutcome::NoMatch);
        assert_eq!(comparator.call_count(), 0);
    }

    #[test]
    fn test_unreadable_query_is_error_without_comparisons() {
        let comparator = ScriptedComparator::default().distance("alice.jpg", 0.1);
        let report = scan(
            Path::new("/nonexistent/query.upload"),
            &[entry("alice")],
            &comparator,
            &MatchPolicy::default(),
        );
        assert!(matches!(
            report.outcome,
            IdentificationOutcome::Error { reason: OutcomeError::InputUnreadable { .. } }
        ));
        assert_eq!(comparator.call_count(), 0);
        assert_eq!(report.stats.compared, 0);
    }

    #[test]
    fn test_directory_as_query_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = identify(dir.path(), &[], &ScriptedComparator::default(), &MatchPolicy::default());
        assert!(matches!(outcome, IdentificationOutcome::Error { .. }));
    }

    #[test]
    fn test_scenario_best_distance_wins() {
        let q = query_file();
        let comparator = ScriptedComparator::default()
            .distance("alice.jpg", 0.1)
            .distance("bob.jpg", 0.3);
        let outcome = identify(
            q.path(),
            &[entry("alice"), entry("bob")],
            &comparator,
            &MatchPolicy::distance_below(0.4),
        );
        assert_match(&outcome, "alice", 90.0);
    }

    #[test]
    fn test_scenario_below_threshold_is_no_match() {
        let q = query_file();
        let comparator = ScriptedComparator::default().distance("carol.jpg", 0.9);
        let report = scan(q.path(), &[entry("carol")], &comparator, &MatchPolicy::distance_below(0.4));
        assert_eq!(report.outcome, IdentificationOutcome::NoMatch);
        assert_eq!(report.stats.qualified, 0);
    }

    #[test]
    fn test_scenario_sole_failure_is_no_match() {
        let q = query_file();
        let comparator = ScriptedComparator::default().failing("dave.jpg");
        let report = scan(q.path(), &[entry("dave")], &comparator, &MatchPolicy::default());
        assert_eq!(report.outcome, IdentificationOutcome::NoMatch);
        assert_eq!(report.stats.failures, 1);
    }

    #[test]
    fn test_failure_does_not_block_later_candidate() {
        let q = query_file();
        let comparator = ScriptedComparator::default()
            .failing("dave.jpg")
            .distance("erin.jpg", 0.2);
        let report = scan(
            q.path(),
            &[entry("dave"), entry("erin")],
            &comparator,
            &MatchPolicy::default(),
        );
        assert_match(&report.outcome, "erin", 80.0);
        assert_eq!(comparator.call_count(), 2);
        assert_eq!(report.stats.failures, 1);
        assert_eq!(report.stats.qualified, 1);
    }

    #[test]
    fn test_tie_goes_to_first_in_enumeration_order() {
        let q = query_file();
        let comparator = ScriptedComparator::default()
            .distance("frank.jpg", 0.35)
            .distance("gina.jpg", 0.2)
            .distance("hank.jpg", 0.2);
        let outcome = identify(
            q.path(),
            &[entry("frank"), entry("gina"), entry("hank")],
            &comparator,
            &MatchPolicy::default(),
        );
        assert_match(&outcome, "gina", 80.0);

        let reversed = identify(
            q.path(),
            &[entry("hank"), entry("gina"), entry("frank")],
            &comparator,
            &MatchPolicy::default(),
        );
        assert_match(&reversed, "hank", 80.0);
    }

    #[test]
    fn test_best_not_first_qualifying() {
        let q = query_file();
        let comparator = ScriptedComparator::default()
            .distance("ivan.jpg", 0.3)
            .distance("judy.jpg", 0.05);
        let outcome = identify(
            q.path(),
            &[entry("ivan"), entry("judy")],
            &comparator,
            &MatchPolicy::default(),
        );
        assert_match(&outcome, "judy", 95.0);
    }

    #[test]
    fn test_distances_past_one_do_not_tie_at_zero() {
        let q = query_file();
        let comparator = ScriptedComparator::default()
            .distance("far.jpg", 1.10)
            .distance("near.jpg", 1.02)
            .distance("kim.jpg", 0.9);
        let policy = MatchPolicy::distance_below(1.13);

        let report = scan(q.path(), &[entry("far"), entry("near")], &comparator, &policy);
        assert_eq!(report.outcome, IdentificationOutcome::NoMatch);
        assert_eq!(report.stats.qualified, 0);

        let outcome = identify(
            q.path(),
            &[entry("far"), entry("near"), entry("kim")],
            &comparator,
            &policy,
        );
        assert_match(&outcome, "kim", 10.0);
    }

    #[test]
    fn test_confidence_kind_passes_through() {
        let q = query_file();
        let comparator = ScriptedComparator::default()
            .with("kate.jpg", ComparisonResult::confidence(true, 61.5))
            .with("liam.jpg", ComparisonResult::confidence(false, 99.0))
            .with("mona.jpg", ComparisonResult::confidence(true, 87.25));
        let outcome = identify(
            q.path(),
            &[entry("kate"), entry("liam"), entry("mona")],
            &comparator,
            &MatchPolicy::verified(ScoreKind::Confidence),
        );
        assert_match(&outcome, "mona", 87.25);
    }

    #[test]
    fn test_unexpected_score_kind_is_isolated_failure() {
        let q = query_file();
        let comparator = ScriptedComparator::default()
            .with("nora.jpg", ComparisonResult::confidence(true, 99.0))
            .distance("owen.jpg", 0.3);
        let report = scan(
            q.path(),
            &[entry("nora"), entry("owen")],
            &comparator,
            &MatchPolicy::default(),
        );
        assert_match(&report.outcome, "owen", 70.0);
        assert_eq!(report.stats.failures, 1);
    }

    #[test]
    fn test_match_confidence_always_in_range() {
        let q = query_file();
        let names: Vec<String> = (0..40).map(|i| format!("p{i}")).collect();
        let mut comparator = ScriptedComparator::default();
        for (i, name) in names.iter().enumerate() {
            comparator = comparator.distance(&format!("{name}.jpg"), i as f32 * 0.05);
        }
        let gallery: Vec<GalleryEntry> = names.iter().map(|n| entry(n)).collect();
        for threshold in [0.01f32, 0.4, 1.0, 3.0] {
            for size in [1usize, 5, 40] {
                let outcome = identify(
                    q.path(),
                    &gallery[..size],
                    &comparator,
                    &MatchPolicy::distance_below(threshold),
                );
                if let IdentificationOutcome::Match { confidence, .. } = outcome {
                    assert!((0.0..=100.0).contains(&confidence));
                }
            }
        }
    }

    #[test]
    fn test_cancelled_scan_reports_error() {
        let q = query_file();
        let comparator = ScriptedComparator::default().distance("alice.jpg", 0.1);
        let token = CancelToken::new();
        token.cancel();
        let report = scan_with(
            q.path(),
            &[entry("alice")],
            &comparator,
            &MatchPolicy::default(),
            Some(&token),
        );
        assert_eq!(
            report.outcome,
            IdentificationOutcome::Error { reason: OutcomeError::Cancelled }
        );
        assert_eq!(comparator.call_count(), 0);
    }

    #[test]
    fn test_uncancelled_token_does_not_change_outcome() {
        let q = query_file();
        let comparator = ScriptedComparator::default().distance("alice.jpg", 0.1);
        let token = CancelToken::new();
        let report = scan_with(
            q.path(),
            &[entry("alice")],
            &comparator,
            &MatchPolicy::default(),
            Some(&token),
        );
        token.cancel();
        assert_match(&report.outcome, "alice", 90.0);
    }

    #[test]
    fn test_scan_accumulator_direct() {
        let mut scan = Scan::new(MatchPolicy::default(), 3);
        scan.observe(&entry("a"), ComparisonResult::distance(true, 0.2));
        scan.observe(&entry("b"), Err(ComparisonFailure::TimedOut(std::time::Duration::from_secs(1))));
        scan.observe(&entry("c"), ComparisonResult::distance(true, 0.2));
        let report = scan.finish();
        assert_match(&report.outcome, "a", 80.0);
        assert_eq!(
            report.stats,
            ScanStats { candidates: 3, compared: 3, qualified: 2, failures: 1 }
        );
    }
}
