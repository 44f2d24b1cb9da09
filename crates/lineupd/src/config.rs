use lineup_core::policy::MAX_RANKABLE_DISTANCE;
use lineup_core::MatchPolicy;
use lineup_embed::{DistanceMetric, ARCFACE_MODEL_FILE};
use std::path::PathBuf;
use std::time::Duration;

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    System,
    Session,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of reference images, one person per file.
    pub gallery_dir: PathBuf,
    /// Path to the SQLite record database.
    pub db_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory for request-scoped query image files.
    pub upload_dir: PathBuf,
    /// Candidates qualify when their embedding distance is below this.
    pub distance_threshold: f32,
    /// Additionally require the comparator's `verified` flag.
    pub require_verified: bool,
    pub metric: DistanceMetric,
    /// Per-comparison timeout in seconds.
    pub compare_timeout_secs: u64,
    /// Maximum comparisons in flight across all requests.
    pub compare_concurrency: usize,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `LINEUP_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lineup_core::data_dir();
        let path = |key: &str, default: PathBuf| get(key).map(PathBuf::from).unwrap_or(default);

        let metric = match get("LINEUP_METRIC").map(|v| v.parse::<DistanceMetric>()) {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring LINEUP_METRIC; using cosine");
                DistanceMetric::Cosine
            }
            None => DistanceMetric::Cosine,
        };

        let mut distance_threshold = parse_or(&get, "LINEUP_DISTANCE_THRESHOLD", 0.40f32);
        if distance_threshold > MAX_RANKABLE_DISTANCE {
            tracing::warn!(
                threshold = distance_threshold,
                max = MAX_RANKABLE_DISTANCE,
                "LINEUP_DISTANCE_THRESHOLD is above the largest rankable distance; clamping"
            );
            distance_threshold = MAX_RANKABLE_DISTANCE;
        }

        let bus = match get("LINEUP_BUS").as_deref() {
            Some("session") => BusKind::Session,
            _ => BusKind::System,
        };

        Self {
            gallery_dir: path("LINEUP_GALLERY_DIR", data_dir.join("gallery")),
            db_path: path("LINEUP_DB_PATH", data_dir.join("records.db")),
            model_dir: path("LINEUP_MODEL_DIR", lineup_embed::default_model_dir()),
            upload_dir: path(
                "LINEUP_UPLOAD_DIR",
                std::env::temp_dir().join("lineup-uploads"),
            ),
            distance_threshold,
            require_verified: get("LINEUP_REQUIRE_VERIFIED")
                .map(|v| v != "0")
                .unwrap_or(false),
            metric,
            compare_timeout_secs: parse_or(&get, "LINEUP_COMPARE_TIMEOUT_SECS", 10),
            compare_concurrency: parse_or(&get, "LINEUP_COMPARE_CONCURRENCY", 1usize).max(1),
            bus,
        }
    }

    /// Match policy derived from the threshold settings.
    pub fn policy(&self) -> MatchPolicy {
        MatchPolicy::for_distance(self.distance_threshold, self.require_verified)
    }

    pub fn compare_timeout(&self) -> Duration {
        Duration::from_secs(self.compare_timeout_secs)
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join(ARCFACE_MODEL_FILE)
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
