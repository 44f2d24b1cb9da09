use crate::config::Config;
use lineup_core::engine::check_query_readable;
use lineup_core::{
    resolve, CancelToken, Comparator, ComparisonFailure, ComparisonResult, DirectoryGallery,
    GalleryEntry, GalleryError, GalleryProvider, IdentifyResponse, MatchPolicy, OutcomeError,
    QueryImage, QueryImageError, RecordStore, Resolution, Scan, ScanReport,
};
use lineup_embed::{ArcFaceEmbedder, EmbeddingComparator};
use lineup_store::SqliteRecordStore;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("embedder error: {0}")]
    Embed(#[from] lineup_embed::EmbedError),
    #[error("record store error: {0}")]
    Store(#[from] lineup_store::StoreError),
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("gallery worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

type SharedStore = Arc<Mutex<dyn RecordStore + Send>>;

/// Tunables for one service instance.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub policy: MatchPolicy,
    pub compare_timeout: Duration,
    pub compare_concurrency: usize,
    pub upload_dir: PathBuf,
}

/// Clone-safe handle to the identification pipeline.
#[derive(Clone)]
pub struct IdentifyService {
    comparator: Arc<dyn Comparator>,
    gallery: Arc<dyn GalleryProvider>,
    store: SharedStore,
    options: Arc<ServiceOptions>,
    /// Comparison slots shared by all requests. A slot is returned only when
    /// its blocking worker finishes, so timed-out workers still count.
    slots: Arc<Semaphore>,
    cancel: CancelToken,
}

impl IdentifyService {
    pub fn new(
        comparator: Arc<dyn Comparator>,
        gallery: Arc<dyn GalleryProvider>,
        store: SharedStore,
        options: ServiceOptions,
    ) -> Self {
        Self {
            comparator,
            gallery,
            store,
            slots: Arc::new(Semaphore::new(options.compare_concurrency.max(1))),
            options: Arc::new(options),
            cancel: CancelToken::new(),
        }
    }

    /// Load the model, open the record store and check the gallery.
    /// Fails fast if any resource is unavailable.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let model_path = config.arcface_model_path();
        let embedder = ArcFaceEmbedder::load(&model_path)?;
        tracing::info!(path = %model_path.display(), "ArcFace embedder loaded");

        let comparator =
            EmbeddingComparator::new(embedder, config.metric, config.distance_threshold);

        let store = SqliteRecordStore::open(&config.db_path)?;
        tracing::info!(
            path = %config.db_path.display(),
            records = store.count()?,
            "record store opened"
        );

        let gallery = DirectoryGallery::new(&config.gallery_dir);
        let entries = gallery.list_entries()?;
        tracing::info!(
            dir = %config.gallery_dir.display(),
            entries = entries.len(),
            "gallery found"
        );

        let store: SharedStore = Arc::new(Mutex::new(store));
        Ok(Self::new(
            Arc::new(comparator),
            Arc::new(gallery),
            store,
            ServiceOptions {
                policy: config.policy(),
                compare_timeout: config.compare_timeout(),
                compare_concurrency: config.compare_concurrency,
                upload_dir: config.upload_dir.clone(),
            },
        ))
    }

    pub fn policy(&self) -> MatchPolicy {
        self.options.policy
    }

    /// Identify the person in an uploaded image.
    pub async fn identify_upload(&self, image: &[u8]) -> IdentifyResponse {
        let query = match QueryImage::store(&self.options.upload_dir, image) {
            Ok(q) => q,
            Err(QueryImageError::Empty) => {
                tracing::info!("identify rejected: empty upload");
                return IdentifyResponse::input_error("No image uploaded!");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to store query image");
                return IdentifyResponse::unexpected();
            }
        };

        let report = self.scan(query.path()).await;
        let query_path = query.path().to_path_buf();
        drop(query);
        // after removal, so a late worker cannot cache the query again
        self.comparator.release(&query_path);

        let resolution = self.resolve(report.outcome).await;
        let response = IdentifyResponse::from(resolution);
        tracing::info!(
            status = status_label(&response),
            compared = report.stats.compared,
            failures = report.stats.failures,
            "identify complete"
        );
        response
    }

    /// Score `query` against the whole gallery.
    ///
    /// Comparisons may run concurrently, but results are fed to the
    /// accumulator in gallery order so ties resolve exactly as in a
    /// sequential scan.
    pub async fn scan(&self, query: &Path) -> ScanReport {
        let policy = self.options.policy;

        if let Err(reason) = check_query_readable(query) {
            tracing::warn!(error = %reason, "query image rejected");
            return Scan::new(policy, 0).abort(reason);
        }

        let entries = match self.list_gallery().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "gallery listing failed");
                return Scan::new(policy, 0).abort(OutcomeError::Unexpected(e.to_string()));
            }
        };

        let (results, started) = self.compare_all(query, &entries).await;

        let mut scan = Scan::new(policy, entries.len());
        for (idx, (entry, result)) in entries.iter().zip(results).enumerate() {
            match result {
                Some(r) => scan.observe(entry, r),
                None if idx < started => scan.observe(
                    entry,
                    Err(ComparisonFailure::Model("comparison task lost".into())),
                ),
                None => {
                    tracing::info!(compared = scan.stats().compared, "scan cancelled");
                    return scan.abort(OutcomeError::Cancelled);
                }
            }
        }
        scan.finish()
    }

    /// Run comparisons for every entry, bounded by the shared slots.
    ///
    /// Returns results indexed like `entries`, and how many entries were
    /// settled (started or skipped) before cancellation.
    async fn compare_all(
        &self,
        query: &Path,
        entries: &[GalleryEntry],
    ) -> (Vec<Option<Result<ComparisonResult, ComparisonFailure>>>, usize) {
        let timeout = self.options.compare_timeout;
        let mut results = vec![None; entries.len()];
        let mut tasks = JoinSet::new();
        let mut started = 0;

        for (idx, entry) in entries.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = match tokio::time::timeout(timeout, self.slots.clone().acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => break,
                Err(_) => {
                    // every slot is held by a worker that outlived its own timeout
                    tracing::warn!(
                        skipped = entries.len() - idx,
                        "no comparison slot freed within the timeout"
                    );
                    for result in &mut results[idx..] {
                        *result = Some(Err(ComparisonFailure::TimedOut(timeout)));
                    }
                    started = entries.len();
                    break;
                }
            };

            let comparator = self.comparator.clone();
            let query = query.to_path_buf();
            let reference = entry.reference_image.clone();
            tasks.spawn(async move {
                let work = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    comparator.compare(&query, &reference)
                });
                let result = match tokio::time::timeout(timeout, work).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => Err(ComparisonFailure::Model(format!("comparison worker failed: {e}"))),
                    Err(_) => Err(ComparisonFailure::TimedOut(timeout)),
                };
                (idx, result)
            });
            started += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => tracing::error!(error = %e, "comparison task failed"),
            }
        }
        (results, started)
    }

    async fn resolve(&self, outcome: lineup_core::IdentificationOutcome) -> Resolution {
        let store = self.store.clone();
        let joined = tokio::task::spawn_blocking(move || match store.lock() {
            Ok(guard) => resolve(outcome, &*guard),
            Err(_) => Resolution::Failed {
                reason: OutcomeError::Unexpected("record store lock poisoned".into()),
            },
        })
        .await;
        joined.unwrap_or_else(|e| Resolution::Failed {
            reason: OutcomeError::Unexpected(format!("record lookup task failed: {e}")),
        })
    }

    pub async fn list_gallery(&self) -> Result<Vec<GalleryEntry>, ServiceError> {
        let gallery = self.gallery.clone();
        Ok(tokio::task::spawn_blocking(move || gallery.list_entries()).await??)
    }

    /// Status summary for the D-Bus `Status` method.
    pub async fn status(&self) -> serde_json::Value {
        let gallery_size = self.list_gallery().await.map(|g| g.len()).ok();
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "gallery_size": gallery_size,
            "policy": self.options.policy,
            "compare_timeout_secs": self.options.compare_timeout.as_secs(),
            "compare_concurrency": self.options.compare_concurrency,
            "compare_slots_free": self.slots.available_permits(),
            "shutting_down": self.cancel.is_cancelled(),
        })
    }

    /// Cancel in-flight and future scans.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn status_label(response: &IdentifyResponse) -> &'static str {
    match response {
        IdentifyResponse::MatchFound { .. } => "match",
        IdentifyResponse::NoMatch { .. } => "no_match",
        IdentifyResponse::MatchWithoutRecord { .. } => "match_without_record",
        IdentifyResponse::Error { .. } => "error",
    }
}
