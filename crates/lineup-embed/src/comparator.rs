//! Embedding-distance comparator.

use crate::embedding::{DistanceMetric, Embedding};
use crate::recognizer::{EmbedError, Embedder};
use lineup_core::{Comparator, ComparisonFailure, ComparisonResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Identity of a file's contents as far as caching is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Self, ComparisonFailure> {
        let meta = std::fs::metadata(path)
            .map_err(|e| ComparisonFailure::Unreadable(format!("{}: {e}", path.display())))?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

type Cache = HashMap<PathBuf, (FileStamp, Embedding)>;

/// Compares two images by the distance between their embeddings.
///
/// Reports `ScoreKind::Distance` with `verified = distance <= threshold`.
/// Embeddings are cached per path and invalidated when the file's size or
/// modification time changes.
pub struct EmbeddingComparator<E> {
    embedder: Mutex<E>,
    metric: DistanceMetric,
    threshold: f32,
    cache: Mutex<Cache>,
}

impl<E: Embedder> EmbeddingComparator<E> {
    pub fn new(embedder: E, metric: DistanceMetric, threshold: f32) -> Self {
        Self {
            embedder: Mutex::new(embedder),
            metric,
            threshold,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Drop the cached embedding for `path`, e.g. once a query file is gone.
    pub fn forget(&self, path: &Path) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(path);
        }
    }

    fn embedding_for(&self, path: &Path) -> Result<Embedding, ComparisonFailure> {
        let stamp = FileStamp::of(path)?;
        if let Some(embedding) = self.cached(path, stamp)? {
            return Ok(embedding);
        }

        let mut embedder = self.embedder.lock().map_err(|_| poisoned("embedder"))?;
        // another worker may have embedded the same file while this one waited
        if let Some(embedding) = self.cached(path, stamp)? {
            return Ok(embedding);
        }
        let embedding = embedder.embed(path).map_err(to_failure)?;

        // insert before releasing the embedder so waiting workers see the entry
        let mut cache = self.cache.lock().map_err(|_| poisoned("cache"))?;
        if FileStamp::of(path).ok() == Some(stamp) {
            cache.insert(path.to_path_buf(), (stamp, embedding.clone()));
        } else {
            tracing::debug!(path = %path.display(), "file changed or removed while embedding; not cached");
        }
        Ok(embedding)
    }

    fn cached(&self, path: &Path, stamp: FileStamp) -> Result<Option<Embedding>, ComparisonFailure> {
        let cache = self.cache.lock().map_err(|_| poisoned("cache"))?;
        Ok(cache
            .get(path)
            .filter(|(cached_stamp, _)| *cached_stamp == stamp)
            .map(|(_, embedding)| embedding.clone()))
    }
}

impl<E: Embedder> Comparator for EmbeddingComparator<E> {
    fn compare(&self, query: &Path, reference: &Path) -> Result<ComparisonResult, ComparisonFailure> {
        let query_embedding = self.embedding_for(query)?;
        let candidate = self.embedding_for(reference)?;
        if query_embedding.dim() != candidate.dim() {
            return Err(ComparisonFailure::Model(format!(
                "embedding dimension mismatch: {} vs {}",
                query_embedding.dim(),
                candidate.dim()
            )));
        }

        let distance = self.metric.distance(&query_embedding, &candidate);
        tracing::trace!(reference = %reference.display(), distance, "compared");
        ComparisonResult::distance(distance <= self.threshold, distance)
    }

    fn release(&self, image: &Path) {
        self.forget(image);
    }
}

fn poisoned(what: &str) -> ComparisonFailure {
    ComparisonFailure::Model(format!("{what} lock poisoned"))
}

fn to_failure(err: EmbedError) -> ComparisonFailure {
    match err {
        EmbedError::Unreadable { .. } => ComparisonFailure::Unreadable(err.to_string()),
        EmbedError::Decode { .. } => ComparisonFailure::Decode(err.to_string()),
        EmbedError::ModelNotFound(_) | EmbedError::InferenceFailed(_) | EmbedError::Ort(_) => {
            ComparisonFailure::Model(err.to_string())
        }
    }
}
