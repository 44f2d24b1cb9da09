//! lineup-embed — Embedding-based face comparator.
//!
//! Uses ArcFace running via ONNX Runtime for CPU inference and compares
//! embeddings by distance.

pub mod comparator;
pub mod embedding;
pub mod recognizer;

use std::path::PathBuf;

pub use comparator::EmbeddingComparator;
pub use embedding::{DistanceMetric, Embedding};
pub use recognizer::{ArcFaceEmbedder, EmbedError, Embedder, ARCFACE_MODEL_FILE};

/// Default directory for ONNX model files.
pub fn default_model_dir() -> PathBuf {
    lineup_core::data_dir().join("models")
}
