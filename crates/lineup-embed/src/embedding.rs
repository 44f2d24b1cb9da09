use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        // NaN components propagate so the caller can reject the result
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom == 0.0 { 0.0 } else { dot / denom }
    }

    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Copy scaled to unit length. Zero vectors are returned unchanged.
    pub fn l2_normalized(&self) -> Embedding {
        let norm: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            self.values.iter().map(|x| x / norm).collect()
        } else {
            self.values.clone()
        };
        Embedding {
            values,
            model_version: self.model_version.clone(),
        }
    }
}

/// Distance between two embeddings. Lower = more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine similarity`, in [0, 2].
    Cosine,
    /// Euclidean distance between unit-length embeddings, in [0, 2].
    EuclideanL2,
}

impl DistanceMetric {
    pub fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        let d = match self {
            Self::Cosine => 1.0 - a.similarity(b),
            Self::EuclideanL2 => a.l2_normalized().euclidean_distance(&b.l2_normalized()),
        };
        // float error can push identical vectors slightly below zero; NaN passes through
        if d < 0.0 { 0.0 } else { d }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean_l2" | "euclidean-l2" => Ok(Self::EuclideanL2),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_cosine_distance_range() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((DistanceMetric::Cosine.distance(&a, &b) - 2.0).abs() < 1e-6);
        assert_eq!(DistanceMetric::Cosine.distance(&a, &a), 0.0);
    }

    #[test]
    fn test_euclidean_l2_ignores_scale() {
        let a = Embedding::new(vec![3.0, 0.0]);
        let b = Embedding::new(vec![0.0, 0.5]);
        let d = DistanceMetric::EuclideanL2.distance(&a, &b);
        assert!((d - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_nan_embedding_gives_nan_distance() {
        let a = Embedding::new(vec![f32::NAN, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert!(DistanceMetric::Cosine.distance(&a, &b).is_nan());
        assert!(DistanceMetric::EuclideanL2.distance(&a, &b).is_nan());
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("Cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!(
            "euclidean_l2".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::EuclideanL2
        );
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
