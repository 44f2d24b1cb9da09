//! ArcFace face recognizer via ONNX Runtime.
//!
//! Extracts 512-dimensional embeddings from face images. Gallery and query
//! images are expected to be face crops; the whole image is resized to the
//! model input without detection or alignment.

use crate::embedding::Embedding;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ARCFACE_INPUT_SIZE: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

/// File name of the ArcFace model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("model file not found: {0} — download w600k_r50.onnx from insightface")]
    ModelNotFound(String),
    #[error("cannot read image {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Something that turns a face image into an embedding.
pub trait Embedder: Send {
    fn embed(&mut self, image: &Path) -> Result<Embedding, EmbedError>;
}

/// ArcFace-based embedder.
pub struct ArcFaceEmbedder {
    session: Session,
}

impl ArcFaceEmbedder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EmbedError> {
        if !model_path.exists() {
            return Err(EmbedError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }
}

impl Embedder for ArcFaceEmbedder {
    fn embed(&mut self, image: &Path) -> Result<Embedding, EmbedError> {
        let decoded = load_image(image)?;
        let input = preprocess(&decoded);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::InferenceFailed(format!("embedding extraction: {e}")))?;

        embedding_from_output(raw_data.to_vec())
    }
}

/// Validate raw model output and scale it to unit length.
fn embedding_from_output(raw: Vec<f32>) -> Result<Embedding, EmbedError> {
    if raw.len() != ARCFACE_EMBEDDING_DIM {
        return Err(EmbedError::InferenceFailed(format!(
            "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
            raw.len()
        )));
    }

    if raw.iter().any(|v| !v.is_finite()) {
        return Err(EmbedError::InferenceFailed(
            "embedding contains non-finite values".into(),
        ));
    }

    let embedding = Embedding {
        values: raw,
        model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
    };
    Ok(embedding.l2_normalized())
}

/// Decode an image file, detecting the format from its contents.
pub fn load_image(path: &Path) -> Result<DynamicImage, EmbedError> {
    let unreadable = |source| EmbedError::Unreadable {
        path: path.to_path_buf(),
        source,
    };
    image::ImageReader::open(path)
        .map_err(unreadable)?
        .with_guessed_format()
        .map_err(unreadable)?
        .decode()
        .map_err(|source| EmbedError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Resize to 112×112 RGB and normalize into a NCHW float tensor.
fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let size = ARCFACE_INPUT_SIZE;
    let rgb = image
        .resize_exact(size as u32, size as u32, FilterType::Triangle)
        .to_rgb8();
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            tensor[[0, c, y, x]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }

    tensor
}
