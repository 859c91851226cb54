//! Image classification using a Vision Transformer via ONNX Runtime
//!
//! Runs a ViT-style ImageNet classifier exported to ONNX and turns the
//! logits into a ranked list of (label, confidence) pairs. The label
//! vocabulary ships as a JSON array next to the model, index-aligned with
//! the logit vector.
//!
//! # Example
//! ```no_run
//! use image_studio_classification::{ClassificationConfig, ImageClassifier};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut classifier = ImageClassifier::new(
//!     "models/classification/vit.onnx",
//!     "models/classification/labels.json",
//!     ClassificationConfig::default(),
//! )?;
//!
//! let img = image::open("photo.jpg")?.to_rgb8();
//! for result in classifier.classify(&img, 5)? {
//!     println!("{}: {:.1}%", result.label, result.score * 100.0);
//! }
//! # Ok(())
//! # }
//! ```

mod service;

pub use service::ClassificationService;

use image::RgbImage;
use image_studio_common::LabelScore;
use ndarray::{Array, ShapeBuilder};
use ort::{
    session::{Session, SessionOutputs},
    value::TensorRef,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Default number of results returned when the caller does not bound them
pub const DEFAULT_TOP_K: usize = 5;

/// Configuration for image classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Input image size (224 for ViT-base-patch16-224)
    pub input_size: u32,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self { input_size: 224 }
    }
}

/// Errors that can occur during classification
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("ONNX Runtime error: {0}")]
    OrtError(#[from] ort::Error),

    #[error("Session error: {0}")]
    SessionError(#[from] image_studio_core::OnnxError),

    #[error("Failed to load labels from {path}: {error}")]
    LabelsError { path: String, error: String },

    #[error("Invalid model output shape: expected [1, N] or [N], got {0:?}")]
    InvalidOutputShape(Vec<i64>),

    #[error("Model is busy: {0}")]
    Poisoned(String),
}

/// Image classifier wrapping the ONNX session and label vocabulary
pub struct ImageClassifier {
    session: Session,
    labels: Vec<String>,
    config: ClassificationConfig,
}

impl ImageClassifier {
    /// Create a new classifier
    ///
    /// # Arguments
    /// * `model_path` - Path to the classifier ONNX model
    /// * `labels_path` - Path to the labels JSON file (array of strings)
    /// * `config` - Classification configuration
    ///
    /// # Errors
    /// Returns error if model or label loading fails
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        labels_path: P,
        config: ClassificationConfig,
    ) -> Result<Self, ClassificationError> {
        let model_path = model_path.as_ref();
        let labels_path = labels_path.as_ref();

        info!(
            "Loading classification model from {:?} with labels {:?}",
            model_path, labels_path
        );

        let session = image_studio_core::create_optimized_session(model_path)?;
        let labels = load_labels(labels_path)?;

        debug!(
            "Classifier loaded ({} labels, input size: {})",
            labels.len(),
            config.input_size
        );

        Ok(Self {
            session,
            labels,
            config,
        })
    }

    /// Classify an image, returning at most `top_k` (label, score) pairs
    ///
    /// Scores are softmax probabilities in [0, 1], ordered by non-increasing
    /// confidence.
    ///
    /// # Errors
    /// Returns error if inference fails or the output shape is unexpected.
    pub fn classify(
        &mut self,
        image: &RgbImage,
        top_k: usize,
    ) -> Result<Vec<LabelScore>, ClassificationError> {
        let input = preprocess_image(image, self.config.input_size);
        let input_tensor = TensorRef::from_array_view(input.view())?;

        // Extract the output name before running to avoid borrow conflicts
        let output_name = self.session.outputs[0].name.clone();

        let outputs: SessionOutputs = self.session.run(ort::inputs![input_tensor])?;

        let (shape, logits) = outputs[output_name.as_str()].try_extract_tensor::<f32>()?;

        check_logits_shape(shape)?;

        Ok(top_k_from_logits(logits, &self.labels, top_k))
    }

    /// Number of labels in the vocabulary
    #[must_use]
    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }
}

/// Accept `[1, N]` logits or a bare `[N]` vector
///
/// A batched `[B, N]` output with `B > 1` would otherwise be softmaxed
/// across the flattened batch, so it is rejected.
fn check_logits_shape(shape: &[i64]) -> Result<(), ClassificationError> {
    match shape {
        [_] | [1, _] => Ok(()),
        _ => Err(ClassificationError::InvalidOutputShape(shape.to_vec())),
    }
}

/// Load the label vocabulary: a JSON array of strings, index-aligned with logits
fn load_labels(path: &Path) -> Result<Vec<String>, ClassificationError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ClassificationError::LabelsError {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    serde_json::from_str(&contents).map_err(|e| ClassificationError::LabelsError {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

/// Softmax the logits and return the top-k labels by descending confidence
///
/// Indices past the end of the vocabulary render as `class_{index}`.
pub fn top_k_from_logits(logits: &[f32], labels: &[String], top_k: usize) -> Vec<LabelScore> {
    if logits.is_empty() || top_k == 0 {
        return Vec::new();
    }

    // Numerically stable softmax
    let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max_logit).exp()).collect();
    let sum: f32 = exps.iter().sum();

    let mut scored: Vec<(usize, f32)> = exps
        .iter()
        .enumerate()
        .map(|(i, &e)| (i, e / sum))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(idx, score)| {
            let label = labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{idx}"));
            LabelScore::new(label, score.clamp(0.0, 1.0))
        })
        .collect()
}

/// Resize to the model's square input and convert to a normalized CHW tensor
///
/// ImageNet normalization: mean=[0.485, 0.456, 0.406], std=[0.229, 0.224, 0.225]
fn preprocess_image(image: &RgbImage, input_size: u32) -> Array<f32, ndarray::IxDyn> {
    let (width, height) = image.dimensions();

    let resized = if width != input_size || height != input_size {
        image::imageops::resize(
            image,
            input_size,
            input_size,
            image::imageops::FilterType::Triangle,
        )
    } else {
        image.clone()
    };

    let mean = [0.485, 0.456, 0.406];
    let std = [0.229, 0.224, 0.225];

    let size = input_size as usize;
    let mut array = Array::zeros((1, 3, size, size).f());

    for (y, row) in resized.enumerate_rows() {
        for (x, _, pixel) in row {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                array[[0, c, y as usize, x as usize]] = (value - mean[c]) / std[c];
            }
        }
    }

    array.into_dyn()
}
