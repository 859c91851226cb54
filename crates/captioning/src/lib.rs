//! Image captioning using a vision-language model via ONNX Runtime
//!
//! Runs a BLIP-style encoder-decoder model exported to ONNX: a vision
//! encoder turns the image into visual embeddings and a language decoder
//! generates the caption token by token.
//!
//! # Example
//! ```no_run
//! use image_studio_captioning::{CaptionConfig, Captioner};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut captioner = Captioner::new(
//!     "models/captioning/blip.onnx",
//!     "models/captioning/tokenizer.json",
//!     CaptionConfig::default(),
//! )?;
//!
//! let img = image::open("photo.jpg")?.to_rgb8();
//! let caption = captioner.generate(&img)?;
//! println!("Caption: {}", caption.text);
//! # Ok(())
//! # }
//! ```
//!
//! Caption models are large (BLIP base is ~500MB); the operator supplies the
//! ONNX export and the matching tokenizer.json.

mod decoding;
mod service;

pub use service::CaptionService;

use image::RgbImage;
use image_studio_common::Caption;
use ndarray::{Array, ShapeBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration for caption generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// Input image size (384 for BLIP)
    pub input_size: u32,
    /// Maximum caption length in tokens
    pub max_length: usize,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            input_size: 384,
            max_length: 50,
        }
    }
}

/// Errors that can occur during caption generation
#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("ONNX Runtime error: {0}")]
    OrtError(#[from] ort::Error),

    #[error("Session error: {0}")]
    SessionError(#[from] image_studio_core::OnnxError),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    #[error("Model is busy: {0}")]
    Poisoned(String),
}

/// Caption generator wrapping the ONNX session and tokenizer
pub struct Captioner {
    decoder: decoding::TextDecoder,
    config: CaptionConfig,
}

impl Captioner {
    /// Create a new captioner
    ///
    /// # Arguments
    /// * `model_path` - Path to the vision-language ONNX model
    /// * `tokenizer_path` - Path to the tokenizer.json file
    /// * `config` - Caption generation configuration
    ///
    /// # Errors
    /// Returns error if model or tokenizer loading fails
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        tokenizer_path: P,
        config: CaptionConfig,
    ) -> Result<Self, CaptionError> {
        info!(
            "Loading caption model from {:?} with tokenizer {:?}",
            model_path.as_ref(),
            tokenizer_path.as_ref()
        );

        let decoder = decoding::TextDecoder::new(tokenizer_path, model_path)?;

        debug!(
            "Caption model loaded (input size: {}, max length: {})",
            config.input_size, config.max_length
        );

        Ok(Self { decoder, config })
    }

    /// Generate a caption for an image
    ///
    /// The returned caption text is trimmed of surrounding whitespace.
    ///
    /// # Errors
    /// Returns error if inference or token decoding fails
    pub fn generate(&mut self, image: &RgbImage) -> Result<Caption, CaptionError> {
        let pixel_values = preprocess_image(image, self.config.input_size);

        let pixel_values = pixel_values
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| CaptionError::ImageError(format!("Failed to shape input tensor: {e}")))?;

        let text = self
            .decoder
            .generate_greedy(&pixel_values, self.config.max_length)?;

        Ok(Caption::new(text))
    }
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
