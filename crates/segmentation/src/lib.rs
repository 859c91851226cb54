//! Background removal using salient-object segmentation via ONNX Runtime
//!
//! Runs a U²-Net-style model exported to ONNX: the network predicts a
//! per-pixel saliency map, which is normalized, resized back to the input
//! resolution, and applied as the alpha channel over the original pixels.
//! Background pixels end up transparent; foreground pixels keep their color.
//!
//! # Example
//! ```no_run
//! use image_studio_segmentation::{BackgroundRemover, SegmentationConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut remover = BackgroundRemover::new(
//!     "models/segmentation/u2net.onnx",
//!     SegmentationConfig::default(),
//! )?;
//!
//! let img = image::open("photo.jpg")?.to_rgb8();
//! let cutout = remover.remove(&img)?;
//! cutout.save("cutout.png")?;
//! # Ok(())
//! # }
//! ```

mod service;

pub use service::{CutoutOutcome, RemovalService};

use image::{GrayImage, Luma, RgbImage, RgbaImage};
use ndarray::{Array, ShapeBuilder};
use ort::{
    session::{Session, SessionOutputs},
    value::TensorRef,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration for background removal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Input image size (320 for U²-Net)
    pub input_size: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self { input_size: 320 }
    }
}

/// Errors that can occur during background removal
#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("ONNX Runtime error: {0}")]
    OrtError(#[from] ort::Error),

    #[error("Session error: {0}")]
    SessionError(#[from] image_studio_core::OnnxError),

    #[error("Invalid model output shape: expected [1, H, W] or [1, 1, H, W], got {0:?}")]
    InvalidOutputShape(Vec<i64>),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Model is busy: {0}")]
    Poisoned(String),
}

/// Background remover wrapping the segmentation ONNX session
pub struct BackgroundRemover {
    session: Session,
    config: SegmentationConfig,
}

impl BackgroundRemover {
    /// Create a new background remover
    ///
    /// # Errors
    /// Returns error if model loading fails
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        config: SegmentationConfig,
    ) -> Result<Self, SegmentationError> {
        let model_path = model_path.as_ref();
        info!("Loading segmentation model from {:?}", model_path);

        let session = image_studio_core::create_optimized_session(model_path)?;

        debug!(
            "Segmentation model loaded (input size: {})",
            config.input_size
        );

        Ok(Self { session, config })
    }

    /// Remove the background from an image
    ///
    /// The result has the same dimensions as the input and always carries an
    /// alpha channel. The input is never mutated.
    ///
    /// # Errors
    /// Returns error if inference fails or the model output has an
    /// unexpected shape.
    pub fn remove(&mut self, image: &RgbImage) -> Result<RgbaImage, SegmentationError> {
        let original_size = image.dimensions();

        let input = preprocess_image(image, self.config.input_size);
        let input_tensor = TensorRef::from_array_view(input.view())?;

        // Extract the output name before running to avoid borrow conflicts
        let output_name = self.session.outputs[0].name.clone();

        let outputs: SessionOutputs = self.session.run(ort::inputs![input_tensor])?;

        let (shape, saliency) = outputs[output_name.as_str()].try_extract_tensor::<f32>()?;

        // Accept [1, H, W] or [1, 1, H, W]
        let (height, width) = match shape.len() {
            3 => (shape[1] as usize, shape[2] as usize),
            4 => (shape[2] as usize, shape[3] as usize),
            _ => return Err(SegmentationError::InvalidOutputShape(shape.to_vec())),
        };

        let mask = saliency_to_mask(saliency, width, height);

        // Scale the mask back up to the input resolution
        let mask = if mask.dimensions() != original_size {
            image::imageops::resize(
                &mask,
                original_size.0,
                original_size.1,
                image::imageops::FilterType::CatmullRom,
            )
        } else {
            mask
        };

        Ok(apply_alpha_mask(image, &mask))
    }
}

/// Min-max normalize the raw saliency values into an 8-bit mask image
fn saliency_to_mask(saliency: &[f32], width: usize, height: usize) -> GrayImage {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in saliency {
        min = min.min(v);
        max = max.max(v);
    }
    let range = max - min;

    let mut mask = GrayImage::new(width as u32, height as u32);
    if range > 1e-6 {
        for (i, &v) in saliency.iter().enumerate() {
            let alpha = ((v - min) / range * 255.0) as u8;
            mask.put_pixel((i % width) as u32, (i / width) as u32, Luma([alpha]));
        }
    } else {
        // Flat saliency map: treat everything as foreground
        for pixel in mask.pixels_mut() {
            *pixel = Luma([255]);
        }
    }

    debug!(
        "Saliency mask {}x{}: min={:.3}, max={:.3}",
        width, height, min, max
    );

    mask
}

/// Apply a grayscale mask as the alpha channel over the original pixels
///
/// Mask and image dimensions must match.
pub fn apply_alpha_mask(image: &RgbImage, mask: &GrayImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    debug_assert_eq!(mask.dimensions(), (width, height));

    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let alpha = mask.get_pixel(x, y)[0];
        out.put_pixel(x, y, image::Rgba([pixel[0], pixel[1], pixel[2], alpha]));
    }
    out
}

/// Convert an RGB image to RGBA with a fully opaque alpha channel
///
/// The degraded fallback: same pixels, same dimensions, alpha added.
pub fn with_opaque_alpha(image: &RgbImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        out.put_pixel(x, y, image::Rgba([pixel[0], pixel[1], pixel[2], 255]));
    }
    out
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
