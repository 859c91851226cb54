//! Process-lifetime background-removal service with lazy model loading

use crate::{with_opaque_alpha, BackgroundRemover, SegmentationConfig, SegmentationError};
use image::{RgbImage, RgbaImage};
use image_studio_core::LazyModel;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

/// Result of a cutout request
///
/// `degraded` is true when segmentation failed and the image is the original
/// with an opaque alpha channel added. A genuine all-foreground mask keeps
/// `degraded` false, so callers can tell the two apart.
pub struct CutoutOutcome {
    pub image: RgbaImage,
    pub degraded: bool,
}

/// Background-removal service holding the cached model singleton
pub struct RemovalService {
    model_dir: PathBuf,
    config: SegmentationConfig,
    model: LazyModel<BackgroundRemover>,
}

impl RemovalService {
    /// Create the service; no model is loaded until first use
    ///
    /// Expects `<model_dir>/u2net.onnx`.
    pub fn new(model_dir: impl AsRef<Path>, config: SegmentationConfig) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            config,
            model: LazyModel::new(),
        }
    }

    fn get_or_load(&self) -> Result<&Mutex<BackgroundRemover>, SegmentationError> {
        self.model.get_or_try_load(|| {
            let model_path = self.model_dir.join("u2net.onnx");
            if !model_path.exists() {
                return Err(SegmentationError::ModelNotFound(
                    model_path.display().to_string(),
                ));
            }

            info!(
                "Loading segmentation model from {} (first request only)",
                model_path.display()
            );
            BackgroundRemover::new(model_path, self.config.clone())
        })
    }

    /// Remove the background, or fail with a typed error
    ///
    /// # Errors
    /// Returns error if the model cannot be loaded or inference fails.
    pub fn remove(&self, image: &RgbImage) -> Result<RgbaImage, SegmentationError> {
        let model = self.get_or_load()?;
        let mut remover = model
            .lock()
            .map_err(|e| SegmentationError::Poisoned(e.to_string()))?;
        remover.remove(image)
    }

    /// Remove the background, degrading to the original image on failure
    ///
    /// Never fails: any segmentation error is logged and the outcome carries
    /// the untouched pixels with an opaque alpha channel and `degraded: true`.
    pub fn cutout(&self, image: &RgbImage) -> CutoutOutcome {
        match self.remove(image) {
            Ok(cutout) => CutoutOutcome {
                image: cutout,
                degraded: false,
            },
            Err(e) => {
                error!("Background removal failed, returning original image: {e}");
                CutoutOutcome {
                    image: with_opaque_alpha(image),
                    degraded: true,
                }
            }
        }
    }

    /// Whether the underlying model has been loaded yet
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.is_loaded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_cutout_degrades_without_model() {
        let service = RemovalService::new("does/not/exist", SegmentationConfig::default());
        let img = RgbImage::from_pixel(10, 10, Rgb([50, 60, 70]));

        let outcome = service.cutout(&img);
        assert!(outcome.degraded);
        assert_eq!(outcome.image.dimensions(), (10, 10));
        // Degraded output keeps the pixels and adds opaque alpha
        assert_eq!(outcome.image.get_pixel(5, 5), &image::Rgba([50, 60, 70, 255]));
    }

    #[test]
    fn test_remove_surfaces_typed_error() {
        let service = RemovalService::new("does/not/exist", SegmentationConfig::default());
        let img = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));

        let result = service.remove(&img);
        assert!(matches!(result, Err(SegmentationError::ModelNotFound(_))));
    }

    #[test]
    fn test_cutout_with_real_model() {
        // Requires operator-supplied model artifacts; skip when absent
        let model_dir = std::path::Path::new("models/segmentation");
        if !model_dir.join("u2net.onnx").exists() {
            return;
        }

        let service = RemovalService::new(model_dir, SegmentationConfig::default());
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]));

        let outcome = service.cutout(&img);
        assert!(!outcome.degraded);
        assert_eq!(outcome.image.dimensions(), (10, 10));
    }
}
