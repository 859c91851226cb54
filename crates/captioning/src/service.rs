//! Process-lifetime captioning service with lazy model loading

use crate::{CaptionConfig, CaptionError, Captioner};
use image::RgbImage;
use image_studio_common::Caption;
use image_studio_core::LazyModel;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Captioning service holding the cached `Captioner` singleton
///
/// The model is loaded on the first `caption` call and reused for every
/// subsequent request in the process.
pub struct CaptionService {
    model_dir: PathBuf,
    config: CaptionConfig,
    model: LazyModel<Captioner>,
}

impl CaptionService {
    /// Create the service; no model is loaded until first use
    ///
    /// Expects `<model_dir>/blip.onnx` and `<model_dir>/tokenizer.json`.
    pub fn new(model_dir: impl AsRef<Path>, config: CaptionConfig) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            config,
            model: LazyModel::new(),
        }
    }

    /// Get or load the cached captioner
    fn get_or_load(&self) -> Result<&Mutex<Captioner>, CaptionError> {
        self.model.get_or_try_load(|| {
            let model_path = self.model_dir.join("blip.onnx");
            let tokenizer_path = self.model_dir.join("tokenizer.json");

            if !model_path.exists() {
                return Err(CaptionError::ModelNotFound(
                    model_path.display().to_string(),
                ));
            }
            if !tokenizer_path.exists() {
                return Err(CaptionError::ModelNotFound(
                    tokenizer_path.display().to_string(),
                ));
            }

            info!(
                "Loading caption model from {} (first request only)",
                self.model_dir.display()
            );
            Captioner::new(model_path, tokenizer_path, self.config.clone())
        })
    }

    /// Generate a caption for the image
    ///
    /// # Errors
    /// Returns error if the model cannot be loaded or inference fails. The
    /// presentation layer is responsible for degrading this to an empty
    /// caption; the service itself never panics.
    pub fn caption(&self, image: &RgbImage) -> Result<Caption, CaptionError> {
        let model = self.get_or_load()?;
        let mut captioner = model
            .lock()
            .map_err(|e| CaptionError::Poisoned(e.to_string()))?;
        captioner.generate(image)
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
    fn test_missing_model_is_error_not_panic() {
        let service = CaptionService::new("does/not/exist", CaptionConfig::default());
        let img = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));

        let result = service.caption(&img);
        assert!(matches!(result, Err(CaptionError::ModelNotFound(_))));
        assert!(!service.is_loaded());
    }

    #[test]
    fn test_caption_with_real_model() {
        // Requires operator-supplied model artifacts; skip when absent
        let model_dir = std::path::Path::new("models/captioning");
        if !model_dir.join("blip.onnx").exists() || !model_dir.join("tokenizer.json").exists() {
            return;
        }

        let service = CaptionService::new(model_dir, CaptionConfig::default());
        let img = RgbImage::from_pixel(64, 64, Rgb([200, 180, 160]));

        let caption = service.caption(&img).expect("captioning failed");
        assert_eq!(caption.text, caption.text.trim());
        assert!(service.is_loaded());
    }
}
