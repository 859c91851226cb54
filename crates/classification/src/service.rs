//! Process-lifetime classification service with lazy model loading

use crate::{ClassificationConfig, ClassificationError, ImageClassifier, DEFAULT_TOP_K};
use image::RgbImage;
use image_studio_common::LabelScore;
use image_studio_core::LazyModel;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Classification service holding the cached `ImageClassifier` singleton
pub struct ClassificationService {
    model_dir: PathBuf,
    config: ClassificationConfig,
    model: LazyModel<ImageClassifier>,
}

impl ClassificationService {
    /// Create the service; no model is loaded until first use
    ///
    /// Expects `<model_dir>/vit.onnx` and `<model_dir>/labels.json`.
    pub fn new(model_dir: impl AsRef<Path>, config: ClassificationConfig) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            config,
            model: LazyModel::new(),
        }
    }

    fn get_or_load(&self) -> Result<&Mutex<ImageClassifier>, ClassificationError> {
        self.model.get_or_try_load(|| {
            let model_path = self.model_dir.join("vit.onnx");
            let labels_path = self.model_dir.join("labels.json");

            if !model_path.exists() {
                return Err(ClassificationError::ModelNotFound(
                    model_path.display().to_string(),
                ));
            }
            if !labels_path.exists() {
                return Err(ClassificationError::ModelNotFound(
                    labels_path.display().to_string(),
                ));
            }

            info!(
                "Loading classification model from {} (first request only)",
                self.model_dir.display()
            );
            ImageClassifier::new(model_path, labels_path, self.config.clone())
        })
    }

    /// Classify the image, returning at most `top_k` results
    ///
    /// `top_k` of `None` uses the default bound of 5.
    ///
    /// # Errors
    /// Returns error if the model cannot be loaded or inference fails. The
    /// presentation layer degrades this to an empty list.
    pub fn classify(
        &self,
        image: &RgbImage,
        top_k: Option<usize>,
    ) -> Result<Vec<LabelScore>, ClassificationError> {
        let model = self.get_or_load()?;
        let mut classifier = model
            .lock()
            .map_err(|e| ClassificationError::Poisoned(e.to_string()))?;
        classifier.classify(image, top_k.unwrap_or(DEFAULT_TOP_K))
    }

    /// Whether the underlying model has been loaded yet
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.is_loaded()
    }
}
