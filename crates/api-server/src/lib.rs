//! HTTP server and browser UI for the image studio
//!
//! Serves the single-page UI, accepts image uploads, and exposes the three
//! services as independent on-demand endpoints: captioning, background
//! removal, and classification.

mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use image::RgbImage;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use image_studio_captioning::{CaptionConfig, CaptionService};
use image_studio_classification::{ClassificationConfig, ClassificationService};
use image_studio_segmentation::{RemovalService, SegmentationConfig};

pub use handlers::*;
pub use types::*;

/// Maximum accepted upload size (25 MB covers large phone photos)
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// API server state shared across handlers
///
/// Uploaded images live in memory for the process lifetime; the three
/// services each hold their own lazily-loaded model singleton.
#[derive(Clone)]
pub struct ApiState {
    /// Uploaded images (`image_id` -> decoded bitmap)
    pub uploads: Arc<RwLock<HashMap<Uuid, RgbImage>>>,
    pub captioning: Arc<CaptionService>,
    pub removal: Arc<RemovalService>,
    pub classification: Arc<ClassificationService>,
}

impl ApiState {
    /// Create new API state with the fixed model directory layout
    ///
    /// `models_dir` contains `captioning/`, `segmentation/` and
    /// `classification/` subdirectories; nothing is loaded until each
    /// service's first request.
    #[must_use]
    pub fn new(models_dir: &Path) -> Self {
        Self {
            uploads: Arc::new(RwLock::new(HashMap::new())),
            captioning: Arc::new(CaptionService::new(
                models_dir.join("captioning"),
                CaptionConfig::default(),
            )),
            removal: Arc::new(RemovalService::new(
                models_dir.join("segmentation"),
                SegmentationConfig::default(),
            )),
            classification: Arc::new(ClassificationService::new(
                models_dir.join("classification"),
                ClassificationConfig::default(),
            )),
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // Browser UI
        .route("/", get(index))
        // Health check
        .route("/health", get(health_check))
        // Upload and preview
        .route("/api/v1/images", post(upload_image))
        .route("/api/v1/images/{image_id}", get(get_image))
        // The three studio services, invoked independently on demand
        .route("/api/v1/images/{image_id}/caption", get(caption_image))
        .route("/api/v1/images/{image_id}/classify", get(classify_image))
        .route("/api/v1/images/{image_id}/cutout", get(cutout_image))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting image studio server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_state_creation() {
        let state = ApiState::new(Path::new("models"));
        assert_eq!(state.uploads.blocking_read().len(), 0);
        assert!(!state.captioning.is_loaded());
        assert!(!state.removal.is_loaded());
        assert!(!state.classification.is_loaded());
    }
}
