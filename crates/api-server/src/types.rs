//! API request and response types

use image_studio_common::LabelScore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response to a successful image upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub image_id: Uuid,
    pub width: u32,
    pub height: u32,
}

/// Caption result
///
/// `degraded` is true when the captioning service failed and the empty
/// caption is a fallback, not a model answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionResponse {
    pub caption: String,
    pub degraded: bool,
}

/// Classification result
///
/// `degraded` is true when the classification service failed and the empty
/// label list is a fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub labels: Vec<LabelScore>,
    pub degraded: bool,
}

/// Query parameters for the classify endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyQuery {
    /// Maximum number of results (default 5)
    pub top_k: Option<usize>,
}
