//! HTTP request handlers for the studio endpoints
//!
//! Error policy (service boundary): ingestion failures become 400, unknown
//! image ids become 404, and failures inside the three services are absorbed
//! here — logged and converted to degraded payloads, never 5xx.
//!
//! Inference runs for seconds on first load, so the three service handlers
//! dispatch through `spawn_blocking` instead of blocking a runtime worker.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use image::RgbImage;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::types::{
    CaptionResponse, ClassifyQuery, ClassifyResponse, HealthResponse, UploadResponse,
};
use crate::ApiState;
use image_studio_core::image_io::{decode_image, encode_png_rgb, encode_png_rgba};
use image_studio_segmentation::{with_opaque_alpha, CutoutOutcome};

/// Fixed filename offered for the background-removed download
const CUTOUT_FILENAME: &str = "background_removed.png";

/// Browser UI, embedded at build time
pub async fn index() -> impl IntoResponse {
    Html(include_str!("../assets/index.html"))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Upload an image (multipart `file` field, PNG or JPEG)
///
/// Decodes eagerly so later service calls always see a valid bitmap; a
/// buffer that fails to decode is rejected here with 400.
pub async fn upload_image(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Malformed upload: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read upload: {e}")))?;
            data = Some(bytes);
            break;
        }
    }

    let data = data.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "Missing 'file' field in upload".to_string(),
        )
    })?;

    let img = decode_image(&data)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to decode image: {e}")))?;

    let (width, height) = img.dimensions();
    let image_id = Uuid::new_v4();
    info!("Upload {}: {}x{} ({} bytes)", image_id, width, height, data.len());

    state.uploads.write().await.insert(image_id, img);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            image_id,
            width,
            height,
        }),
    ))
}

/// Original image re-encoded as PNG (preview panel)
pub async fn get_image(
    State(state): State<ApiState>,
    Path(image_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let img = lookup_image(&state, image_id).await?;

    let png = encode_png_rgb(&img).map_err(|e| {
        error!("Failed to encode preview for {}: {e}", image_id);
        (StatusCode::INTERNAL_SERVER_ERROR, "Encoding failed".to_string())
    })?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// Generate a caption for the uploaded image
///
/// Service failures degrade to an empty caption with `degraded: true`.
pub async fn caption_image(
    State(state): State<ApiState>,
    Path(image_id): Path<Uuid>,
) -> Result<Json<CaptionResponse>, (StatusCode, String)> {
    let img = lookup_image(&state, image_id).await?;

    let service = Arc::clone(&state.captioning);
    let result = tokio::task::spawn_blocking(move || service.caption(&img))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()));

    let response = match result {
        Ok(caption) => CaptionResponse {
            caption: caption.text,
            degraded: false,
        },
        Err(e) => {
            error!("Captioning failed for {}: {e}", image_id);
            CaptionResponse {
                caption: String::new(),
                degraded: true,
            }
        }
    };

    Ok(Json(response))
}

/// Classify the uploaded image (`top_k` query parameter, default 5)
///
/// Service failures degrade to an empty label list with `degraded: true`.
pub async fn classify_image(
    State(state): State<ApiState>,
    Path(image_id): Path<Uuid>,
    Query(query): Query<ClassifyQuery>,
) -> Result<Json<ClassifyResponse>, (StatusCode, String)> {
    let img = lookup_image(&state, image_id).await?;

    let service = Arc::clone(&state.classification);
    let result = tokio::task::spawn_blocking(move || service.classify(&img, query.top_k))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()));

    let response = match result {
        Ok(labels) => ClassifyResponse {
            labels,
            degraded: false,
        },
        Err(e) => {
            error!("Classification failed for {}: {e}", image_id);
            ClassifyResponse {
                labels: Vec::new(),
                degraded: true,
            }
        }
    };

    Ok(Json(response))
}

/// Remove the background and return the cutout as a downloadable PNG
///
/// On service failure the original image is returned with an opaque alpha
/// channel and `X-Degraded: true`, so the UI can tell the fallback apart
/// from a genuine all-foreground result.
pub async fn cutout_image(
    State(state): State<ApiState>,
    Path(image_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let img = lookup_image(&state, image_id).await?;

    let service = Arc::clone(&state.removal);
    // `img` moves into the task; keep a copy for the join-failure fallback
    let fallback = img.clone();
    let outcome = tokio::task::spawn_blocking(move || service.cutout(&img))
        .await
        .unwrap_or_else(|e| {
            error!("Cutout task failed for {}: {e}", image_id);
            CutoutOutcome {
                image: with_opaque_alpha(&fallback),
                degraded: true,
            }
        });

    let png = encode_png_rgba(&outcome.image).map_err(|e| {
        error!("Failed to encode cutout for {}: {e}", image_id);
        (StatusCode::INTERNAL_SERVER_ERROR, "Encoding failed".to_string())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{CUTOUT_FILENAME}\""),
            ),
            (
                header::HeaderName::from_static("x-degraded"),
                outcome.degraded.to_string(),
            ),
        ],
        png,
    ))
}

/// Fetch a stored upload by id, cloning it out so the lock is not held
/// across inference
async fn lookup_image(
    state: &ApiState,
    image_id: Uuid,
) -> Result<RgbImage, (StatusCode, String)> {
    state
        .uploads
        .read()
        .await
        .get(&image_id)
        .cloned()
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("Unknown image id: {image_id}"),
            )
        })
}
