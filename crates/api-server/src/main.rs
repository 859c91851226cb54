//! Image Studio server binary entry point

use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_studio_api_server::{start_server, ApiState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Bind address and model directory from environment, with defaults
    let addr = std::env::var("API_SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let models_dir = std::env::var("IMAGE_STUDIO_MODELS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models"));

    tracing::info!(
        "Starting Image Studio (models dir: {})",
        models_dir.display()
    );

    let state = ApiState::new(&models_dir);
    start_server(&addr, state).await?;

    Ok(())
}
