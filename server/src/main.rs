//! Plant Disease Detection Server
//!
//! HTTP API serving the trained MobileNetV2 leaf classifier. Accepts an
//! image by URL, base64 string or multipart upload and returns the predicted
//! disease with per-class confidences.

mod acquire;
mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use plant_disease::dataset::class_names::CLASS_NAMES_FILE;
use plant_disease::model::loader::DEFAULT_WEIGHTS_FILE;
use plant_disease::utils::logging::{init_logging, LogConfig, LogLevel};

use crate::state::{AppState, ServerConfig};

/// Plant Disease Detection Server
#[derive(Parser, Debug)]
#[command(name = "plant-disease-server")]
#[command(version)]
#[command(about = "HTTP inference API for the MobileNetV2 plant disease classifier")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Trained weights
    #[arg(short, long, env = "MODEL_PATH", default_value = DEFAULT_WEIGHTS_FILE)]
    model: PathBuf,

    /// Class-name file, one name per line
    #[arg(long, env = "CLASS_NAMES_FILE", default_value = CLASS_NAMES_FILE)]
    class_names: PathBuf,

    /// Dataset root to derive class names from when the class-name file is missing
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Square input resolution
    #[arg(long, env = "IMAGE_SIZE", default_value = "224")]
    image_size: usize,

    /// Timeout for imageUrl downloads, in seconds
    #[arg(long, env = "DOWNLOAD_TIMEOUT_SECS", default_value = "10")]
    download_timeout: u64,

    /// Maximum request body size in bytes
    #[arg(long, env = "BODY_LIMIT", default_value = "16777216")]
    body_limit: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Bind the listening socket; `host` may be a hostname such as `localhost`
async fn bind(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig::service(LogLevel::parse(&cli.log_level)))
        .map_err(anyhow::Error::msg)?;

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        model_path: cli.model,
        data_dir: cli.data_dir,
        class_names_file: cli.class_names,
        image_size: cli.image_size,
        download_timeout: Duration::from_secs(cli.download_timeout),
        body_limit: cli.body_limit,
    };

    info!("Plant Disease Detection Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Model:       {:?}", config.model_path);
    info!("  Class names: {:?}", config.class_names_file);
    info!("  Data dir:    {:?}", config.data_dir);
    info!("  Image size:  {}", config.image_size);

    // No model, no server
    let state = Arc::new(AppState::load(config)?);
    info!(
        "Serving {} classes on {}",
        state.num_classes, state.device
    );

    let listener = bind(&state.config.host, state.config.port).await?;
    info!("Starting server on http://{}", listener.local_addr()?);

    let app = routes::router(state);
    axum::serve(listener, app).await?;

    Ok(())
}
