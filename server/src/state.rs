//! Application state for the inference server
//!
//! Holds the loaded model and its class names. Both are read-only after
//! startup.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use plant_disease::backend::{default_device, device_label, InferenceBackend};
use plant_disease::dataset::class_names::CLASS_NAMES_FILE;
use plant_disease::inference::{Predictor, DEFAULT_IMAGE_SIZE};
use plant_disease::model::loader::DEFAULT_WEIGHTS_FILE;
use plant_disease::model::ModelLoader;

use crate::error::ApiError;

/// Server configuration
#[derive(Clone, Debug, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Trained weights
    pub model_path: PathBuf,
    /// Dataset root, used when the class-name file is missing
    pub data_dir: Option<PathBuf>,
    pub class_names_file: PathBuf,
    /// Square input resolution
    pub image_size: usize,
    /// Timeout for `imageUrl` downloads
    pub download_timeout: Duration,
    /// Maximum request body size in bytes
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            model_path: PathBuf::from(DEFAULT_WEIGHTS_FILE),
            data_dir: None,
            class_names_file: PathBuf::from(CLASS_NAMES_FILE),
            image_size: DEFAULT_IMAGE_SIZE,
            download_timeout: Duration::from_secs(10),
            body_limit: 16 * 1024 * 1024,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    /// Burn modules are `Send` but not `Sync`; the lock only guards the
    /// per-request clone, inference runs on the clone
    predictor: Mutex<Predictor<InferenceBackend>>,
    pub class_names: Vec<String>,
    pub num_classes: usize,
    /// Device label reported by `/health`
    pub device: &'static str,
    /// Client for `imageUrl` downloads
    pub http: reqwest::Client,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, predictor: Predictor<InferenceBackend>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let class_names = predictor.class_names().to_vec();
        let num_classes = predictor.num_classes();

        Ok(Self {
            config,
            predictor: Mutex::new(predictor),
            class_names,
            num_classes,
            device: device_label(),
            http,
            started_at: Instant::now(),
        })
    }

    /// Load the weights and class names named in `config`.
    ///
    /// Any failure here is fatal: the server does not start without a model.
    pub fn load(config: ServerConfig) -> anyhow::Result<Self> {
        let device = default_device();
        let loaded = ModelLoader::new(&config.model_path)
            .with_class_names_file(&config.class_names_file)
            .with_data_dir(config.data_dir.clone())
            .load::<InferenceBackend>(&device)
            .with_context(|| format!("Failed to load model from {}", config.model_path.display()))?;

        info!(
            "Model loaded: {} classes, names from {}",
            loaded.num_classes, loaded.class_name_source
        );

        let predictor =
            Predictor::from_loaded(loaded, device).with_image_size(config.image_size);
        Self::new(config, predictor)
    }

    /// A handle to the model for one request
    pub fn predictor(&self) -> Result<Predictor<InferenceBackend>, ApiError> {
        self.predictor
            .lock()
            .map(|predictor| predictor.clone())
            .map_err(|_| ApiError::Internal("Model lock poisoned".to_string()))
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_state_is_shareable_across_handlers() {
        assert_send_sync::<AppState>();
        assert_send_sync::<SharedState>();
    }
}
