//! # Plant Disease Classification
//!
//! MobileNetV2 leaf disease classifier built with the Burn framework:
//! transfer-learning trainer, weight loading with class-name resolution, and
//! the single-image inference path used by the HTTP service in `server/`.
//!
//! ## Modules
//!
//! - `dataset`: image folders, class names, augmentation, batching, splitting
//! - `model`: MobileNetV2 architecture and weight loading
//! - `training`: fine-tuning loop, scheduling, early stopping
//! - `inference`: preprocessing and prediction
//! - `utils`: logging, metrics, errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plant_disease::backend::{default_device, InferenceBackend};
//! use plant_disease::inference::Predictor;
//! use plant_disease::model::ModelLoader;
//!
//! let device = default_device();
//! let loaded = ModelLoader::new("best_mobilenetv2.mpk").load::<InferenceBackend>(&device)?;
//! let predictor = Predictor::from_loaded(loaded, device);
//! let prediction = predictor.predict_file("leaf.jpg".as_ref())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{DatasetSplits, ImageFolder};
pub use inference::{Prediction, Predictor};
pub use model::{LoadedModel, MobileNetV2, MobileNetV2Config, ModelLoader};
pub use training::{run_training, TrainConfig};
pub use utils::error::{PlantDiseaseError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
