//! Model module: the MobileNetV2 network and its weight-file handling
//!
//! - `mobilenet`: network definition, classifier replacement and layer freezing
//! - `loader`: reading/writing weight files, class-count detection and
//!   class-name resolution for serving

pub mod loader;
pub mod mobilenet;

pub use loader::{load_model, save_model, ClassNameSource, LoadedModel, ModelLoader};
pub use mobilenet::{MobileNetV2, MobileNetV2Config};

/// Number of trailing feature layers left trainable during fine-tuning
pub const DEFAULT_TRAINABLE_LAYERS: usize = 3;
