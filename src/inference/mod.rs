//! Inference module
//!
//! - `preprocess`: the fixed resize/normalize transform shared with evaluation
//! - `predictor`: single-image classification with a loaded model

pub mod predictor;
pub mod preprocess;

pub use predictor::{ClassProbability, Prediction, Predictor};
pub use preprocess::{preprocess_bytes, DEFAULT_IMAGE_SIZE, IMAGENET_MEAN, IMAGENET_STD};
