//! Error Handling Module
//!
//! Defines the error type shared by the model loader, dataset tools,
//! preprocessing and the training loop. Uses thiserror for the definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for plant disease classifier operations
#[derive(Error, Debug)]
pub enum PlantDiseaseError {
    /// Error decoding or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoadError(PathBuf, String),

    /// Image bytes could not be decoded
    #[error("Cannot identify image: {0}")]
    ImageDecode(String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction or weight loading
    #[error("Model error: {0}")]
    Model(String),

    /// Loaded weights do not fit the network architecture
    #[error("Architecture mismatch for '{layer}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        layer: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for PlantDiseaseError {
    fn from(err: serde_json::Error) -> Self {
        PlantDiseaseError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for PlantDiseaseError {
    fn from(err: csv::Error) -> Self {
        PlantDiseaseError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PlantDiseaseError {
    fn from(err: toml::de::Error) -> Self {
        PlantDiseaseError::Config(err.to_string())
    }
}

impl From<image::ImageError> for PlantDiseaseError {
    fn from(err: image::ImageError) -> Self {
        PlantDiseaseError::ImageDecode(err.to_string())
    }
}

/// Convenience Result type for plant disease classifier operations
pub type Result<T> = std::result::Result<T, PlantDiseaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlantDiseaseError::Dataset("no class folders".to_string());
        assert_eq!(format!("{}", err), "Dataset error: no class folders");
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = PlantDiseaseError::ShapeMismatch {
            layer: "classifier.weight".to_string(),
            expected: vec![1280, 38],
            found: vec![1024, 38],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("classifier.weight"));
        assert!(msg.contains("[1280, 38]"));
    }

    #[test]
    fn test_image_decode_from_image_error() {
        let err = image::load_from_memory(b"definitely not an image").unwrap_err();
        let converted: PlantDiseaseError = err.into();
        assert!(matches!(converted, PlantDiseaseError::ImageDecode(_)));
    }
}
