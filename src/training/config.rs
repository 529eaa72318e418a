//! Training configuration
//!
//! Defaults reproduce the reference MobileNetV2 fine-tuning run. A config can
//! be loaded from TOML (missing keys fall back to the defaults) and is saved
//! as JSON next to the training outputs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::inference::preprocess::DEFAULT_IMAGE_SIZE;
use crate::model::loader::DEFAULT_WEIGHTS_FILE;
use crate::model::DEFAULT_TRAINABLE_LAYERS;
use crate::training::scheduler::SchedulerConfig;
use crate::utils::error::{PlantDiseaseError, Result};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Root holding `train/`, `val/` and `test/`
    pub data_dir: PathBuf,

    /// Where weights, class names, history and metrics are written
    pub output_dir: PathBuf,

    /// File name of the best weights inside `output_dir`
    pub weights_file: String,

    /// Optional ImageNet weights to start from
    pub pretrained: Option<PathBuf>,

    pub image_size: usize,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,

    /// AdamW decoupled weight decay
    pub weight_decay: f32,

    pub label_smoothing: f32,

    /// Epochs without improvement before stopping
    pub patience: usize,

    /// Feature layers left trainable (the classifier always trains)
    pub trainable_layers: usize,

    /// Classifier dropout
    pub dropout: f64,

    /// Channel width multiplier of the network
    pub width_mult: f64,

    pub scheduler: SchedulerConfig,
    pub augmentation: AugmentationConfig,

    /// Decode every image into memory before the first epoch
    pub cache_images: bool,

    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("dataset_split"),
            output_dir: PathBuf::from("output"),
            weights_file: DEFAULT_WEIGHTS_FILE.to_string(),
            pretrained: None,
            image_size: DEFAULT_IMAGE_SIZE,
            batch_size: 32,
            epochs: 30,
            learning_rate: 1e-4,
            weight_decay: 1e-4,
            label_smoothing: 0.1,
            patience: 5,
            trainable_layers: DEFAULT_TRAINABLE_LAYERS,
            dropout: 0.2,
            width_mult: 1.0,
            scheduler: SchedulerConfig::default(),
            augmentation: AugmentationConfig::default(),
            cache_images: false,
            seed: 42,
        }
    }
}

impl TrainConfig {
    /// Load from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn weights_path(&self) -> PathBuf {
        self.output_dir.join(&self.weights_file)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(PlantDiseaseError::Config("epochs must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(PlantDiseaseError::Config("batch_size must be > 0".into()));
        }
        if self.image_size == 0 {
            return Err(PlantDiseaseError::Config("image_size must be > 0".into()));
        }
        if self.learning_rate <= 0.0 {
            return Err(PlantDiseaseError::Config("learning_rate must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return Err(PlantDiseaseError::Config(
                "label_smoothing must be within [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = TrainConfig::default();
        assert_eq!(config.image_size, 224);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.epochs, 30);
        assert_eq!(config.patience, 5);
        assert_eq!(config.seed, 42);
        assert!((config.learning_rate - 1e-4).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.toml");
        std::fs::write(&path, "epochs = 3\nbatch_size = 8\ndata_dir = \"data\"\n").unwrap();

        let config = TrainConfig::from_toml_file(&path).unwrap();

        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.patience, 5);
    }

    #[test]
    fn test_invalid_toml_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.toml");
        std::fs::write(&path, "batch_size = 0\n").unwrap();

        assert!(TrainConfig::from_toml_file(&path).is_err());

        std::fs::write(&path, "epochs = 0\n").unwrap();
        assert!(TrainConfig::from_toml_file(&path).is_err());
    }

    #[test]
    fn test_save_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = TrainConfig::default();

        config.save_json(&path).unwrap();
        let loaded: TrainConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, config);
    }
}
