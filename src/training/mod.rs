//! Training module
//!
//! This module provides:
//! - `TrainConfig`: hyperparameters, loadable from TOML
//! - Epoch-level learning rate scheduling
//! - Early stopping on validation accuracy
//! - The fine-tuning loop with test-split evaluation

pub mod config;
pub mod early_stopping;
pub mod scheduler;
pub mod trainer;

pub use config::TrainConfig;
pub use early_stopping::EarlyStopping;
pub use scheduler::{LrScheduler, SchedulerConfig};
pub use trainer::{run_training, TrainingHistory, TrainingOutcome};
