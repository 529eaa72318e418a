//! Dataset module for leaf image data handling
//!
//! This module provides functionality for:
//! - Loading `train/`, `val/` and `test/` image folders
//! - Class name discovery and persistence
//! - Data augmentation for training robustness
//! - Burn `Dataset`/`Batcher` integration
//! - Splitting a flat class-folder dataset into the three splits

pub mod augmentation;
pub mod burn_dataset;
pub mod class_names;
pub mod folder;
pub mod split;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{AugmentingBatcher, EvalBatcher, LeafBatch, LeafImageDataset, LeafImageItem};
pub use class_names::{
    class_names_from_dataset, read_class_names_file, write_class_names_file, CLASS_NAMES_FILE,
};
pub use folder::{DatasetSplits, ImageFolder, ImageSample};
pub use split::{split_dataset, SplitRatios, SplitSummary};
