//! Image folder datasets
//!
//! A split directory holds one subdirectory per class:
//!
//! ```text
//! dataset_split/
//! ├── train/
//! │   ├── Apple___Apple_scab/
//! │   │   ├── image1.jpg
//! │   │   └── ...
//! │   └── ...
//! ├── val/
//! └── test/
//! ```
//!
//! Labels are positions in the alphabetical listing of `train/`. The val and
//! test splits are labelled by class name against that same listing, so a
//! class folder missing from one split cannot shift the indices of the rest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::class_names::sorted_subdirectories;
use crate::utils::error::{PlantDiseaseError, Result};

/// File extensions treated as images
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Whether a path has one of the supported image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by path
pub fn list_image_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| is_image_file(p))
        .collect();
    files.sort();
    files
}

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

/// One split of an image folder dataset
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root: PathBuf,
    pub class_names: Vec<String>,
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Load a split, deriving classes from its own sorted subdirectories
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let class_names = sorted_subdirectories(root)?;
        if class_names.is_empty() {
            return Err(PlantDiseaseError::Dataset(format!(
                "No class folders found in {}",
                root.display()
            )));
        }
        Self::with_classes(root, &class_names)
    }

    /// Load a split labelled against an existing class ordering.
    ///
    /// Class folders not present in `class_names` are skipped with a warning.
    pub fn with_classes<P: AsRef<Path>>(root: P, class_names: &[String]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let class_to_idx: HashMap<&str, usize> = class_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();

        let mut samples = Vec::new();
        for dir_name in sorted_subdirectories(&root)? {
            let Some(&label) = class_to_idx.get(dir_name.as_str()) else {
                warn!(
                    "Skipping class folder '{}' in {}: not a training class",
                    dir_name,
                    root.display()
                );
                continue;
            };

            let files = list_image_files(&root.join(&dir_name));
            debug!("Class '{}' (label {}): {} images", dir_name, label, files.len());
            samples.extend(files.into_iter().map(|path| ImageSample { path, label }));
        }

        info!(
            "Loaded {} images in {} classes from {}",
            samples.len(),
            class_names.len(),
            root.display()
        );

        Ok(Self {
            root,
            class_names: class_names.to_vec(),
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Number of samples per class index
    pub fn class_distribution(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            if let Some(count) = counts.get_mut(sample.label) {
                *count += 1;
            }
        }
        counts
    }
}

/// The three splits of a dataset directory
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: ImageFolder,
    pub val: ImageFolder,
    pub test: ImageFolder,
}

impl DatasetSplits {
    /// Load `train/`, `val/` and `test/` under `root`
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PlantDiseaseError::PathNotFound(root.to_path_buf()));
        }

        let train = ImageFolder::new(root.join("train"))?;
        let val = ImageFolder::with_classes(root.join("val"), &train.class_names)?;
        let test = ImageFolder::with_classes(root.join("test"), &train.class_names)?;

        for (name, split) in [("train", &train), ("val", &val), ("test", &test)] {
            if split.is_empty() {
                return Err(PlantDiseaseError::Dataset(format!(
                    "The {} split has no images",
                    name
                )));
            }
        }

        Ok(Self { train, val, test })
    }

    pub fn class_names(&self) -> &[String] {
        &self.train.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.train.num_classes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::fs;
    use tempfile::tempdir;

    fn write_image(path: &Path) {
        let img = ImageBuffer::from_pixel(8, 8, Rgb([10u8, 200, 30]));
        img.save(path).unwrap();
    }

    fn make_split(root: &Path, split: &str, classes: &[(&str, usize)]) {
        for (class, count) in classes {
            let dir = root.join(split).join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                write_image(&dir.join(format!("img_{i}.png")));
            }
        }
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("leaf.JPG")));
        assert!(is_image_file(Path::new("a/b/leaf.png")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_image_folder_labels_alphabetical() {
        let dir = tempdir().unwrap();
        make_split(dir.path(), "train", &[("zucchini", 1), ("apple", 2)]);
        fs::write(dir.path().join("train").join("apple").join("notes.txt"), "x").unwrap();

        let folder = ImageFolder::new(dir.path().join("train")).unwrap();

        assert_eq!(folder.class_names, vec!["apple", "zucchini"]);
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.class_distribution(), vec![2, 1]);
    }

    #[test]
    fn test_empty_split_has_no_classes() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("train")).unwrap();

        assert!(ImageFolder::new(dir.path().join("train")).is_err());
    }

    #[test]
    fn test_splits_share_train_indices() {
        let dir = tempdir().unwrap();
        make_split(dir.path(), "train", &[("a", 2), ("b", 2), ("c", 2)]);
        // val lacks class "a"; "c" must still be label 2
        make_split(dir.path(), "val", &[("b", 1), ("c", 1)]);
        make_split(dir.path(), "test", &[("a", 1), ("c", 1), ("unknown", 1)]);

        let splits = DatasetSplits::load(dir.path()).unwrap();

        assert_eq!(splits.num_classes(), 3);
        let val_labels: Vec<usize> = splits.val.samples.iter().map(|s| s.label).collect();
        assert_eq!(val_labels, vec![1, 2]);
        // Unknown class folder is skipped
        assert_eq!(splits.test.len(), 2);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let result = DatasetSplits::load(dir.path().join("nope"));
        assert!(matches!(result, Err(PlantDiseaseError::PathNotFound(_))));
    }
}
