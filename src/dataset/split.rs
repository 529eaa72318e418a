//! Dataset Splitting
//!
//! Copies a flat `{class}/{image}` directory into `train/`, `val/` and
//! `test/` splits. Every class is split independently: its files are sorted,
//! shuffled with a seeded RNG, then cut by the configured ratios.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::class_names::sorted_subdirectories;
use crate::dataset::folder::list_image_files;

/// Split names, in output order
pub const SPLIT_NAMES: [&str; 3] = ["train", "val", "test"];

/// Fractions of each class assigned to train / val / test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.15,
            test: 0.15,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, val: f64, test: f64) -> Result<Self> {
        let ratios = Self { train, val, test };
        ratios.validate()?;
        Ok(ratios)
    }

    pub fn validate(&self) -> Result<()> {
        for value in [self.train, self.val, self.test] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("Split ratios must be within [0, 1], got {:?}", self);
            }
        }
        let sum = self.train + self.val + self.test;
        if (sum - 1.0).abs() > 1e-6 {
            anyhow::bail!("Split ratios must sum to 1.0, got {:.4}", sum);
        }
        Ok(())
    }

    /// Number of files going to train and val; the rest go to test
    pub fn counts(&self, n: usize) -> (usize, usize) {
        let train = (n as f64 * self.train).floor() as usize;
        let val = ((n as f64 * self.val).floor() as usize).min(n - train);
        (train, val)
    }
}

/// Per-class result of a split
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSplit {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl ClassSplit {
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

/// Summary of a completed split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSummary {
    pub output_dir: PathBuf,
    pub seed: u64,
    pub ratios: SplitRatios,
    pub classes: BTreeMap<String, ClassSplit>,
}

impl SplitSummary {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn totals(&self) -> ClassSplit {
        self.classes.values().fold(ClassSplit::default(), |acc, c| ClassSplit {
            train: acc.train + c.train,
            val: acc.val + c.val,
            test: acc.test + c.test,
        })
    }
}

/// Copy `input_dir/{class}/*` into `output_dir/{train,val,test}/{class}/*`
pub fn split_dataset(
    input_dir: &Path,
    output_dir: &Path,
    ratios: SplitRatios,
    seed: u64,
) -> Result<SplitSummary> {
    ratios.validate()?;

    if !input_dir.is_dir() {
        anyhow::bail!("Input folder not found: {}", input_dir.display());
    }

    let classes = sorted_subdirectories(input_dir)
        .with_context(|| format!("Failed to list classes in {}", input_dir.display()))?;
    if classes.is_empty() {
        anyhow::bail!("No class directories found in {}", input_dir.display());
    }

    info!(
        "Splitting {} classes from {} into {} (seed {})",
        classes.len(),
        input_dir.display(),
        output_dir.display(),
        seed
    );

    let class_files: Vec<(String, Vec<PathBuf>)> = classes
        .into_iter()
        .map(|class| {
            let files = list_image_files(&input_dir.join(&class));
            (class, files)
        })
        .collect();
    let total_files: usize = class_files.iter().map(|(_, files)| files.len()).sum();

    let pb = ProgressBar::new(total_files as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut summary = BTreeMap::new();

    for (class, mut files) in class_files {
        files.shuffle(&mut rng);

        let (n_train, n_val) = ratios.counts(files.len());
        let (train, rest) = files.split_at(n_train);
        let (val, test) = rest.split_at(n_val);

        for (split, chunk) in SPLIT_NAMES.iter().zip([train, val, test]) {
            let target_dir = output_dir.join(split).join(&class);
            fs::create_dir_all(&target_dir)
                .with_context(|| format!("Failed to create {}", target_dir.display()))?;

            for source in chunk {
                let Some(file_name) = source.file_name() else {
                    continue;
                };
                fs::copy(source, target_dir.join(file_name))
                    .with_context(|| format!("Failed to copy {}", source.display()))?;
                pb.inc(1);
            }
        }

        summary.insert(
            class,
            ClassSplit {
                train: train.len(),
                val: val.len(),
                test: test.len(),
            },
        );
    }

    pb.finish_and_clear();

    let summary = SplitSummary {
        output_dir: output_dir.to_path_buf(),
        seed,
        ratios,
        classes: summary,
    };
    let totals = summary.totals();
    info!(
        "Split complete: {} train, {} val, {} test",
        totals.train, totals.val, totals.test
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn make_class(root: &Path, class: &str, count: usize) {
        let dir = root.join(class);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let img = ImageBuffer::from_pixel(4, 4, Rgb([i as u8, 0u8, 0u8]));
            img.save(dir.join(format!("{class}_{i:03}.png"))).unwrap();
        }
    }

    fn names_in(dir: &Path) -> BTreeSet<String> {
        list_image_files(dir)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_counts_floor() {
        let ratios = SplitRatios::default();
        assert_eq!(ratios.counts(10), (7, 1));
        assert_eq!(ratios.counts(20), (14, 3));
        assert_eq!(ratios.counts(1), (0, 0));
        assert_eq!(ratios.counts(0), (0, 0));
    }

    #[test]
    fn test_invalid_ratios() {
        assert!(SplitRatios::new(0.8, 0.15, 0.15).is_err());
        assert!(SplitRatios::new(1.2, -0.1, -0.1).is_err());
        assert!(SplitRatios::new(0.6, 0.2, 0.2).is_ok());
    }

    #[test]
    fn test_split_partitions_each_class() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        make_class(input.path(), "healthy", 20);
        make_class(input.path(), "rust", 10);

        let summary =
            split_dataset(input.path(), output.path(), SplitRatios::default(), 42).unwrap();

        assert_eq!(summary.num_classes(), 2);
        assert_eq!(
            summary.classes["healthy"],
            ClassSplit { train: 14, val: 3, test: 3 }
        );
        assert_eq!(summary.classes["rust"], ClassSplit { train: 7, val: 1, test: 2 });

        // Disjoint and complete
        let train = names_in(&output.path().join("train/healthy"));
        let val = names_in(&output.path().join("val/healthy"));
        let test = names_in(&output.path().join("test/healthy"));
        assert!(train.is_disjoint(&val));
        assert!(train.is_disjoint(&test));
        assert!(val.is_disjoint(&test));
        assert_eq!(train.len() + val.len() + test.len(), 20);

        // Source is left untouched
        assert_eq!(list_image_files(&input.path().join("healthy")).len(), 20);
    }

    #[test]
    fn test_split_reproducible() {
        let input = tempdir().unwrap();
        make_class(input.path(), "a", 12);

        let out_a = tempdir().unwrap();
        let out_b = tempdir().unwrap();
        split_dataset(input.path(), out_a.path(), SplitRatios::default(), 7).unwrap();
        split_dataset(input.path(), out_b.path(), SplitRatios::default(), 7).unwrap();

        assert_eq!(
            names_in(&out_a.path().join("train/a")),
            names_in(&out_b.path().join("train/a"))
        );
    }

    #[test]
    fn test_missing_input() {
        let dir = tempdir().unwrap();
        let result = split_dataset(
            &dir.path().join("missing"),
            &dir.path().join("out"),
            SplitRatios::default(),
            42,
        );
        assert!(result.is_err());
    }
}
