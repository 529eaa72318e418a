//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` traits for leaf images.
//!
//! - `EvalBatcher`: fixed resize + normalization (validation, test)
//! - `AugmentingBatcher`: random augmentation per item (training)

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::dataset::folder::{ImageFolder, ImageSample};
use crate::inference::preprocess::{normalize_chw, open_image, preprocess_image, to_unit_chw};
use crate::utils::error::Result;

/// A decoded image with its label
#[derive(Clone)]
pub struct LeafImageItem {
    /// Decoded image at its original size
    pub image: DynamicImage,
    pub label: usize,
    pub path: PathBuf,
}

impl LeafImageItem {
    pub fn from_sample(sample: &ImageSample) -> Result<Self> {
        Ok(Self {
            image: open_image(&sample.path)?,
            label: sample.label,
            path: sample.path.clone(),
        })
    }
}

impl std::fmt::Debug for LeafImageItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafImageItem")
            .field("label", &self.label)
            .field("path", &self.path)
            .field(
                "image_size",
                &format!("{}x{}", self.image.width(), self.image.height()),
            )
            .finish()
    }
}

/// Image dataset implementing Burn's Dataset trait.
///
/// Lazy by default: images are decoded on `get`. `new_cached` decodes
/// everything up front in parallel.
#[derive(Clone)]
pub struct LeafImageDataset {
    samples: Vec<ImageSample>,
    cached_items: Option<Vec<LeafImageItem>>,
}

impl std::fmt::Debug for LeafImageDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafImageDataset")
            .field("len", &self.samples.len())
            .field("cached", &self.cached_items.is_some())
            .finish()
    }
}

impl LeafImageDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self {
        Self {
            samples,
            cached_items: None,
        }
    }

    pub fn from_folder(folder: &ImageFolder) -> Self {
        Self::new(folder.samples.clone())
    }

    /// Decode all images into memory using rayon.
    ///
    /// Images that fail to decode are dropped with a warning.
    pub fn new_cached(samples: Vec<ImageSample>) -> Self {
        let total = samples.len();
        info!("Pre-loading {} images into memory", total);

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let loaded = AtomicUsize::new(0);

        let items: Vec<LeafImageItem> = samples
            .par_iter()
            .filter_map(|sample| {
                let result = match LeafImageItem::from_sample(sample) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!("Skipping unreadable image: {}", e);
                        None
                    }
                };
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    pb.set_position(count as u64);
                }
                result
            })
            .collect();

        pb.finish_with_message(format!("Loaded {} images", items.len()));

        let samples = items
            .iter()
            .map(|item| ImageSample {
                path: item.path.clone(),
                label: item.label,
            })
            .collect();

        Self {
            samples,
            cached_items: Some(items),
        }
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }
}

impl Dataset<LeafImageItem> for LeafImageDataset {
    fn get(&self, index: usize) -> Option<LeafImageItem> {
        if let Some(ref cached) = self.cached_items {
            return cached.get(index).cloned();
        }

        let sample = self.samples.get(index)?;
        match LeafImageItem::from_sample(sample) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping unreadable image: {}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images with their labels
#[derive(Clone, Debug)]
pub struct LeafBatch<B: Backend> {
    /// Shape `[batch_size, 3, image_size, image_size]`, normalized
    pub images: Tensor<B, 4>,
    /// Shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

fn build_batch<B: Backend>(
    images_data: Vec<f32>,
    targets_data: Vec<i64>,
    image_size: usize,
    device: &B::Device,
) -> LeafBatch<B> {
    let batch_size = targets_data.len();

    let images = Tensor::<B, 4>::from_floats(
        TensorData::new(images_data, [batch_size, 3, image_size, image_size]),
        device,
    );
    let targets =
        Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

    LeafBatch { images, targets }
}

/// Batcher applying the deterministic evaluation transform
#[derive(Clone, Debug)]
pub struct EvalBatcher {
    image_size: usize,
}

impl EvalBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, LeafImageItem, LeafBatch<B>> for EvalBatcher {
    fn batch(&self, items: Vec<LeafImageItem>, device: &B::Device) -> LeafBatch<B> {
        let processed: Vec<Vec<f32>> = items
            .par_iter()
            .map(|item| preprocess_image(&item.image, self.image_size))
            .collect();

        let images_data: Vec<f32> = processed.into_iter().flatten().collect();
        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();

        build_batch(images_data, targets_data, self.image_size, device)
    }
}

/// Batcher that applies random augmentation to each item.
///
/// Every item gets its own RNG derived from the seed, a batch counter and its
/// position, so a run with the same seed sees the same augmentations.
#[derive(Clone, Debug)]
pub struct AugmentingBatcher {
    augmenter: Augmenter,
    image_size: usize,
    seed: u64,
    batches: Arc<AtomicU64>,
}

impl AugmentingBatcher {
    /// Batcher with the default training augmentation
    pub fn new(image_size: usize, seed: u64) -> Self {
        Self::with_config(AugmentationConfig::default(), image_size, seed)
    }

    pub fn with_config(config: AugmentationConfig, image_size: usize, seed: u64) -> Self {
        Self {
            augmenter: Augmenter::new(config, image_size as u32),
            image_size,
            seed,
            batches: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<B: Backend> Batcher<B, LeafImageItem, LeafBatch<B>> for AugmentingBatcher {
    fn batch(&self, items: Vec<LeafImageItem>, device: &B::Device) -> LeafBatch<B> {
        let batch_index = self.batches.fetch_add(1, Ordering::Relaxed);
        let batch_seed = self
            .seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(batch_index);

        let processed: Vec<Vec<f32>> = items
            .par_iter()
            .enumerate()
            .map(|(i, item)| {
                let mut rng = ChaCha8Rng::seed_from_u64(batch_seed);
                rng.set_stream(i as u64);
                let augmented = self.augmenter.augment(&item.image, &mut rng);
                let mut data = to_unit_chw(&augmented);
                normalize_chw(&mut data);
                data
            })
            .collect();

        let images_data: Vec<f32> = processed.into_iter().flatten().collect();
        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();

        build_batch(images_data, targets_data, self.image_size, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};
    use std::path::Path;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn write_samples(dir: &Path, count: usize) -> Vec<ImageSample> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("leaf_{i}.png"));
                let img = ImageBuffer::from_fn(20 + i as u32, 16, |x, y| {
                    Rgb([(x * 10) as u8, (y * 10) as u8, (i * 40) as u8])
                });
                img.save(&path).unwrap();
                ImageSample { path, label: i % 2 }
            })
            .collect()
    }

    fn items(dataset: &LeafImageDataset) -> Vec<LeafImageItem> {
        (0..dataset.len()).filter_map(|i| dataset.get(i)).collect()
    }

    #[test]
    fn test_lazy_and_cached_datasets_agree() {
        let dir = tempdir().unwrap();
        let samples = write_samples(dir.path(), 3);

        let lazy = LeafImageDataset::new(samples.clone());
        let cached = LeafImageDataset::new_cached(samples);

        assert_eq!(lazy.len(), 3);
        assert_eq!(cached.len(), 3);
        assert_eq!(lazy.get(1).unwrap().label, 1);
        assert!(cached.get(3).is_none());
    }

    #[test]
    fn test_cached_drops_unreadable() {
        let dir = tempdir().unwrap();
        let mut samples = write_samples(dir.path(), 2);
        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"not png").unwrap();
        samples.push(ImageSample {
            path: broken,
            label: 0,
        });

        let cached = LeafImageDataset::new_cached(samples);
        assert_eq!(cached.len(), 2);
    }

    #[test]
    fn test_eval_batch_shapes() {
        let dir = tempdir().unwrap();
        let dataset = LeafImageDataset::new(write_samples(dir.path(), 3));
        let device = Default::default();

        let batch: LeafBatch<TestBackend> = EvalBatcher::new(8).batch(items(&dataset), &device);

        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![0, 1, 0]);
    }

    #[test]
    fn test_eval_batch_matches_single_preprocess() {
        let dir = tempdir().unwrap();
        let dataset = LeafImageDataset::new(write_samples(dir.path(), 1));
        let device = Default::default();
        let all = items(&dataset);

        let expected = preprocess_image(&all[0].image, 8);
        let batch: LeafBatch<TestBackend> = EvalBatcher::new(8).batch(all, &device);
        let values = batch.images.into_data().to_vec::<f32>().unwrap();

        assert_eq!(values, expected);
    }

    #[test]
    fn test_augmenting_batch_reproducible() {
        let dir = tempdir().unwrap();
        let dataset = LeafImageDataset::new(write_samples(dir.path(), 4));
        let device = Default::default();

        let a: LeafBatch<TestBackend> = AugmentingBatcher::new(12, 42).batch(items(&dataset), &device);
        let b: LeafBatch<TestBackend> = AugmentingBatcher::new(12, 42).batch(items(&dataset), &device);

        assert_eq!(a.images.dims(), [4, 3, 12, 12]);
        assert_eq!(
            a.images.into_data().to_vec::<f32>().unwrap(),
            b.images.into_data().to_vec::<f32>().unwrap()
        );
    }
}
