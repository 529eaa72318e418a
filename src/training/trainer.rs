//! Training loop
//!
//! A plain Burn loop rather than the high-level `LearnerBuilder`: shuffle,
//! batch on demand, step the optimizer, then evaluate the validation split on
//! the inner (non-autodiff) backend. The best validation model is kept and
//! written to disk; it is also the one scored on the test split at the end.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::burn_dataset::{AugmentingBatcher, EvalBatcher, LeafBatch, LeafImageDataset};
use crate::dataset::class_names::{write_class_names_file, CLASS_NAMES_FILE};
use crate::dataset::folder::{DatasetSplits, ImageFolder};
use crate::model::loader::{load_pretrained, save_model, weights_file};
use crate::model::mobilenet::{MobileNetV2, MobileNetV2Config};
use crate::training::config::TrainConfig;
use crate::training::early_stopping::EarlyStopping;
use crate::training::scheduler::LrScheduler;
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AccuracyTracker, Metrics, RunningAverage};

pub const CONFIG_FILE: &str = "config.json";
pub const HISTORY_FILE: &str = "history.json";
pub const TEST_METRICS_FILE: &str = "test_metrics.json";
pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.csv";

/// Per-epoch curves, indexed by epoch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub train_acc: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_acc: Vec<f64>,
    pub learning_rate: Vec<f64>,
    pub started_at: String,
    /// One-based epoch of the saved weights
    pub best_epoch: Option<usize>,
    pub best_val_acc: f64,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn epochs_run(&self) -> usize {
        self.train_loss.len()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub history: TrainingHistory,
    pub test_metrics: Metrics,
    /// `None` when validation accuracy never improved and nothing was written
    pub weights_path: Option<PathBuf>,
    pub class_names: Vec<String>,
}

/// Loss and accuracy of one pass over a split
#[derive(Debug, Clone, Default)]
pub struct EpochStats {
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default)]
struct Evaluation {
    stats: EpochStats,
    predictions: Vec<usize>,
    targets: Vec<usize>,
}

fn progress_bar(len: usize, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("  {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb
}

fn make_dataset(folder: &ImageFolder, cache: bool) -> LeafImageDataset {
    if cache {
        LeafImageDataset::new_cached(folder.samples.clone())
    } else {
        LeafImageDataset::from_folder(folder)
    }
}

/// Train a MobileNetV2 on `config.data_dir` and write the run's artifacts to
/// `config.output_dir`
pub fn run_training<B: AutodiffBackend>(
    config: &TrainConfig,
    device: &B::Device,
) -> Result<TrainingOutcome> {
    config.validate()?;

    println!("{}", "Loading Dataset...".cyan());
    let splits = DatasetSplits::load(&config.data_dir)
        .with_context(|| format!("Failed to load dataset from {}", config.data_dir.display()))?;
    let class_names = splits.class_names().to_vec();
    let num_classes = splits.num_classes();

    println!("  Classes:    {}", num_classes);
    println!("  Train:      {}", splits.train.len());
    println!("  Validation: {}", splits.val.len());
    println!("  Test:       {}", splits.test.len());
    for (name, count) in class_names.iter().zip(splits.train.class_distribution()) {
        debug!("  train/{:<40} {}", name, count);
    }

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("Failed to create output directory {}", config.output_dir.display())
    })?;
    write_class_names_file(&config.output_dir.join(CLASS_NAMES_FILE), &class_names)?;
    config.save_json(&config.output_dir.join(CONFIG_FILE))?;

    let train_dataset = make_dataset(&splits.train, config.cache_images);
    let val_dataset = make_dataset(&splits.val, config.cache_images);
    let test_dataset = make_dataset(&splits.test, config.cache_images);

    println!();
    println!("{}", "Creating Model...".cyan());
    let model = match &config.pretrained {
        Some(path) => load_pretrained::<B>(path, num_classes, device)?,
        None => {
            warn!("No pretrained weights given, training from random initialisation");
            MobileNetV2Config::new(num_classes)
                .with_width_mult(config.width_mult)
                .with_dropout(config.dropout)
                .init::<B>(device)
        }
    };
    let mut model = model.freeze_backbone(config.trainable_layers);
    info!(
        "Training the last {} of {} feature layers plus the classifier",
        config.trainable_layers.min(model.num_feature_layers()),
        model.num_feature_layers()
    );

    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay)
        .init();
    let smoothing = (config.label_smoothing > 0.0).then_some(config.label_smoothing);
    let loss_fn = CrossEntropyLossConfig::new()
        .with_smoothing(smoothing)
        .init(device);

    let train_batcher = AugmentingBatcher::with_config(
        config.augmentation.clone(),
        config.image_size,
        config.seed,
    );
    let eval_batcher = EvalBatcher::new(config.image_size);

    let mut scheduler = LrScheduler::new(config.scheduler.clone(), config.learning_rate);
    let mut early_stopping = EarlyStopping::new(config.patience);
    let mut logger = TrainingLogger::new(config.epochs);
    let mut history = TrainingHistory {
        started_at: Local::now().to_rfc3339(),
        ..Default::default()
    };
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);
    // Scored on the test split if no epoch ever improves
    let mut best_model: MobileNetV2<B::InnerBackend> = model.valid();
    let mut saved = false;
    let weights_path = config.weights_path();

    println!();
    println!("{}", "Starting Training...".green().bold());

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        let lr = scheduler.current_lr();

        let (trained, train_stats) = train_epoch(
            model,
            &mut optimizer,
            &loss_fn,
            &train_dataset,
            &train_batcher,
            config.batch_size,
            lr,
            &mut epoch_rng,
            device,
        );
        model = trained;

        let valid_model = model.valid();
        let val = evaluate::<B>(
            &valid_model,
            &val_dataset,
            &eval_batcher,
            config.batch_size,
            smoothing,
            device,
        );

        logger.end_epoch(
            train_stats.loss,
            train_stats.accuracy,
            val.stats.loss,
            val.stats.accuracy,
            lr,
        );
        history.train_loss.push(train_stats.loss);
        history.train_acc.push(train_stats.accuracy);
        history.val_loss.push(val.stats.loss);
        history.val_acc.push(val.stats.accuracy);
        history.learning_rate.push(lr);

        if early_stopping.update(epoch + 1, val.stats.accuracy) {
            logger.log_new_best(val.stats.accuracy);
            save_model(&valid_model, &weights_path)?;
            best_model = valid_model;
            saved = true;
        } else {
            logger.log_no_improvement(early_stopping.counter(), early_stopping.patience());
        }

        scheduler.step();

        if early_stopping.should_stop() {
            logger.log_early_stop(early_stopping.patience());
            history.stopped_early = true;
            break;
        }
    }

    history.best_epoch = early_stopping.best_epoch();
    history.best_val_acc = early_stopping.best_accuracy();
    logger.log_complete(history.epochs_run(), history.best_val_acc);

    let weights_path = if saved {
        Some(weights_file(&weights_path))
    } else {
        warn!("Validation accuracy never improved, no weights were written");
        None
    };
    history.save_json(&config.output_dir.join(HISTORY_FILE))?;

    println!();
    println!("{}", "Evaluating on Test Split...".cyan());
    let test = evaluate::<B>(
        &best_model,
        &test_dataset,
        &eval_batcher,
        config.batch_size,
        smoothing,
        device,
    );
    let test_metrics = Metrics::from_predictions(&test.predictions, &test.targets, num_classes)
        .with_class_names(&class_names);
    test_metrics.save_json(&config.output_dir.join(TEST_METRICS_FILE))?;
    test_metrics
        .confusion_matrix
        .save_csv(&config.output_dir.join(CONFUSION_MATRIX_FILE), &class_names)?;

    println!("  Accuracy:  {:.4}", test_metrics.accuracy);
    println!("  Precision: {:.4}", test_metrics.weighted_precision);
    println!("  Recall:    {:.4}", test_metrics.weighted_recall);
    println!("  F1-Score:  {:.4}", test_metrics.weighted_f1);

    println!();
    println!("{}", "Training Complete!".green().bold());
    if let Some(path) = &weights_path {
        println!("  Weights saved to: {}", path.display());
    }

    Ok(TrainingOutcome {
        history,
        test_metrics,
        weights_path,
        class_names,
    })
}

/// One pass over the shuffled training split
#[allow(clippy::too_many_arguments)]
fn train_epoch<B, O>(
    mut model: MobileNetV2<B>,
    optimizer: &mut O,
    loss_fn: &CrossEntropyLoss<B>,
    dataset: &LeafImageDataset,
    batcher: &AugmentingBatcher,
    batch_size: usize,
    learning_rate: f64,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) -> (MobileNetV2<B>, EpochStats)
where
    B: AutodiffBackend,
    O: Optimizer<MobileNetV2<B>, B>,
{
    let mut indices: Vec<usize> = (0..dataset.len()).collect();
    indices.shuffle(rng);

    let mut loss_avg = RunningAverage::new();
    let mut accuracy = AccuracyTracker::new();
    let pb = progress_bar(indices.len(), "train");

    for chunk in indices.chunks(batch_size) {
        let items: Vec<_> = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
        pb.inc(chunk.len() as u64);
        if items.is_empty() {
            continue;
        }

        let batch: LeafBatch<B> = batcher.batch(items, device);
        let n = batch.targets.dims()[0];

        let output = model.forward(batch.images);
        let loss = loss_fn.forward(output.clone(), batch.targets.clone());

        let loss_value: f64 = loss.clone().into_scalar().elem();
        loss_avg.add(loss_value, n);
        accuracy.add_batch(&argmax_labels(output), &int_labels(batch.targets));

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optimizer.step(learning_rate, model, grads);

        pb.set_message(format!("loss {:.4}", loss_avg.average()));
    }
    pb.finish_and_clear();

    let stats = EpochStats {
        loss: loss_avg.average(),
        accuracy: accuracy.accuracy(),
    };
    (model, stats)
}

/// Score a split without gradients.
///
/// Batches are built on the autodiff backend and unwrapped to the inner one.
fn evaluate<B: AutodiffBackend>(
    model: &MobileNetV2<B::InnerBackend>,
    dataset: &LeafImageDataset,
    batcher: &EvalBatcher,
    batch_size: usize,
    smoothing: Option<f32>,
    device: &B::Device,
) -> Evaluation {
    let mut loss_avg = RunningAverage::new();
    let mut evaluation = Evaluation::default();
    let pb = progress_bar(dataset.len(), "eval ");

    let indices: Vec<usize> = (0..dataset.len()).collect();
    for chunk in indices.chunks(batch_size) {
        let items: Vec<_> = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
        pb.inc(chunk.len() as u64);
        if items.is_empty() {
            continue;
        }

        let batch: LeafBatch<B> = batcher.batch(items, device);
        let images = batch.images.inner();
        let targets = batch.targets.inner();
        let n = targets.dims()[0];

        let output = model.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .with_smoothing(smoothing)
            .init(&output.device())
            .forward(output.clone(), targets.clone());
        let loss_value: f64 = loss.into_scalar().elem();
        loss_avg.add(loss_value, n);

        evaluation.predictions.extend(argmax_labels(output));
        evaluation.targets.extend(int_labels(targets));
    }
    pb.finish_and_clear();

    let mut accuracy = AccuracyTracker::new();
    accuracy.add_batch(&evaluation.predictions, &evaluation.targets);
    evaluation.stats = EpochStats {
        loss: loss_avg.average(),
        accuracy: accuracy.accuracy(),
    };
    evaluation
}

fn argmax_labels<B: Backend>(logits: Tensor<B, 2>) -> Vec<usize> {
    let n = logits.dims()[0];
    int_labels(logits.argmax(1).reshape([n]))
}

fn int_labels<B: Backend>(labels: Tensor<B, 1, Int>) -> Vec<usize> {
    labels
        .into_data()
        .iter::<i64>()
        .map(|v| v.max(0) as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};
    use tempfile::tempdir;

    type TestBackend = Autodiff<NdArray>;

    fn make_split(root: &Path, split: &str, per_class: usize) {
        for (class, color) in [("healthy", [30u8, 180, 40]), ("rust", [170u8, 90, 20])] {
            let dir = root.join(split).join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let img = ImageBuffer::from_pixel(24, 24, Rgb(color));
                img.save(dir.join(format!("{i}.png"))).unwrap();
            }
        }
    }

    #[test]
    fn test_history_serializes_curves() {
        let history = TrainingHistory {
            train_loss: vec![1.0, 0.5],
            val_acc: vec![0.4, 0.6],
            best_epoch: Some(2),
            ..Default::default()
        };
        let json = serde_json::to_string(&history).unwrap();
        assert!(json.contains("\"train_loss\":[1.0,0.5]"));
        assert_eq!(history.epochs_run(), 2);
    }

    #[test]
    fn test_run_training_writes_artifacts() {
        let data = tempdir().unwrap();
        let output = tempdir().unwrap();
        make_split(data.path(), "train", 2);
        make_split(data.path(), "val", 1);
        make_split(data.path(), "test", 1);

        let config = TrainConfig {
            data_dir: data.path().to_path_buf(),
            output_dir: output.path().to_path_buf(),
            image_size: 32,
            batch_size: 2,
            epochs: 2,
            width_mult: 0.35,
            augmentation: AugmentationConfig::none(),
            ..Default::default()
        };

        let device = Default::default();
        let outcome = run_training::<TestBackend>(&config, &device).unwrap();

        assert_eq!(outcome.class_names, vec!["healthy", "rust"]);
        assert!(outcome.history.epochs_run() >= 1);
        assert!(outcome.history.epochs_run() <= 2);
        assert_eq!(outcome.history.val_acc.len(), outcome.history.epochs_run());
        assert_eq!(outcome.test_metrics.total_samples, 2);
        assert!(outcome.weights_path.as_ref().unwrap().exists());

        for file in [
            CLASS_NAMES_FILE,
            CONFIG_FILE,
            HISTORY_FILE,
            TEST_METRICS_FILE,
            CONFUSION_MATRIX_FILE,
        ] {
            assert!(output.path().join(file).exists(), "missing {file}");
        }
        let names = std::fs::read_to_string(output.path().join(CLASS_NAMES_FILE)).unwrap();
        assert_eq!(names, "healthy\nrust");
    }

    #[test]
    fn test_run_training_without_improvement_writes_no_weights() {
        let data = tempdir().unwrap();
        let output = tempdir().unwrap();
        make_split(data.path(), "train", 2);
        make_split(data.path(), "test", 1);
        // Listed but undecodable, so validation accuracy stays at zero
        for class in ["healthy", "rust"] {
            let dir = data.path().join("val").join(class);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("broken.png"), b"not a png").unwrap();
        }

        let config = TrainConfig {
            data_dir: data.path().to_path_buf(),
            output_dir: output.path().to_path_buf(),
            image_size: 32,
            batch_size: 2,
            epochs: 2,
            width_mult: 0.35,
            augmentation: AugmentationConfig::none(),
            ..Default::default()
        };

        let device = Default::default();
        let outcome = run_training::<TestBackend>(&config, &device).unwrap();

        assert_eq!(outcome.history.epochs_run(), 2);
        assert_eq!(outcome.history.best_epoch, None);
        assert!(outcome.weights_path.is_none());
        assert!(!weights_file(&config.weights_path()).exists());
        // The initial model is still scored on the test split
        assert_eq!(outcome.test_metrics.total_samples, 2);
        assert!(output.path().join(TEST_METRICS_FILE).exists());
    }

    #[test]
    fn test_run_training_rejects_zero_epochs() {
        let data = tempdir().unwrap();
        make_split(data.path(), "train", 1);
        make_split(data.path(), "val", 1);
        make_split(data.path(), "test", 1);

        let config = TrainConfig {
            data_dir: data.path().to_path_buf(),
            output_dir: data.path().join("out"),
            epochs: 0,
            ..Default::default()
        };
        let device = Default::default();
        assert!(run_training::<TestBackend>(&config, &device).is_err());
        assert!(!data.path().join("out").exists());
    }

    #[test]
    fn test_run_training_missing_dataset() {
        let dir = tempdir().unwrap();
        let config = TrainConfig {
            data_dir: dir.path().join("missing"),
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let device = Default::default();
        assert!(run_training::<TestBackend>(&config, &device).is_err());
    }
}
