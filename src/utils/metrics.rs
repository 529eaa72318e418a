//! Metrics Module for Model Evaluation
//!
//! Provides the metrics reported after training on the held-out test split:
//! - Accuracy
//! - Precision, Recall, F1-score (per class, support-weighted and macro averages)
//! - Confusion Matrix
//!
//! plus the running trackers used inside the epoch loop.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Evaluation metrics for a classification run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// Precision averaged over classes, weighted by class support
    pub weighted_precision: f64,

    /// Recall averaged over classes, weighted by class support
    pub weighted_recall: f64,

    /// F1-score averaged over classes, weighted by class support
    pub weighted_f1: f64,

    /// Unweighted mean of per-class precision (classes with support only)
    pub macro_precision: f64,

    pub macro_recall: f64,

    pub macro_f1: f64,

    /// Per-class metrics
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Compute metrics from predicted and true class indices.
    ///
    /// Pairs are taken in order; extra entries in the longer slice are ignored.
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let total_samples = confusion_matrix.total();
        if total_samples == 0 {
            return Self {
                confusion_matrix,
                ..Self::default()
            };
        }

        let correct_predictions = confusion_matrix.correct();
        let accuracy = correct_predictions as f64 / total_samples as f64;

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        // Classes absent from the ground truth contribute zero weight, matching
        // support-weighted averaging.
        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if total_support == 0 {
                return 0.0;
            }
            per_class
                .iter()
                .map(|m| f(m) * m.support as f64)
                .sum::<f64>()
                / total_support as f64
        };

        let valid_classes: Vec<&ClassMetrics> =
            per_class.iter().filter(|m| m.support > 0).collect();
        let num_valid = valid_classes.len() as f64;
        let macro_avg = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if num_valid > 0.0 {
                valid_classes.iter().map(|m| f(m)).sum::<f64>() / num_valid
            } else {
                0.0
            }
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy,
            weighted_precision: weighted(|m| m.precision),
            weighted_recall: weighted(|m| m.recall),
            weighted_f1: weighted(|m| m.f1),
            macro_precision: macro_avg(|m| m.precision),
            macro_recall: macro_avg(|m| m.recall),
            macro_f1: macro_avg(|m| m.f1),
            per_class,
            confusion_matrix,
        }
    }

    /// Attach class names to the per-class entries
    pub fn with_class_names(mut self, class_names: &[String]) -> Self {
        for class in &mut self.per_class {
            class.class_name = class_names.get(class.class_idx).cloned();
        }
        self
    }

    /// Save as pretty-printed JSON
    pub fn save_json(&self, path: &Path) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Pretty print metrics
    pub fn display(&self) -> String {
        let mut output = String::new();

        output.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str("║                      Test Set Metrics                        ║\n");
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!("║ Accuracy:            {:6.2}%                                ║\n", self.accuracy * 100.0));
        output.push_str(&format!("║ Precision (weighted):{:6.2}%                                ║\n", self.weighted_precision * 100.0));
        output.push_str(&format!("║ Recall (weighted):   {:6.2}%                                ║\n", self.weighted_recall * 100.0));
        output.push_str(&format!("║ F1 (weighted):       {:6.2}%                                ║\n", self.weighted_f1 * 100.0));
        output.push_str(&format!("║ Macro F1:            {:6.2}%                                ║\n", self.macro_f1 * 100.0));
        output.push_str(&format!("║ Total Samples:       {:6}                                  ║\n", self.total_samples));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,

    pub class_name: Option<String>,

    pub true_positives: usize,

    pub false_positives: usize,

    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually another one
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as another one
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            true_positives as f64 / support as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,

    /// Row = actual, column = predicted, flat row-major storage
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction; out-of-range indices are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Write the matrix as CSV, rows actual and columns predicted.
    ///
    /// Headers use `class_names` where available, the class index otherwise.
    pub fn save_csv(&self, path: &Path, class_names: &[String]) -> crate::Result<()> {
        let label = |i: usize| {
            class_names
                .get(i)
                .cloned()
                .unwrap_or_else(|| i.to_string())
        };

        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec!["actual\\predicted".to_string()];
        header.extend((0..self.num_classes).map(&label));
        writer.write_record(&header)?;

        for row in 0..self.num_classes {
            let mut record = vec![label(row)];
            record.extend((0..self.num_classes).map(|col| self.get(row, col).to_string()));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Sample-weighted running average, for per-epoch loss
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch mean computed over `n` samples
    pub fn add(&mut self, value: f64, n: usize) {
        self.sum += value * n as f64;
        self.count += n;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Accuracy tracker for training
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch of predictions
    pub fn add_batch(&mut self, predictions: &[usize], ground_truth: &[usize]) {
        for (pred, gt) in predictions.iter().zip(ground_truth.iter()) {
            self.total += 1;
            if pred == gt {
                self.correct += 1;
            }
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.total > 0 {
            self.correct as f64 / self.total as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.get(2, 1), 1);

        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_class_metrics() {
        let predictions = vec![0, 0, 0, 1, 1];
        let ground_truth = vec![0, 0, 1, 1, 0];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);
        let class0 = ClassMetrics::from_confusion_matrix(&cm, 0);

        // Class 0: TP=2, FP=1, FN=1
        assert_eq!(class0.true_positives, 2);
        assert_eq!(class0.false_positives, 1);
        assert_eq!(class0.false_negatives, 1);
        assert_eq!(class0.support, 3);
        assert!((class0.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((class0.recall - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_averages() {
        // Class 0: 3 samples, all correct. Class 1: 1 sample, predicted as 0.
        let predictions = vec![0, 0, 0, 0];
        let ground_truth = vec![0, 0, 0, 1];

        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 2);

        // Class 0: P = 3/4, R = 1, F1 = 6/7. Class 1: all zero.
        assert!((metrics.accuracy - 0.75).abs() < 1e-9);
        assert!((metrics.weighted_precision - 0.75 * 0.75).abs() < 1e-9);
        assert!((metrics.weighted_recall - 0.75).abs() < 1e-9);
        assert!((metrics.weighted_f1 - 0.75 * 6.0 / 7.0).abs() < 1e-9);
        assert!((metrics.macro_recall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_recall_equals_accuracy() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(metrics.total_samples, 10);
        assert_eq!(metrics.correct_predictions, 7);
        assert!((metrics.weighted_recall - metrics.accuracy).abs() < 1e-9);
    }

    #[test]
    fn test_empty_predictions() {
        let metrics = Metrics::from_predictions(&[], &[], 4);
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.confusion_matrix.num_classes, 4);
    }

    #[test]
    fn test_class_names_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_metrics.json");

        let names = vec!["healthy".to_string(), "rust".to_string()];
        let metrics = Metrics::from_predictions(&[0, 1], &[0, 1], 2).with_class_names(&names);
        assert_eq!(metrics.per_class[1].class_name.as_deref(), Some("rust"));

        metrics.save_json(&path).unwrap();
        let loaded: Metrics =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.total_samples, 2);
        assert!((loaded.accuracy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confusion_matrix_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confusion_matrix.csv");

        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1, 2], &[0, 1, 0, 2], 3);
        let names = vec!["healthy".to_string(), "rust".to_string()];
        cm.save_csv(&path, &names).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "actual\\predicted,healthy,rust,2");
        assert_eq!(lines[1], "healthy,1,1,0");
        assert_eq!(lines[2], "rust,0,1,0");
        assert_eq!(lines[3], "2,0,0,1");
    }

    #[test]
    fn test_running_average_weights_by_batch_size() {
        let mut avg = RunningAverage::new();

        avg.add(1.0, 3);
        avg.add(3.0, 1);

        assert_eq!(avg.count(), 4);
        assert!((avg.average() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_tracker() {
        let mut tracker = AccuracyTracker::new();

        tracker.add_batch(&[0, 1, 2], &[0, 1, 0]);

        assert_eq!(tracker.count(), 3);
        assert!((tracker.accuracy() - 2.0 / 3.0).abs() < 1e-9);
    }
}
