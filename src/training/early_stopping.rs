//! Early stopping on validation accuracy

use serde::{Deserialize, Serialize};

/// Tracks the best validation accuracy and epochs without improvement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStopping {
    patience: usize,
    best_accuracy: f64,
    best_epoch: Option<usize>,
    counter: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_accuracy: 0.0,
            best_epoch: None,
            counter: 0,
        }
    }

    /// Record one epoch's validation accuracy.
    ///
    /// Returns true on a strict improvement, which resets the counter.
    pub fn update(&mut self, epoch: usize, val_accuracy: f64) -> bool {
        if val_accuracy > self.best_accuracy {
            self.best_accuracy = val_accuracy;
            self.best_epoch = Some(epoch);
            self.counter = 0;
            true
        } else {
            self.counter += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.counter >= self.patience
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}
