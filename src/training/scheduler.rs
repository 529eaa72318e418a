//! Learning Rate Scheduler Module
//!
//! Epoch-level learning rate schedules. `LrScheduler` is stepped once per
//! epoch, after validation.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Learning rate schedule, relative to the configured initial learning rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerConfig {
    /// Constant learning rate (no scheduling)
    Constant,

    /// Step decay: multiply by `decay_factor` at each listed epoch
    StepDecay {
        decay_factor: f64,
        step_epochs: Vec<usize>,
    },

    /// Single cosine decay from the initial rate to `min_lr` over `total_epochs`
    CosineAnnealing { min_lr: f64, total_epochs: usize },

    /// Cosine decay restarted every cycle; cycle `i` lasts `t_0 * t_mult^i` epochs
    CosineWarmRestarts {
        t_0: usize,
        t_mult: usize,
        min_lr: f64,
    },
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::CosineWarmRestarts {
            t_0: 5,
            t_mult: 2,
            min_lr: 0.0,
        }
    }
}

impl SchedulerConfig {
    /// Learning rate after `epoch` scheduler steps
    pub fn lr_at(&self, initial_lr: f64, epoch: usize) -> f64 {
        match self {
            Self::Constant => initial_lr,

            Self::StepDecay {
                decay_factor,
                step_epochs,
            } => {
                let steps = step_epochs.iter().filter(|&&e| epoch >= e).count();
                initial_lr * decay_factor.powi(steps as i32)
            }

            Self::CosineAnnealing {
                min_lr,
                total_epochs,
            } => {
                let total = (*total_epochs).max(1);
                let progress = epoch.min(total) as f64 / total as f64;
                cosine(initial_lr, *min_lr, progress)
            }

            Self::CosineWarmRestarts { t_0, t_mult, min_lr } => {
                let mut cycle_len = (*t_0).max(1);
                let mut t_cur = epoch;
                while t_cur >= cycle_len {
                    t_cur -= cycle_len;
                    cycle_len *= (*t_mult).max(1);
                }
                cosine(initial_lr, *min_lr, t_cur as f64 / cycle_len as f64)
            }
        }
    }
}

fn cosine(max_lr: f64, min_lr: f64, progress: f64) -> f64 {
    min_lr + (max_lr - min_lr) * (1.0 + (PI * progress).cos()) / 2.0
}

/// Stateful scheduler
#[derive(Debug, Clone)]
pub struct LrScheduler {
    config: SchedulerConfig,
    initial_lr: f64,
    epoch: usize,
}

impl LrScheduler {
    pub fn new(config: SchedulerConfig, initial_lr: f64) -> Self {
        Self {
            config,
            initial_lr,
            epoch: 0,
        }
    }

    /// Learning rate for the current epoch
    pub fn current_lr(&self) -> f64 {
        self.config.lr_at(self.initial_lr, self.epoch)
    }

    /// Advance one epoch and return the new learning rate
    pub fn step(&mut self) -> f64 {
        self.epoch += 1;
        self.current_lr()
    }

    pub fn epochs_stepped(&self) -> usize {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_constant() {
        let mut scheduler = LrScheduler::new(SchedulerConfig::Constant, 0.01);
        assert!(close(scheduler.current_lr(), 0.01));
        assert!(close(scheduler.step(), 0.01));
    }

    #[test]
    fn test_step_decay() {
        let config = SchedulerConfig::StepDecay {
            decay_factor: 0.1,
            step_epochs: vec![2, 4],
        };
        assert!(close(config.lr_at(1.0, 1), 1.0));
        assert!(close(config.lr_at(1.0, 2), 0.1));
        assert!((config.lr_at(1.0, 5) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_annealing_endpoints() {
        let config = SchedulerConfig::CosineAnnealing {
            min_lr: 0.0,
            total_epochs: 10,
        };
        assert!(close(config.lr_at(1.0, 0), 1.0));
        assert!(close(config.lr_at(1.0, 5), 0.5));
        assert!(config.lr_at(1.0, 10).abs() < 1e-12);
        assert!(config.lr_at(1.0, 20).abs() < 1e-12);
    }

    #[test]
    fn test_warm_restarts_cycle_lengths() {
        let config = SchedulerConfig::default();
        let lr = 1e-4;

        // Restarts after 5, then 10, then 20 epochs
        for restart in [0, 5, 15, 35] {
            assert!(close(config.lr_at(lr, restart), lr), "epoch {restart}");
        }

        let expected = lr * (1.0 + (PI / 5.0).cos()) / 2.0;
        assert!(close(config.lr_at(lr, 1), expected));

        // Middle of the second (10-epoch) cycle
        assert!(close(config.lr_at(lr, 10), lr / 2.0));
        assert!(config.lr_at(lr, 14) < config.lr_at(lr, 13));
    }

    #[test]
    fn test_scheduler_steps() {
        let mut scheduler = LrScheduler::new(SchedulerConfig::default(), 1.0);
        let lrs: Vec<f64> = (0..6).map(|_| scheduler.step()).collect();

        assert_eq!(scheduler.epochs_stepped(), 6);
        assert!(lrs[0] > lrs[3]);
        assert!(close(lrs[4], 1.0));
    }

    #[test]
    fn test_config_serde_tagged() {
        let json = serde_json::to_string(&SchedulerConfig::default()).unwrap();
        assert!(json.contains("\"type\":\"cosine_warm_restarts\""));
        let parsed: SchedulerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, SchedulerConfig::default());
    }
}
