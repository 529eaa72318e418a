//! Utilities module for logging, metrics, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Evaluation metrics (accuracy, weighted precision/recall/F1, confusion matrix)
//! - Error handling types
//! - Formatting helpers for CLI output

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{PlantDiseaseError, Result};
pub use logging::init_logging;
pub use metrics::{ConfusionMatrix, Metrics};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Render a probability as a fixed-width bar, used for top-k CLI output
pub fn format_probability_bar(probability: f32, width: usize) -> String {
    let filled = (probability.clamp(0.0, 1.0) * width as f32).round() as usize;
    let empty = width.saturating_sub(filled);

    format!(
        "[{}{}] {:.2}%",
        "█".repeat(filled),
        "░".repeat(empty),
        probability * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_format_probability_bar() {
        let bar = format_probability_bar(0.5, 10);
        assert!(bar.contains("50.00%"));
        assert!(bar.contains("█████░░░░░"));
    }
}
