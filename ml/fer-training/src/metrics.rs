//! Training history and evaluation metrics.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};

/// Metrics for a single training epoch.
///
/// Accuracies are fractions in `[0, 1]`.
///
/// # Example
///
/// ```
/// use fer_training::EpochMetrics;
///
/// let metrics = EpochMetrics::new(0, 1.2, 0.45).with_validation(1.1, 0.5);
/// assert_eq!(metrics.epoch, 0);
/// assert_eq!(metrics.val_accuracy, Some(0.5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch number (0-indexed).
    pub epoch: usize,

    /// Mean training loss over the epoch's batches.
    pub train_loss: f32,

    /// Training accuracy over the epoch.
    pub train_accuracy: f32,

    /// Validation loss (if computed).
    pub val_loss: Option<f32>,

    /// Validation accuracy (if computed).
    pub val_accuracy: Option<f32>,

    /// Learning rate used.
    pub learning_rate: f32,

    /// Training time in seconds.
    pub train_time_secs: f32,

    /// Validation time in seconds.
    pub val_time_secs: Option<f32>,

    /// Number of training samples processed.
    pub train_samples: usize,

    /// Number of validation samples processed.
    pub val_samples: Option<usize>,
}

impl EpochMetrics {
    /// Creates new epoch metrics without validation results.
    #[must_use]
    pub const fn new(epoch: usize, train_loss: f32, train_accuracy: f32) -> Self {
        Self {
            epoch,
            train_loss,
            train_accuracy,
            val_loss: None,
            val_accuracy: None,
            learning_rate: 0.0,
            train_time_secs: 0.0,
            val_time_secs: None,
            train_samples: 0,
            val_samples: None,
        }
    }

    /// Sets validation loss and accuracy.
    #[must_use]
    pub const fn with_validation(mut self, loss: f32, accuracy: f32) -> Self {
        self.val_loss = Some(loss);
        self.val_accuracy = Some(accuracy);
        self
    }

    /// Sets the learning rate.
    #[must_use]
    pub const fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Sets the training time.
    #[must_use]
    pub const fn with_train_time(mut self, secs: f32) -> Self {
        self.train_time_secs = secs;
        self
    }

    /// Sets the validation time.
    #[must_use]
    pub const fn with_val_time(mut self, secs: f32) -> Self {
        self.val_time_secs = Some(secs);
        self
    }

    /// Sets sample counts.
    #[must_use]
    pub const fn with_samples(mut self, train: usize, val: Option<usize>) -> Self {
        self.train_samples = train;
        self.val_samples = val;
        self
    }

    /// Returns total time (train + val) in seconds.
    #[must_use]
    pub fn total_time_secs(&self) -> f32 {
        self.train_time_secs + self.val_time_secs.unwrap_or(0.0)
    }

    /// Returns true if validation loss improved (is lower than previous best).
    #[must_use]
    pub fn val_improved(&self, previous_best: Option<f32>) -> bool {
        match (self.val_loss, previous_best) {
            (Some(current), Some(best)) => current < best,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Loss and accuracy of a model over a whole dataset.
///
/// # Example
///
/// ```
/// use fer_training::EvaluationMetrics;
///
/// let eval = EvaluationMetrics::new(0.9, 0.62, 100);
/// assert_eq!(eval.correct(), 62);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Mean loss per sample.
    pub loss: f32,

    /// Fraction of samples classified correctly.
    pub accuracy: f32,

    /// Number of samples evaluated.
    pub samples: usize,
}

impl EvaluationMetrics {
    /// Creates evaluation metrics.
    #[must_use]
    pub const fn new(loss: f32, accuracy: f32, samples: usize) -> Self {
        Self {
            loss,
            accuracy,
            samples,
        }
    }

    /// Number of correctly classified samples.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn correct(&self) -> usize {
        (self.accuracy * self.samples as f32).round() as usize
    }
}

impl std::fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "loss {:.4}, accuracy {:.2}% ({} samples)",
            self.loss,
            self.accuracy * 100.0,
            self.samples
        )
    }
}

/// Per-epoch record of a training run.
///
/// Exposes the `loss`, `accuracy`, `val_loss` and `val_accuracy` series
/// consumed by the history plot.
///
/// # Example
///
/// ```
/// use fer_training::{EpochMetrics, TrainingHistory};
///
/// let mut history = TrainingHistory::new();
/// history.add_epoch(EpochMetrics::new(0, 0.5, 0.6).with_validation(0.4, 0.7));
/// history.add_epoch(EpochMetrics::new(1, 0.3, 0.8).with_validation(0.35, 0.75));
///
/// assert_eq!(history.epochs_completed(), 2);
/// assert_eq!(history.loss(), vec![0.5, 0.3]);
/// assert_eq!(history.best_epoch, Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Metrics for each epoch.
    pub epoch_metrics: Vec<EpochMetrics>,

    /// Best validation loss seen.
    pub best_val_loss: Option<f32>,

    /// Epoch with best validation loss.
    pub best_epoch: Option<usize>,

    /// Total training time in seconds.
    pub total_time_secs: f32,

    /// Whether training was early stopped.
    pub early_stopped: bool,

    /// Reason for stopping (if not completed normally).
    pub stop_reason: Option<String>,
}

impl TrainingHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds metrics for an epoch.
    pub fn add_epoch(&mut self, metrics: EpochMetrics) {
        if metrics.val_improved(self.best_val_loss) {
            self.best_val_loss = metrics.val_loss;
            self.best_epoch = Some(metrics.epoch);
        }

        self.total_time_secs += metrics.total_time_secs();
        self.epoch_metrics.push(metrics);
    }

    /// Returns the number of completed epochs.
    #[must_use]
    pub fn epochs_completed(&self) -> usize {
        self.epoch_metrics.len()
    }

    /// Returns true if no epoch has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epoch_metrics.is_empty()
    }

    /// Training loss per epoch.
    #[must_use]
    pub fn loss(&self) -> Vec<f32> {
        self.epoch_metrics.iter().map(|m| m.train_loss).collect()
    }

    /// Training accuracy per epoch.
    #[must_use]
    pub fn accuracy(&self) -> Vec<f32> {
        self.epoch_metrics.iter().map(|m| m.train_accuracy).collect()
    }

    /// Validation loss per epoch (`None` where validation was skipped).
    #[must_use]
    pub fn val_loss(&self) -> Vec<Option<f32>> {
        self.epoch_metrics.iter().map(|m| m.val_loss).collect()
    }

    /// Validation accuracy per epoch (`None` where validation was skipped).
    #[must_use]
    pub fn val_accuracy(&self) -> Vec<Option<f32>> {
        self.epoch_metrics.iter().map(|m| m.val_accuracy).collect()
    }

    /// Learning rate per epoch.
    #[must_use]
    pub fn learning_rates(&self) -> Vec<f32> {
        self.epoch_metrics.iter().map(|m| m.learning_rate).collect()
    }

    /// Returns the final training loss (NaN if empty).
    #[must_use]
    pub fn final_loss(&self) -> f32 {
        self.epoch_metrics.last().map_or(f32::NAN, |m| m.train_loss)
    }

    /// Returns the final training accuracy (NaN if empty).
    #[must_use]
    pub fn final_accuracy(&self) -> f32 {
        self.epoch_metrics
            .last()
            .map_or(f32::NAN, |m| m.train_accuracy)
    }

    /// Returns the most recent validation accuracy.
    #[must_use]
    pub fn final_val_accuracy(&self) -> Option<f32> {
        self.epoch_metrics.iter().rev().find_map(|m| m.val_accuracy)
    }

    /// Marks training as early stopped.
    pub fn set_early_stopped(&mut self, reason: impl Into<String>) {
        self.early_stopped = true;
        self.stop_reason = Some(reason.into());
    }

    /// Returns a human-readable summary.
    #[must_use]
    #[allow(clippy::let_underscore_must_use)] // String::write_fmt is infallible
    pub fn summary(&self) -> String {
        use std::fmt::Write;

        let mut s = String::new();
        let _ = writeln!(s, "Training Summary");
        let _ = writeln!(s, "================");
        let _ = writeln!(s, "Epochs completed: {}", self.epochs_completed());
        let _ = writeln!(s, "Total time: {:.1}s", self.total_time_secs);
        let _ = writeln!(
            s,
            "Final loss: {:.4}, accuracy: {:.2}%",
            self.final_loss(),
            self.final_accuracy() * 100.0
        );

        if let Some(val_accuracy) = self.final_val_accuracy() {
            let _ = writeln!(s, "Final val accuracy: {:.2}%", val_accuracy * 100.0);
        }

        if let Some(best) = self.best_val_loss {
            let _ = writeln!(
                s,
                "Best val loss: {:.4} (epoch {})",
                best,
                self.best_epoch.unwrap_or(0)
            );
        }

        if self.early_stopped {
            let _ = writeln!(
                s,
                "Early stopped: {}",
                self.stop_reason.as_deref().unwrap_or("yes")
            );
        }

        s
    }

    /// Writes the history as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reads a history written by [`TrainingHistory::save_json`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_json(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| TrainingError::io(format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> TrainingHistory {
        let mut history = TrainingHistory::new();
        history.add_epoch(
            EpochMetrics::new(0, 1.8, 0.25)
                .with_validation(1.7, 0.3)
                .with_train_time(2.0)
                .with_val_time(0.5),
        );
        history.add_epoch(EpochMetrics::new(1, 1.4, 0.45).with_train_time(2.0));
        history.add_epoch(
            EpochMetrics::new(2, 1.1, 0.6)
                .with_validation(1.9, 0.35)
                .with_train_time(2.0)
                .with_val_time(0.5),
        );
        history
    }

    #[test]
    fn epoch_metrics_builder() {
        let metrics = EpochMetrics::new(1, 0.3, 0.9)
            .with_validation(0.4, 0.85)
            .with_learning_rate(1e-3)
            .with_train_time(10.0)
            .with_val_time(2.0)
            .with_samples(1000, Some(200));

        assert!((metrics.learning_rate - 1e-3).abs() < 1e-9);
        assert!((metrics.total_time_secs() - 12.0).abs() < 1e-6);
        assert_eq!(metrics.train_samples, 1000);
        assert_eq!(metrics.val_samples, Some(200));
        assert_eq!(metrics.val_loss, Some(0.4));
    }

    #[test]
    fn epoch_metrics_val_improved() {
        let metrics = EpochMetrics::new(0, 0.5, 0.0).with_validation(0.4, 0.0);
        assert!(metrics.val_improved(Some(0.5)));
        assert!(!metrics.val_improved(Some(0.3)));
        assert!(metrics.val_improved(None));
        assert!(!EpochMetrics::new(0, 0.5, 0.0).val_improved(None));
    }

    #[test]
    fn history_series() {
        let history = history();
        assert_eq!(history.loss(), vec![1.8, 1.4, 1.1]);
        assert_eq!(history.accuracy(), vec![0.25, 0.45, 0.6]);
        assert_eq!(history.val_loss(), vec![Some(1.7), None, Some(1.9)]);
        assert_eq!(history.val_accuracy(), vec![Some(0.3), None, Some(0.35)]);
    }

    #[test]
    fn history_tracks_best_epoch() {
        let history = history();
        assert_eq!(history.best_val_loss, Some(1.7));
        assert_eq!(history.best_epoch, Some(0));
        assert!((history.total_time_secs - 7.0).abs() < 1e-6);
        assert_eq!(history.final_val_accuracy(), Some(0.35));
    }

    #[test]
    fn history_summary() {
        let mut history = history();
        history.set_early_stopped("no improvement for 1 validations");
        let summary = history.summary();

        assert!(summary.contains("Epochs completed: 3"));
        assert!(summary.contains("accuracy: 60.00%"));
        assert!(summary.contains("Best val loss: 1.7000 (epoch 0)"));
        assert!(summary.contains("Early stopped: no improvement"));
    }

    #[test]
    fn history_empty() {
        let history = TrainingHistory::new();
        assert!(history.is_empty());
        assert!(history.final_loss().is_nan());
        assert_eq!(history.final_val_accuracy(), None);
    }

    #[test]
    fn history_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = history();

        history.save_json(&path).unwrap();
        assert_eq!(TrainingHistory::load_json(&path).unwrap(), history);
    }

    #[test]
    fn evaluation_metrics_display() {
        let eval = EvaluationMetrics::new(0.9123, 0.625, 8);
        assert_eq!(eval.correct(), 5);
        assert_eq!(eval.to_string(), "loss 0.9123, accuracy 62.50% (8 samples)");
    }
}
