//! Training lifecycle for facial expression models.
//!
//! This crate compiles, trains and evaluates the networks in `fer-models`
//! on datasets from `fer-dataset`:
//!
//! # Compilation
//!
//! - [`compile_simple_cnn`] - Two-stage CNN with Adam and cross-entropy
//! - [`compile_residual_classifier`] - Residual network, same setup
//! - [`CompiledModel`] - Network plus optimizer, loss and metrics
//!
//! # Training Components
//!
//! - [`TrainingConfig`] - Epochs, batch size, optimizer, schedule
//! - [`Trainer`] - Training loop with validation and early stopping
//! - [`TrainingHistory`] - Per-epoch metrics
//!
//! # Loss Functions
//!
//! - [`categorical_cross_entropy`] - Cross-entropy from logits and one-hot targets
//! - [`accuracy`] - Argmax accuracy
//!
//! # Plotting
//!
//! - [`plot_history_svg`] - Loss and accuracy curves as SVG
//! - [`save_history_plot`] - Same, written to a file
//!
//! # Example
//!
//! ```
//! use fer_training::{EpochMetrics, PlotParams, TrainingHistory, plot_history_svg};
//!
//! let mut history = TrainingHistory::new();
//! history.add_epoch(EpochMetrics::new(0, 1.8, 0.3).with_validation(1.9, 0.28));
//!
//! let svg = plot_history_svg(&history, &PlotParams::default());
//! assert!(svg.contains("Validation Loss"));
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod compile;
mod config;
mod error;
mod loss;
mod metrics;
mod plot;
mod trainer;

// Re-export compilation
pub use compile::{
    CompiledModel, DEFAULT_LEARNING_RATE, compile_residual_classifier, compile_simple_cnn,
};

// Re-export configuration
pub use config::{LearningRateSchedule, OptimizerConfig, OptimizerType, TrainingConfig};

// Re-export loss functions
pub use loss::{LossKind, Metric, accuracy, categorical_cross_entropy, correct_predictions};

// Re-export metrics
pub use metrics::{EpochMetrics, EvaluationMetrics, TrainingHistory};

// Re-export plotting
pub use plot::{PlotParams, plot_history_svg, save_history_plot};

// Re-export trainer
pub use trainer::{Trainer, TrainingState};

// Re-export error types
pub use error::{Result, TrainingError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        CompiledModel, EpochMetrics, EvaluationMetrics, LearningRateSchedule, LossKind, Metric,
        OptimizerConfig, OptimizerType, PlotParams, Trainer, TrainingConfig, TrainingError,
        TrainingHistory, TrainingState, compile_residual_classifier, compile_simple_cnn,
        plot_history_svg, save_history_plot,
    };
}
