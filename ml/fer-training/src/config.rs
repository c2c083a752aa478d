//! Training configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};

/// Configuration for a training run.
///
/// # Example
///
/// ```
/// use fer_training::TrainingConfig;
///
/// let config = TrainingConfig::default();
/// assert_eq!(config.epochs, 30);
/// assert_eq!(config.batch_size, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs.
    pub epochs: usize,

    /// Batch size.
    pub batch_size: usize,

    /// Optimizer configuration.
    pub optimizer: OptimizerConfig,

    /// Learning rate schedule.
    pub lr_schedule: LearningRateSchedule,

    /// Whether to shuffle the training batches each epoch.
    pub shuffle: bool,

    /// Validation frequency (epochs between validations).
    pub val_frequency: usize,

    /// Early stopping patience in validations (0 = disabled).
    pub early_stopping_patience: usize,

    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(30)
    }
}

impl TrainingConfig {
    /// Creates a new training config with the given epochs.
    ///
    /// Uses Adam at `1e-3` with a constant learning rate.
    #[must_use]
    pub const fn new(epochs: usize) -> Self {
        Self {
            epochs,
            batch_size: 32,
            optimizer: OptimizerConfig::adam(1e-3),
            lr_schedule: LearningRateSchedule::Constant,
            shuffle: true,
            val_frequency: 1,
            early_stopping_patience: 0,
            seed: None,
        }
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the number of epochs.
    #[must_use]
    pub const fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the optimizer.
    #[must_use]
    pub const fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the learning rate schedule.
    #[must_use]
    pub const fn with_lr_schedule(mut self, schedule: LearningRateSchedule) -> Self {
        self.lr_schedule = schedule;
        self
    }

    /// Sets the early stopping patience.
    #[must_use]
    pub const fn with_early_stopping(mut self, patience: usize) -> Self {
        self.early_stopping_patience = patience;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Disables shuffling.
    #[must_use]
    pub const fn without_shuffle(mut self) -> Self {
        self.shuffle = false;
        self
    }

    /// Validates the configuration.
    ///
    /// Returns `true` if all values are valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.epochs > 0
            && self.batch_size > 0
            && self.val_frequency > 0
            && self.optimizer.is_valid()
            && self.lr_schedule.is_valid()
    }

    /// Validates the configuration, naming the first invalid field.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] describing the problem.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TrainingError::invalid_config("epochs must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::invalid_config("batch size must be > 0"));
        }
        if self.val_frequency == 0 {
            return Err(TrainingError::invalid_config("val_frequency must be > 0"));
        }
        if !self.optimizer.is_valid() {
            return Err(TrainingError::invalid_config(format!(
                "invalid optimizer settings: {:?}",
                self.optimizer
            )));
        }
        if !self.lr_schedule.is_valid() {
            return Err(TrainingError::invalid_config(format!(
                "invalid learning rate schedule: {:?}",
                self.lr_schedule
            )));
        }
        Ok(())
    }

    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| TrainingError::io(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Optimizer configuration.
///
/// # Example
///
/// ```
/// use fer_training::OptimizerConfig;
///
/// let adam = OptimizerConfig::adam(1e-3);
/// assert_eq!(adam.learning_rate, 1e-3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Base learning rate.
    pub learning_rate: f32,

    /// Weight decay (L2 regularization, decoupled for `AdamW`).
    pub weight_decay: f32,

    /// Optimizer type.
    pub optimizer_type: OptimizerType,

    /// Momentum (for SGD).
    pub momentum: f32,

    /// Beta1 (for Adam).
    pub beta1: f32,

    /// Beta2 (for Adam).
    pub beta2: f32,

    /// Epsilon for numerical stability.
    pub epsilon: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::adam(1e-3)
    }
}

impl OptimizerConfig {
    /// Creates an Adam optimizer config with epsilon `1e-7`.
    #[must_use]
    pub const fn adam(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            weight_decay: 0.0,
            optimizer_type: OptimizerType::Adam,
            momentum: 0.0,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }

    /// Creates an `AdamW` optimizer config.
    #[must_use]
    pub const fn adam_w(learning_rate: f32, weight_decay: f32) -> Self {
        Self {
            weight_decay,
            optimizer_type: OptimizerType::AdamW,
            ..Self::adam(learning_rate)
        }
    }

    /// Creates an SGD optimizer config.
    #[must_use]
    pub const fn sgd(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            weight_decay: 0.0,
            optimizer_type: OptimizerType::Sgd,
            momentum: 0.0,
            beta1: 0.0,
            beta2: 0.0,
            epsilon: 1e-8,
        }
    }

    /// Creates an SGD with momentum optimizer config.
    #[must_use]
    pub const fn sgd_momentum(learning_rate: f32, momentum: f32) -> Self {
        Self {
            momentum,
            optimizer_type: OptimizerType::SgdMomentum,
            ..Self::sgd(learning_rate)
        }
    }

    /// Sets weight decay.
    #[must_use]
    pub const fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Validates the configuration.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.learning_rate > 0.0
            && self.weight_decay >= 0.0
            && (0.0..=1.0).contains(&self.momentum)
            && (0.0..1.0).contains(&self.beta1)
            && (0.0..1.0).contains(&self.beta2)
            && self.epsilon > 0.0
    }
}

/// Type of optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptimizerType {
    /// Stochastic Gradient Descent.
    Sgd,
    /// SGD with momentum.
    SgdMomentum,
    /// Adam optimizer.
    Adam,
    /// `AdamW` optimizer (Adam with decoupled weight decay).
    AdamW,
}

impl OptimizerType {
    /// Returns the optimizer name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sgd => "sgd",
            Self::SgdMomentum => "sgd-momentum",
            Self::Adam => "adam",
            Self::AdamW => "adamw",
        }
    }
}

impl std::fmt::Display for OptimizerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Learning rate schedule.
///
/// # Example
///
/// ```
/// use fer_training::LearningRateSchedule;
///
/// let schedule = LearningRateSchedule::step(0.1, 30);
/// assert!((schedule.compute_lr(1.0, 30, 100) - 0.1).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum LearningRateSchedule {
    /// Constant learning rate.
    #[default]
    Constant,

    /// Step decay: multiply by factor every `step_size` epochs.
    Step {
        /// Decay factor.
        factor: f32,
        /// Epochs between decays.
        step_size: usize,
    },

    /// Exponential decay: lr * gamma^epoch.
    Exponential {
        /// Decay rate per epoch.
        gamma: f32,
    },

    /// Cosine annealing to minimum.
    Cosine {
        /// Minimum learning rate.
        min_lr: f32,
    },

    /// Linear warmup followed by cosine decay.
    WarmupCosine {
        /// Warmup epochs.
        warmup_epochs: usize,
        /// Minimum learning rate.
        min_lr: f32,
    },
}

impl LearningRateSchedule {
    /// Creates a step decay schedule.
    #[must_use]
    pub const fn step(factor: f32, step_size: usize) -> Self {
        Self::Step { factor, step_size }
    }

    /// Creates an exponential decay schedule.
    #[must_use]
    pub const fn exponential(gamma: f32) -> Self {
        Self::Exponential { gamma }
    }

    /// Creates a cosine annealing schedule.
    #[must_use]
    pub const fn cosine(min_lr: f32) -> Self {
        Self::Cosine { min_lr }
    }

    /// Creates a warmup + cosine schedule.
    #[must_use]
    pub const fn warmup_cosine(warmup_epochs: usize, min_lr: f32) -> Self {
        Self::WarmupCosine {
            warmup_epochs,
            min_lr,
        }
    }

    /// Validates the schedule parameters.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Constant => true,
            Self::Step { factor, step_size } => *factor > 0.0 && *step_size > 0,
            Self::Exponential { gamma } => *gamma > 0.0,
            Self::Cosine { min_lr } | Self::WarmupCosine { min_lr, .. } => *min_lr >= 0.0,
        }
    }

    /// Computes the learning rate for a given epoch.
    ///
    /// # Arguments
    ///
    /// - `base_lr`: The base learning rate
    /// - `epoch`: Current epoch (0-indexed)
    /// - `total_epochs`: Total number of epochs
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap
    )]
    pub fn compute_lr(&self, base_lr: f32, epoch: usize, total_epochs: usize) -> f32 {
        match self {
            Self::Constant => base_lr,

            Self::Step { factor, step_size } => {
                let decays = epoch / (*step_size).max(1);
                base_lr * factor.powi(decays as i32)
            }

            Self::Exponential { gamma } => base_lr * gamma.powi(epoch as i32),

            Self::Cosine { min_lr } => {
                let progress = epoch as f32 / total_epochs.max(1) as f32;
                let cosine = (std::f32::consts::PI * progress).cos();
                min_lr + (base_lr - min_lr) * (1.0 + cosine) / 2.0
            }

            Self::WarmupCosine {
                warmup_epochs,
                min_lr,
            } => {
                if epoch < *warmup_epochs {
                    base_lr * (epoch + 1) as f32 / *warmup_epochs as f32
                } else {
                    let remaining = total_epochs.saturating_sub(*warmup_epochs);
                    let progress = (epoch - warmup_epochs) as f32 / remaining.max(1) as f32;
                    let cosine = (std::f32::consts::PI * progress).cos();
                    min_lr + (base_lr - min_lr) * (1.0 + cosine) / 2.0
                }
            }
        }
    }
}
