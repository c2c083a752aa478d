//! Loss functions and metrics for expression classification.

use burn::prelude::Backend;
use burn::tensor::activation::log_softmax;
use burn::tensor::{ElementConversion, Int, Tensor};
use serde::{Deserialize, Serialize};

/// Loss a compiled model is trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LossKind {
    /// Cross-entropy against one-hot (categorical) targets.
    #[default]
    CategoricalCrossEntropy,
}

impl LossKind {
    /// Computes the loss for a batch.
    pub fn compute<B: Backend>(&self, logits: Tensor<B, 2>, one_hot: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            Self::CategoricalCrossEntropy => categorical_cross_entropy(logits, one_hot),
        }
    }

    /// Returns the loss name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CategoricalCrossEntropy => "categorical_crossentropy",
        }
    }
}

/// Metric reported alongside the loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Fraction of samples whose argmax matches the target.
    Accuracy,
}

impl Metric {
    /// Returns the metric name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
        }
    }
}

/// Computes categorical cross-entropy from logits.
///
/// `loss = mean_n( -sum_k one_hot[n, k] * log_softmax(logits)[n, k] )`
///
/// Uses `log_softmax`, so large logits do not overflow.
///
/// # Arguments
///
/// - `logits`: Unnormalised class scores `[batch, num_classes]`
/// - `one_hot`: One-hot targets `[batch, num_classes]`
///
/// # Returns
///
/// Scalar loss value.
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    one_hot: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    (one_hot * log_probs).sum_dim(1).mean().neg()
}

/// Counts predictions whose argmax matches `targets`.
///
/// # Arguments
///
/// - `logits`: Class scores `[batch, num_classes]`
/// - `targets`: Class indices `[batch]`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let batch = logits.dims()[0];
    let predicted = logits.argmax(1).reshape([batch]);
    let correct: i64 = predicted.equal(targets).int().sum().into_scalar().elem();
    correct.max(0) as usize
}

/// Fraction of samples classified correctly, in `[0, 1]`.
///
/// Returns 0 for an empty batch.
#[allow(clippy::cast_precision_loss)]
pub fn accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f32 {
    let batch = logits.dims()[0];
    if batch == 0 {
        return 0.0;
    }
    correct_predictions(logits, targets) as f32 / batch as f32
}
