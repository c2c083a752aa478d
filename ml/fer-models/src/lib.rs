//! Burn network architectures for facial expression recognition.
//!
//! This crate provides the networks used to classify 48x48 face crops into
//! seven expression classes, along with checkpoint save/load.
//!
//! # Residual Blocks
//!
//! - [`IdentityBlock`] - Bottleneck block with an identity shortcut
//! - [`ConvBlock`] - Bottleneck block with a strided 1x1 projection shortcut
//!
//! # Model Architectures
//!
//! - [`ResidualClassifier`] - Stem, residual stages, global pooling, dense head
//! - [`SimpleCnn`] - Two conv/pool stages and a dense head
//!
//! Both implement [`ImageClassifier`], which exposes logits, softmax
//! probabilities and argmax predictions.
//!
//! # Checkpoint Persistence
//!
//! Weights are persisted with Burn's recorders:
//! - Binary format (compact, fast)
//! - JSON format (human-readable, debuggable)
//!
//! # Backend Support
//!
//! Models are generic over Burn backends. Tests run on `burn-ndarray`.
//!
//! # Example
//!
//! ```ignore
//! use fer_models::{ImageClassifier, SimpleCnnConfig};
//!
//! let device = Default::default();
//! let model = SimpleCnnConfig::default().init::<MyBackend>(&device)?;
//!
//! let images = Tensor::zeros([1, 3, 48, 48], &device);
//! let probabilities = model.probabilities(images); // [1, 7]
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod checkpoint;
mod classifier;
mod cnn;
mod error;
mod residual;
mod resnet;

// Re-export residual blocks
pub use residual::{
    Bottleneck, ConvBlock, ConvBlockConfig, Filters, IdentityBlock, IdentityBlockConfig,
};

// Re-export model types
pub use classifier::{IMAGE_SIZE, ImageClassifier, NUM_EXPRESSIONS};
pub use cnn::{InputShape, MIN_INPUT_SIZE, SimpleCnn, SimpleCnnConfig};
pub use resnet::{ResidualClassifier, ResidualClassifierConfig, StageConfig};

// Re-export checkpoint utilities
pub use checkpoint::{CheckpointFormat, load_checkpoint, save_checkpoint};

// Re-export error types
pub use error::{ModelError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        CheckpointFormat, ConvBlock, ConvBlockConfig, IdentityBlock, IdentityBlockConfig,
        ImageClassifier, InputShape, ModelError, ResidualClassifier, ResidualClassifierConfig,
        SimpleCnn, SimpleCnnConfig, StageConfig, load_checkpoint, save_checkpoint,
    };
}
