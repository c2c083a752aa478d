//! Residual classifier assembled from [`ConvBlock`]s and [`IdentityBlock`]s.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use crate::classifier::{ImageClassifier, NUM_EXPRESSIONS};
use crate::error::{ModelError, Result};
use crate::residual::{ConvBlock, ConvBlockConfig, Filters, IdentityBlock, IdentityBlockConfig};

/// One stage of the network: a projection block followed by identity blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Filter counts shared by every block of the stage.
    pub filters: Filters,

    /// Stride of the leading projection block.
    pub stride: usize,

    /// Number of identity blocks after the projection block.
    pub identity_blocks: usize,
}

impl StageConfig {
    /// Creates a stage description.
    #[must_use]
    pub const fn new(filters: Filters, stride: usize, identity_blocks: usize) -> Self {
        Self {
            filters,
            stride,
            identity_blocks,
        }
    }
}

/// Configuration for a [`ResidualClassifier`].
///
/// The default mirrors the first two stages of ResNet-50 and is sized for
/// 48x48 inputs.
///
/// # Example
///
/// ```
/// use fer_models::ResidualClassifierConfig;
///
/// let config = ResidualClassifierConfig::default();
/// assert_eq!(config.num_classes, 7);
/// assert_eq!(config.stages.len(), 2);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualClassifierConfig {
    /// Channels of the input images.
    pub in_channels: usize,

    /// Filters of the 3x3 stem convolution.
    pub stem_filters: usize,

    /// Residual stages, in order.
    pub stages: Vec<StageConfig>,

    /// Dropout probability before the classification head.
    pub dropout: f64,

    /// Number of output classes.
    pub num_classes: usize,
}

impl Default for ResidualClassifierConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            stem_filters: 64,
            stages: vec![
                StageConfig::new([64, 64, 256], 1, 2),
                StageConfig::new([128, 128, 512], 2, 3),
            ],
            dropout: 0.3,
            num_classes: NUM_EXPRESSIONS,
        }
    }
}

impl ResidualClassifierConfig {
    /// Sets the input channels.
    #[must_use]
    pub const fn with_in_channels(mut self, in_channels: usize) -> Self {
        self.in_channels = in_channels;
        self
    }

    /// Sets the stem width.
    #[must_use]
    pub const fn with_stem_filters(mut self, stem_filters: usize) -> Self {
        self.stem_filters = stem_filters;
        self
    }

    /// Replaces the stages.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<StageConfig>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the dropout probability.
    #[must_use]
    pub const fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Sets the number of classes.
    #[must_use]
    pub const fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Channel count entering the classification head.
    #[must_use]
    pub fn feature_channels(&self) -> usize {
        self.stages
            .last()
            .map_or(self.stem_filters, |stage| stage.filters[2])
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.stem_filters == 0 || self.num_classes == 0 {
            return Err(ModelError::invalid_config(
                "in_channels, stem_filters and num_classes must be positive",
            ));
        }
        if self.stages.is_empty() {
            return Err(ModelError::invalid_config("at least one stage is required"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::invalid_config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Builds the classifier.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] if the configuration or any stage
    /// is invalid.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ResidualClassifier<B>> {
        self.validate()?;

        let mut channels = self.stem_filters;
        let mut projections = Vec::with_capacity(self.stages.len());
        let mut identities = Vec::new();
        for stage in &self.stages {
            projections.push(
                ConvBlockConfig::new(channels, stage.filters)
                    .with_stride(stage.stride)
                    .init(device)?,
            );
            let stage_blocks = (0..stage.identity_blocks)
                .map(|_| IdentityBlockConfig::new(stage.filters).init(device))
                .collect::<Result<Vec<_>>>()?;
            identities.push(stage_blocks);
            channels = stage.filters[2];
        }

        Ok(ResidualClassifier {
            stem_conv: Conv2dConfig::new([self.in_channels, self.stem_filters], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            stem_bn: BatchNormConfig::new(self.stem_filters).init(device),
            stem_pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            projections,
            identities,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            head: LinearConfig::new(channels, self.num_classes).init(device),
        })
    }
}

/// ResNet-style expression classifier.
///
/// Architecture: 3x3 stem -> max pool -> stages of (`ConvBlock` + N x
/// `IdentityBlock`) -> global average pool -> dropout -> dense.
#[derive(Debug, Module)]
pub struct ResidualClassifier<B: Backend> {
    stem_conv: Conv2d<B>,
    stem_bn: BatchNorm<B, 2>,
    stem_pool: MaxPool2d,
    projections: Vec<ConvBlock<B>>,
    identities: Vec<Vec<IdentityBlock<B>>>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    head: Linear<B>,
}

impl<B: Backend> ResidualClassifier<B> {
    /// Runs the network and returns logits of shape `[batch, num_classes]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.stem_bn.forward(self.stem_conv.forward(images)));
        let mut x = self.stem_pool.forward(x);

        for (projection, blocks) in self.projections.iter().zip(&self.identities) {
            x = projection.forward(x);
            for block in blocks {
                x = block.forward(x);
            }
        }

        let x = self.pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);
        self.head.forward(self.dropout.forward(x))
    }

    /// Number of residual blocks (projection and identity) in the network.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.projections.len() + self.identities.iter().map(Vec::len).sum::<usize>()
    }
}

impl<B: Backend> ImageClassifier<B> for ResidualClassifier<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }

    fn num_classes(&self) -> usize {
        self.head.weight.val().dims()[1]
    }
}
