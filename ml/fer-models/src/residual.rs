//! Bottleneck residual blocks.
//!
//! Both blocks share the same main path:
//!
//! ```text
//! 1x1 conv -> BN -> ReLU -> 3x3 conv -> BN -> ReLU -> 1x1 conv -> BN
//! ```
//!
//! and differ only in the shortcut. [`IdentityBlock`] adds its input back
//! unchanged, so input and output channel counts must already match.
//! [`ConvBlock`] projects the shortcut through a strided 1x1 convolution and
//! batch norm so it lines up with the (possibly downsampled, widened) main path.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Filter counts `[f1, f2, f3]` of the three main-path convolutions.
pub type Filters = [usize; 3];

fn filters_valid(filters: &Filters) -> bool {
    filters.iter().all(|&f| f > 0)
}

/// Main path shared by both residual blocks.
#[derive(Debug, Module)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
}

impl<B: Backend> Bottleneck<B> {
    fn new(in_channels: usize, filters: Filters, stride: usize, device: &B::Device) -> Self {
        let [f1, f2, f3] = filters;
        Self {
            conv1: Conv2dConfig::new([in_channels, f1], [1, 1])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Valid)
                .init(device),
            bn1: BatchNormConfig::new(f1).init(device),
            conv2: Conv2dConfig::new([f1, f2], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            bn2: BatchNormConfig::new(f2).init(device),
            conv3: Conv2dConfig::new([f2, f3], [1, 1])
                .with_padding(PaddingConfig2d::Valid)
                .init(device),
            bn3: BatchNormConfig::new(f3).init(device),
        }
    }

    /// Runs the main path. The result is not yet activated.
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.bn1.forward(self.conv1.forward(input)));
        let x = relu(self.bn2.forward(self.conv2.forward(x)));
        self.bn3.forward(self.conv3.forward(x))
    }

    fn in_channels(&self) -> usize {
        self.conv1.weight.val().dims()[1]
    }

    fn out_channels(&self) -> usize {
        self.conv3.weight.val().dims()[0]
    }
}

/// Configuration for an [`IdentityBlock`].
///
/// # Example
///
/// ```
/// use fer_models::IdentityBlockConfig;
///
/// let config = IdentityBlockConfig::new([64, 64, 256]);
/// assert_eq!(config.channels(), 256);
/// assert!(config.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityBlockConfig {
    /// Filter counts of the three main-path convolutions.
    pub filters: Filters,
}

impl IdentityBlockConfig {
    /// Creates a new configuration.
    #[must_use]
    pub const fn new(filters: Filters) -> Self {
        Self { filters }
    }

    /// Channel count of both the block input and output.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.filters[2]
    }

    /// Returns `true` if every filter count is positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        filters_valid(&self.filters)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] if a filter count is zero.
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ModelError::invalid_config(format!(
                "identity block filters must be positive, got {:?}",
                self.filters
            )))
        }
    }

    /// Builds the block.
    ///
    /// # Errors
    ///
    /// See [`IdentityBlockConfig::validate`].
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<IdentityBlock<B>> {
        self.validate()?;
        Ok(IdentityBlock {
            main: Bottleneck::new(self.channels(), self.filters, 1, device),
        })
    }
}

/// Residual block whose shortcut is the unchanged input.
///
/// Input shape `[N, f3, H, W]`, output shape `[N, f3, H, W]`.
#[derive(Debug, Module)]
pub struct IdentityBlock<B: Backend> {
    main: Bottleneck<B>,
}

impl<B: Backend> IdentityBlock<B> {
    /// Runs the block.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = input.clone();
        relu(self.main.forward(input) + shortcut)
    }

    /// Runs the block after checking that the input has the expected channels.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] if the channel axis differs from
    /// the block width.
    pub fn try_forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let actual = input.dims()[1];
        let expected = self.channels();
        if actual != expected {
            return Err(ModelError::shape_mismatch(
                format!("{expected} channels"),
                format!("{actual} channels"),
            ));
        }
        Ok(self.forward(input))
    }

    /// Channel count of both the block input and output.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.main.out_channels()
    }
}

/// Configuration for a [`ConvBlock`].
///
/// # Example
///
/// ```
/// use fer_models::ConvBlockConfig;
///
/// let config = ConvBlockConfig::new(64, [64, 64, 256]);
/// assert_eq!(config.stride, 2);
/// assert_eq!(config.output_size(48), 24);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvBlockConfig {
    /// Channels of the block input.
    pub in_channels: usize,

    /// Filter counts of the three main-path convolutions.
    pub filters: Filters,

    /// Stride of the first main-path convolution and of the shortcut projection.
    pub stride: usize,
}

impl ConvBlockConfig {
    /// Creates a new configuration with stride 2.
    #[must_use]
    pub const fn new(in_channels: usize, filters: Filters) -> Self {
        Self {
            in_channels,
            filters,
            stride: 2,
        }
    }

    /// Sets the stride.
    #[must_use]
    pub const fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Channel count of the block output.
    #[must_use]
    pub const fn out_channels(&self) -> usize {
        self.filters[2]
    }

    /// Spatial size of the output for an input side of `size` pixels.
    #[must_use]
    pub const fn output_size(&self, size: usize) -> usize {
        size.div_ceil(self.stride)
    }

    /// Returns `true` if the channel counts and the stride are positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.in_channels > 0 && self.stride > 0 && filters_valid(&self.filters)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] if a channel count or the stride
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ModelError::invalid_config(format!(
                "conv block needs positive sizes, got in_channels={} filters={:?} stride={}",
                self.in_channels, self.filters, self.stride
            )))
        }
    }

    /// Builds the block.
    ///
    /// # Errors
    ///
    /// See [`ConvBlockConfig::validate`].
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ConvBlock<B>> {
        self.validate()?;
        let stride = [self.stride, self.stride];
        Ok(ConvBlock {
            main: Bottleneck::new(self.in_channels, self.filters, self.stride, device),
            shortcut_conv: Conv2dConfig::new([self.in_channels, self.out_channels()], [1, 1])
                .with_stride(stride)
                .with_padding(PaddingConfig2d::Valid)
                .init(device),
            shortcut_bn: BatchNormConfig::new(self.out_channels()).init(device),
        })
    }
}

/// Residual block with a learned 1x1 projection on the shortcut.
///
/// Input shape `[N, in_channels, H, W]`, output shape
/// `[N, f3, ceil(H / stride), ceil(W / stride)]`.
#[derive(Debug, Module)]
pub struct ConvBlock<B: Backend> {
    main: Bottleneck<B>,
    shortcut_conv: Conv2d<B>,
    shortcut_bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBlock<B> {
    /// Runs the block.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = self
            .shortcut_bn
            .forward(self.shortcut_conv.forward(input.clone()));
        relu(self.main.forward(input) + shortcut)
    }

    /// Channels of the block input.
    #[must_use]
    pub fn in_channels(&self) -> usize {
        self.main.in_channels()
    }

    /// Channels of the block output.
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.main.out_channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn device() -> <TestBackend as Backend>::Device {
        <TestBackend as Backend>::Device::default()
    }

    #[test]
    fn identity_config_channels() {
        let config = IdentityBlockConfig::new([8, 8, 32]);
        assert_eq!(config.channels(), 32);
        assert!(config.is_valid());
        assert!(!IdentityBlockConfig::new([8, 0, 32]).is_valid());
    }

    #[test]
    fn identity_block_preserves_shape() {
        let block = IdentityBlockConfig::new([4, 4, 16])
            .init::<TestBackend>(&device())
            .unwrap();
        let input =
            Tensor::<TestBackend, 4>::random([2, 16, 12, 12], Distribution::Default, &device());

        let output = block.forward(input);
        assert_eq!(output.dims(), [2, 16, 12, 12]);
        assert_eq!(block.channels(), 16);
    }

    #[test]
    fn identity_block_output_is_non_negative() {
        let block = IdentityBlockConfig::new([4, 4, 8])
            .init::<TestBackend>(&device())
            .unwrap();
        let input = Tensor::<TestBackend, 4>::random(
            [2, 8, 6, 6],
            Distribution::Normal(0.0, 1.0),
            &device(),
        );

        let min = block.forward(input).min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn identity_block_rejects_wrong_channels() {
        let block = IdentityBlockConfig::new([4, 4, 16])
            .init::<TestBackend>(&device())
            .unwrap();
        let input = Tensor::<TestBackend, 4>::zeros([1, 8, 6, 6], &device());

        let err = block.try_forward(input).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn identity_block_invalid_config() {
        let result = IdentityBlockConfig::new([0, 4, 16]).init::<TestBackend>(&device());
        assert!(matches!(result, Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn conv_block_config_defaults() {
        let config = ConvBlockConfig::new(16, [8, 8, 32]);
        assert_eq!(config.stride, 2);
        assert_eq!(config.out_channels(), 32);
        assert_eq!(config.output_size(48), 24);
        assert_eq!(config.output_size(7), 4);
        assert_eq!(config.with_stride(1).output_size(7), 7);
    }

    #[test]
    fn conv_block_downsamples_and_widens() {
        let block = ConvBlockConfig::new(3, [4, 4, 16])
            .init::<TestBackend>(&device())
            .unwrap();
        let input =
            Tensor::<TestBackend, 4>::random([2, 3, 12, 12], Distribution::Default, &device());

        let output = block.forward(input);
        assert_eq!(output.dims(), [2, 16, 6, 6]);
        assert_eq!(block.in_channels(), 3);
        assert_eq!(block.out_channels(), 16);
    }

    #[test]
    fn conv_block_odd_input_rounds_up() {
        let block = ConvBlockConfig::new(4, [4, 4, 8])
            .init::<TestBackend>(&device())
            .unwrap();
        let input =
            Tensor::<TestBackend, 4>::random([1, 4, 7, 9], Distribution::Default, &device());

        assert_eq!(block.forward(input).dims(), [1, 8, 4, 5]);
    }

    #[test]
    fn conv_block_stride_one_keeps_spatial_size() {
        let block = ConvBlockConfig::new(4, [4, 4, 8])
            .with_stride(1)
            .init::<TestBackend>(&device())
            .unwrap();
        let input =
            Tensor::<TestBackend, 4>::random([1, 4, 10, 10], Distribution::Default, &device());

        assert_eq!(block.forward(input).dims(), [1, 8, 10, 10]);
    }

    #[test]
    fn conv_block_feeds_identity_block() {
        let conv = ConvBlockConfig::new(3, [4, 4, 16])
            .init::<TestBackend>(&device())
            .unwrap();
        let identity = IdentityBlockConfig::new([4, 4, 16])
            .init::<TestBackend>(&device())
            .unwrap();
        let input =
            Tensor::<TestBackend, 4>::random([1, 3, 8, 8], Distribution::Default, &device());

        let output = identity.try_forward(conv.forward(input));
        assert!(output.is_ok());
        assert_eq!(output.unwrap().dims(), [1, 16, 4, 4]);
    }

    #[test]
    fn conv_block_invalid_stride() {
        let result = ConvBlockConfig::new(3, [4, 4, 16])
            .with_stride(0)
            .init::<TestBackend>(&device());
        assert!(result.is_err());
        assert!(ConvBlockConfig::new(3, [4, 4, 16]).with_stride(0).validate().is_err());
        assert!(ConvBlockConfig::new(3, [4, 4, 16]).validate().is_ok());
    }

    #[test]
    fn config_serialization() {
        let config = ConvBlockConfig::new(64, [64, 64, 256]).with_stride(1);
        let json = serde_json::to_string(&config).unwrap_or_default();
        let parsed: std::result::Result<ConvBlockConfig, _> = serde_json::from_str(&json);
        assert_eq!(parsed.ok(), Some(config));
    }
}
