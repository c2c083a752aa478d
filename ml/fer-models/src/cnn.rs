//! Small sequential CNN baseline.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use crate::classifier::{IMAGE_SIZE, ImageClassifier, NUM_EXPRESSIONS};
use crate::error::{ModelError, Result};

/// Smallest input side that survives both conv/pool stages.
pub const MIN_INPUT_SIZE: usize = 16;

/// Input geometry `(height, width, channels)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    /// Image height in pixels.
    pub height: usize,
    /// Image width in pixels.
    pub width: usize,
    /// Number of colour channels.
    pub channels: usize,
}

impl InputShape {
    /// Creates an input shape.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }
}

impl Default for InputShape {
    fn default() -> Self {
        Self::new(IMAGE_SIZE, IMAGE_SIZE, 3)
    }
}

/// Configuration for a [`SimpleCnn`].
///
/// # Example
///
/// ```
/// use fer_models::{InputShape, SimpleCnnConfig};
///
/// let config = SimpleCnnConfig::new(InputShape::new(48, 48, 3));
/// assert_eq!(config.flattened_features(), 64 * 9 * 9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimpleCnnConfig {
    /// Input geometry.
    pub input_shape: InputShape,

    /// Dropout probability after each stage and the hidden dense layer.
    pub dropout: f64,

    /// Units of the hidden dense layer.
    pub hidden: usize,

    /// Number of output classes.
    pub num_classes: usize,
}

impl Default for SimpleCnnConfig {
    fn default() -> Self {
        Self::new(InputShape::default())
    }
}

impl SimpleCnnConfig {
    /// Creates a configuration for the given input shape.
    #[must_use]
    pub const fn new(input_shape: InputShape) -> Self {
        Self {
            input_shape,
            dropout: 0.3,
            hidden: 128,
            num_classes: NUM_EXPRESSIONS,
        }
    }

    /// Sets the dropout probability.
    #[must_use]
    pub const fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Sets the hidden dense width.
    #[must_use]
    pub const fn with_hidden(mut self, hidden: usize) -> Self {
        self.hidden = hidden;
        self
    }

    /// Sets the number of output classes.
    #[must_use]
    pub const fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Spatial side after the two conv/pool stages (two valid 3x3 convs then
    /// a 2x2 pool, twice).
    #[must_use]
    pub const fn feature_side(size: usize) -> usize {
        let first = size.saturating_sub(4) / 2;
        first.saturating_sub(4) / 2
    }

    /// Width of the flattened feature vector fed to the dense layers.
    #[must_use]
    pub const fn flattened_features(&self) -> usize {
        64 * Self::feature_side(self.input_shape.height)
            * Self::feature_side(self.input_shape.width)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InputTooSmall`] for inputs below
    /// [`MIN_INPUT_SIZE`], and [`ModelError::InvalidConfig`] for zero sizes or
    /// a dropout outside `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        let InputShape {
            height,
            width,
            channels,
        } = self.input_shape;
        if height < MIN_INPUT_SIZE || width < MIN_INPUT_SIZE {
            return Err(ModelError::input_too_small(height, width, MIN_INPUT_SIZE));
        }
        if channels == 0 || self.hidden == 0 || self.num_classes == 0 {
            return Err(ModelError::invalid_config(
                "channels, hidden and num_classes must be positive",
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::invalid_config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Builds the network.
    ///
    /// # Errors
    ///
    /// Returns an error if [`validate`](Self::validate) fails.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SimpleCnn<B>> {
        self.validate()?;

        let conv = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [3, 3])
                .with_padding(PaddingConfig2d::Valid)
                .init(device)
        };

        Ok(SimpleCnn {
            conv1: conv([self.input_shape.channels, 32]),
            conv2: conv([32, 32]),
            conv3: conv([32, 64]),
            conv4: conv([64, 64]),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            dense: LinearConfig::new(self.flattened_features(), self.hidden).init(device),
            output: LinearConfig::new(self.hidden, self.num_classes).init(device),
        })
    }
}

/// Two conv/pool stages followed by a dense head.
///
/// ```text
/// conv3x3(32) ReLU -> conv3x3(32) ReLU -> maxpool -> dropout
/// conv3x3(64) ReLU -> conv3x3(64) ReLU -> maxpool -> dropout
/// flatten -> dense(128) ReLU -> dropout -> dense(7)
/// ```
#[derive(Debug, Module)]
pub struct SimpleCnn<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    pool: MaxPool2d,
    dropout: Dropout,
    dense: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> SimpleCnn<B> {
    /// Runs the network and returns logits of shape `[batch, num_classes]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.conv1.forward(images));
        let x = relu(self.conv2.forward(x));
        let x = self.dropout.forward(self.pool.forward(x));

        let x = relu(self.conv3.forward(x));
        let x = relu(self.conv4.forward(x));
        let x = self.dropout.forward(self.pool.forward(x));

        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.dropout.forward(relu(self.dense.forward(x)));
        self.output.forward(x)
    }
}

impl<B: Backend> ImageClassifier<B> for SimpleCnn<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }

    fn num_classes(&self) -> usize {
        self.output.weight.val().dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn config_default() {
        let config = SimpleCnnConfig::default();
        assert_eq!(config.input_shape, InputShape::new(48, 48, 3));
        assert!((config.dropout - 0.3).abs() < 1e-9);
        assert_eq!(config.hidden, 128);
        assert_eq!(config.num_classes, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn feature_side_matches_layer_stack() {
        // 48 -> 46 -> 44 -> 22 -> 20 -> 18 -> 9
        assert_eq!(SimpleCnnConfig::feature_side(48), 9);
        // 16 -> 14 -> 12 -> 6 -> 4 -> 2 -> 1
        assert_eq!(SimpleCnnConfig::feature_side(16), 1);
        assert_eq!(SimpleCnnConfig::feature_side(15), 0);
    }

    #[test]
    fn config_rejects_small_input() {
        let config = SimpleCnnConfig::new(InputShape::new(15, 48, 1));
        assert!(matches!(
            config.validate(),
            Err(ModelError::InputTooSmall { height: 15, .. })
        ));
    }

    #[test]
    fn config_rejects_bad_dropout() {
        let config = SimpleCnnConfig::default().with_dropout(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn cnn_forward_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let model = SimpleCnnConfig::default().init::<TestBackend>(&device).unwrap();
        let images =
            Tensor::<TestBackend, 4>::random([2, 3, 48, 48], Distribution::Default, &device);

        assert_eq!(model.forward(images).dims(), [2, NUM_EXPRESSIONS]);
        assert_eq!(model.num_classes(), NUM_EXPRESSIONS);
    }

    #[test]
    fn cnn_non_square_input() {
        let device = <TestBackend as Backend>::Device::default();
        let model = SimpleCnnConfig::new(InputShape::new(20, 32, 1))
            .init::<TestBackend>(&device)
            .unwrap();
        let images =
            Tensor::<TestBackend, 4>::random([1, 1, 20, 32], Distribution::Default, &device);

        assert_eq!(model.forward(images).dims(), [1, NUM_EXPRESSIONS]);
    }

    #[test]
    fn cnn_probabilities_form_distribution() {
        let device = <TestBackend as Backend>::Device::default();
        let model = SimpleCnnConfig::default().init::<TestBackend>(&device).unwrap();
        let images =
            Tensor::<TestBackend, 4>::random([4, 3, 48, 48], Distribution::Default, &device);

        let probs = model.probabilities(images);
        assert_eq!(probs.dims(), [4, 7]);

        let values = probs.clone().into_data().to_vec::<f32>().unwrap_or_default();
        assert!(values.iter().all(|p| (0.0..=1.0).contains(p)));

        let sums = probs.sum_dim(1).into_data().to_vec::<f32>().unwrap_or_default();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn cnn_predict_returns_class_indices() {
        let device = <TestBackend as Backend>::Device::default();
        let model = SimpleCnnConfig::new(InputShape::new(16, 16, 1))
            .init::<TestBackend>(&device)
            .unwrap();
        let images =
            Tensor::<TestBackend, 4>::random([5, 1, 16, 16], Distribution::Default, &device);

        let classes = model
            .predict(images)
            .into_data()
            .to_vec::<i64>()
            .unwrap_or_default();
        assert_eq!(classes.len(), 5);
        assert!(classes.iter().all(|&c| (0..7).contains(&c)));
    }
}
