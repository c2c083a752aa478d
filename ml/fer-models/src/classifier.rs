//! Common interface for image classifiers.

use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::activation::softmax;

/// Number of facial expression classes (angry, disgust, fear, happy,
/// neutral, sad, surprise).
pub const NUM_EXPRESSIONS: usize = 7;

/// Side length of the expression images, in pixels.
pub const IMAGE_SIZE: usize = 48;

/// A model mapping a batch of images to class scores.
///
/// Implemented by every architecture in this crate so that training code can
/// stay generic over the network.
pub trait ImageClassifier<B: Backend> {
    /// Runs the network on `images` of shape `[batch, channels, height, width]`.
    ///
    /// Returns unnormalised logits of shape `[batch, num_classes]`.
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Runs the network and applies a softmax over the class axis.
    ///
    /// Every row of the result is a probability distribution summing to 1.
    fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.logits(images), 1)
    }

    /// Returns the most likely class index for each image.
    fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 1, burn::tensor::Int> {
        let logits = self.logits(images);
        let batch = logits.dims()[0];
        logits.argmax(1).reshape([batch])
    }
}
