//! Batching samples into Burn tensors.

use std::marker::PhantomData;

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};
use crate::sample::{ImageDataset, ImageSample};

/// Order in which [`BatchIter`] visits samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BatchOrder {
    /// Dataset order.
    #[default]
    Sequential,

    /// Shuffled with a fixed seed.
    Seeded(u64),

    /// Shuffled from entropy.
    Random,
}

/// Iterator over batches of sample references.
///
/// The last batch may be smaller than `batch_size`.
///
/// # Example
///
/// ```
/// use fer_dataset::{BatchOrder, ImageDataset, ImageSample};
///
/// let samples = (0..10).map(|i| ImageSample::new(i, vec![0.0], 0)).collect();
/// let dataset = ImageDataset::new(samples, vec!["happy".into()], [1, 1], 1);
///
/// let sizes: Vec<usize> = dataset.batches(4, BatchOrder::Sequential).map(|b| b.len()).collect();
/// assert_eq!(sizes, vec![4, 4, 2]);
/// ```
#[derive(Debug)]
pub struct BatchIter<'a> {
    samples: &'a [ImageSample],
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> BatchIter<'a> {
    fn new(samples: &'a [ImageSample], batch_size: usize, order: BatchOrder) -> Self {
        let mut indices: Vec<usize> = (0..samples.len()).collect();
        match order {
            BatchOrder::Sequential => {}
            BatchOrder::Seeded(seed) => indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed)),
            BatchOrder::Random => indices.shuffle(&mut ChaCha8Rng::from_entropy()),
        }
        Self {
            samples,
            order: indices,
            batch_size,
            cursor: 0,
        }
    }
}

impl<'a> Iterator for BatchIter<'a> {
    type Item = Vec<&'a ImageSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch_size == 0 || self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.samples[i])
            .collect();
        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.batch_size == 0 {
            0
        } else {
            (self.order.len() - self.cursor).div_ceil(self.batch_size)
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchIter<'_> {}

impl ImageDataset {
    /// Iterates over the dataset in batches of `batch_size`.
    ///
    /// A zero batch size yields no batches.
    #[must_use]
    pub fn batches(&self, batch_size: usize, order: BatchOrder) -> BatchIter<'_> {
        BatchIter::new(&self.samples, batch_size, order)
    }
}

/// A batch of images with integer and one-hot targets.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Images `[batch, channels, height, width]`.
    pub images: Tensor<B, 4>,

    /// Class indices `[batch]`.
    pub targets: Tensor<B, 1, Int>,

    /// One-hot targets `[batch, num_classes]`.
    pub one_hot: Tensor<B, 2>,
}

impl<B: Backend> ImageBatch<B> {
    /// Number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    /// Returns `true` if the batch holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stacks samples into an [`ImageBatch`] on a device.
#[derive(Debug, Clone)]
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
    num_classes: usize,
    channels: usize,
    height: usize,
    width: usize,
    _backend: PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    /// Creates a batcher matching the geometry and classes of `dataset`.
    #[must_use]
    pub fn new(dataset: &ImageDataset, device: B::Device) -> Self {
        let [height, width] = dataset.image_size;
        Self {
            device,
            num_classes: dataset.num_classes(),
            channels: dataset.channels,
            height,
            width,
            _backend: PhantomData,
        }
    }

    /// Number of classes in the one-hot encoding.
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Builds a batch from sample references.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::EmptyDataset`] for an empty slice and
    /// [`DatasetError::Validation`] if a sample has the wrong number of
    /// pixels or an out-of-range label.
    pub fn batch(&self, samples: &[&ImageSample]) -> Result<ImageBatch<B>> {
        if samples.is_empty() {
            return Err(DatasetError::empty_dataset("cannot batch zero samples"));
        }

        let per_image = self.channels * self.height * self.width;
        let n = samples.len();
        let mut pixels = Vec::with_capacity(n * per_image);
        let mut targets = Vec::with_capacity(n);
        let mut one_hot = vec![0.0f32; n * self.num_classes];

        for (row, sample) in samples.iter().enumerate() {
            if sample.pixels.len() != per_image {
                return Err(DatasetError::validation(format!(
                    "sample {} has {} values, expected {per_image}",
                    sample.id,
                    sample.pixels.len()
                )));
            }
            if sample.label >= self.num_classes {
                return Err(DatasetError::validation(format!(
                    "sample {} has label {} but there are {} classes",
                    sample.id, sample.label, self.num_classes
                )));
            }
            pixels.extend_from_slice(&sample.pixels);
            targets.push(i64::try_from(sample.label).unwrap_or_default());
            one_hot[row * self.num_classes + sample.label] = 1.0;
        }

        let images = Tensor::from_data(
            TensorData::new(pixels, [n, self.channels, self.height, self.width]),
            &self.device,
        );
        let targets = Tensor::from_data(TensorData::new(targets, [n]), &self.device);
        let one_hot = Tensor::from_data(
            TensorData::new(one_hot, [n, self.num_classes]),
            &self.device,
        );

        Ok(ImageBatch {
            images,
            targets,
            one_hot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn dataset(n: u64) -> ImageDataset {
        let samples = (0..n)
            .map(|i| {
                let label = usize::try_from(i % 3).unwrap_or(0);
                ImageSample::new(i, vec![i as f32; 2 * 2 * 2], label)
            })
            .collect();
        ImageDataset::new(
            samples,
            vec!["angry".into(), "happy".into(), "sad".into()],
            [2, 2],
            2,
        )
    }

    #[test]
    fn batches_sequential() {
        let ds = dataset(7);
        let batches: Vec<Vec<u64>> = ds
            .batches(3, BatchOrder::Sequential)
            .map(|b| b.iter().map(|s| s.id).collect())
            .collect();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[test]
    fn batches_seeded_is_a_permutation() {
        let ds = dataset(20);
        let first: Vec<u64> = ds
            .batches(6, BatchOrder::Seeded(9))
            .flatten()
            .map(|s| s.id)
            .collect();
        let second: Vec<u64> = ds
            .batches(6, BatchOrder::Seeded(9))
            .flatten()
            .map(|s| s.id)
            .collect();
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn batches_len_matches_cardinality() {
        let ds = dataset(10);
        assert_eq!(ds.batches(4, BatchOrder::Random).len(), ds.cardinality(4));
        assert_eq!(ds.batches(0, BatchOrder::Sequential).count(), 0);
    }

    #[test]
    fn batcher_builds_tensors() {
        let device = Default::default();
        let ds = dataset(4);
        let batcher = ImageBatcher::<TestBackend>::new(&ds, device);

        let refs: Vec<&ImageSample> = ds.samples.iter().collect();
        let batch = batcher.batch(&refs).unwrap();

        assert_eq!(batch.len(), 4);
        assert_eq!(batch.images.dims(), [4, 2, 2, 2]);
        assert_eq!(batch.one_hot.dims(), [4, 3]);

        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0, 1, 2, 0]);

        let one_hot: Vec<f32> = batch.one_hot.into_data().to_vec().unwrap();
        assert_eq!(
            one_hot,
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]
        );

        let pixels: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        assert!(pixels[8..16].iter().all(|&p| (p - 1.0).abs() < 1e-6));
    }

    #[test]
    fn batcher_rejects_bad_samples() {
        let device = Default::default();
        let ds = dataset(2);
        let batcher = ImageBatcher::<TestBackend>::new(&ds, device);

        assert!(batcher.batch(&[]).is_err());

        let short = ImageSample::new(9, vec![0.0; 3], 0);
        assert!(matches!(
            batcher.batch(&[&short]),
            Err(DatasetError::Validation(_))
        ));

        let unknown = ImageSample::new(9, vec![0.0; 8], 3);
        assert!(matches!(
            batcher.batch(&[&unknown]),
            Err(DatasetError::Validation(_))
        ));
    }
}
