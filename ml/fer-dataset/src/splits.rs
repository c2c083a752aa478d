//! Dataset splitting utilities.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::sample::{ImageDataset, ImageSample};

/// Ratio for splitting datasets into train/validation sets.
///
/// The ratio specifies the proportion of data to use for training.
/// The remainder goes to validation.
///
/// # Example
///
/// ```
/// use fer_dataset::SplitRatio;
///
/// // 80% train, 20% validation
/// let ratio = SplitRatio::new(0.8);
/// assert!((ratio.train_ratio() - 0.8).abs() < 1e-6);
/// assert!((ratio.val_ratio() - 0.2).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatio {
    train: f32,
}

impl SplitRatio {
    /// Creates a new split ratio.
    ///
    /// # Panics
    ///
    /// Panics if `train` is not in `(0, 1)`.
    #[must_use]
    pub fn new(train: f32) -> Self {
        assert!(
            train > 0.0 && train < 1.0,
            "Split ratio must be in (0, 1), got {train}"
        );
        Self { train }
    }

    /// Creates a split ratio, returning `None` if invalid.
    #[must_use]
    pub fn try_new(train: f32) -> Option<Self> {
        (train > 0.0 && train < 1.0).then_some(Self { train })
    }

    /// Creates a split ratio from the fraction held out for validation.
    #[must_use]
    pub fn from_val_split(val_split: f32) -> Option<Self> {
        Self::try_new(1.0 - val_split)
    }

    /// Returns the training ratio.
    #[must_use]
    pub const fn train_ratio(&self) -> f32 {
        self.train
    }

    /// Returns the validation ratio.
    #[must_use]
    pub fn val_ratio(&self) -> f32 {
        1.0 - self.train
    }

    /// Computes the split point for a given dataset size.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn split_point(&self, total: usize) -> usize {
        (total as f32 * self.train).round() as usize
    }

    /// Common 80/20 split.
    pub const EIGHTY_TWENTY: Self = Self { train: 0.8 };

    /// Common 90/10 split.
    pub const NINETY_TEN: Self = Self { train: 0.9 };
}

impl Default for SplitRatio {
    fn default() -> Self {
        Self::EIGHTY_TWENTY
    }
}

fn rng_for(seed: Option<u64>) -> ChaCha8Rng {
    seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64)
}

fn shuffled_split(
    samples: &[ImageSample],
    ratio: SplitRatio,
    seed: Option<u64>,
) -> (Vec<ImageSample>, Vec<ImageSample>) {
    if samples.is_empty() {
        return (Vec::new(), Vec::new());
    }
    if samples.len() == 1 {
        return (samples.to_vec(), Vec::new());
    }

    let mut indices: Vec<usize> = (0..samples.len()).collect();
    indices.shuffle(&mut rng_for(seed));

    // Keep at least one sample on each side.
    let split = ratio
        .split_point(samples.len())
        .clamp(1, samples.len() - 1);

    let train = indices[..split].iter().map(|&i| samples[i].clone()).collect();
    let val = indices[split..].iter().map(|&i| samples[i].clone()).collect();
    (train, val)
}

/// Randomly splits a dataset into training and validation sets.
///
/// # Example
///
/// ```
/// use fer_dataset::{ImageDataset, ImageSample, SplitRatio, split_dataset};
///
/// let samples = (0..10).map(|i| ImageSample::new(i, vec![0.0], 0)).collect();
/// let dataset = ImageDataset::new(samples, vec!["happy".into()], [1, 1], 1);
///
/// let (train, val) = split_dataset(&dataset, SplitRatio::EIGHTY_TWENTY, Some(42));
/// assert_eq!(train.len(), 8);
/// assert_eq!(val.len(), 2);
/// ```
#[must_use]
pub fn split_dataset(
    dataset: &ImageDataset,
    ratio: SplitRatio,
    seed: Option<u64>,
) -> (ImageDataset, ImageDataset) {
    let (train, val) = shuffled_split(&dataset.samples, ratio, seed);
    (dataset.with_samples(train), dataset.with_samples(val))
}

/// Splits a dataset so every class keeps the same train/validation ratio.
///
/// # Example
///
/// ```
/// use fer_dataset::{ImageDataset, ImageSample, SplitRatio, split_stratified};
///
/// let samples = (0..20)
///     .map(|i| ImageSample::new(i, vec![0.0], (i % 2) as usize))
///     .collect();
/// let dataset = ImageDataset::new(samples, vec!["a".into(), "b".into()], [1, 1], 1);
///
/// let (train, val) = split_stratified(&dataset, SplitRatio::EIGHTY_TWENTY, Some(42));
/// assert_eq!(train.len(), 16);
/// assert_eq!(val.len(), 4);
/// ```
#[must_use]
pub fn split_stratified(
    dataset: &ImageDataset,
    ratio: SplitRatio,
    seed: Option<u64>,
) -> (ImageDataset, ImageDataset) {
    let mut train = Vec::new();
    let mut val = Vec::new();

    for label in 0..dataset.num_classes() {
        let class_samples: Vec<ImageSample> = dataset
            .samples
            .iter()
            .filter(|s| s.label == label)
            .cloned()
            .collect();
        let class_seed = seed.map(|s| s.wrapping_add(label as u64));
        let (class_train, class_val) = shuffled_split(&class_samples, ratio, class_seed);
        train.extend(class_train);
        val.extend(class_val);
    }

    let mut rng = rng_for(seed.map(|s| s.wrapping_sub(1)));
    train.shuffle(&mut rng);
    val.shuffle(&mut rng);

    (dataset.with_samples(train), dataset.with_samples(val))
}

/// Splits an (already shuffled) dataset at batch granularity.
///
/// With `n` batches of `batch_size`, the first
/// `floor((1 - val_split) * n)` batches form the training set and the
/// remaining samples the validation set. Sample order is preserved.
///
/// # Example
///
/// ```
/// use fer_dataset::{ImageDataset, ImageSample, split_batches};
///
/// let samples = (0..100).map(|i| ImageSample::new(i, vec![0.0], 0)).collect();
/// let dataset = ImageDataset::new(samples, vec!["happy".into()], [1, 1], 1);
///
/// // 100 samples -> 4 batches of 32 -> 3 train batches
/// let (train, val) = split_batches(&dataset, 32, 0.2);
/// assert_eq!(train.len(), 96);
/// assert_eq!(val.len(), 4);
/// ```
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn split_batches(
    dataset: &ImageDataset,
    batch_size: usize,
    val_split: f64,
) -> (ImageDataset, ImageDataset) {
    let total_batches = dataset.cardinality(batch_size);
    let train_batches = ((1.0 - val_split) * total_batches as f64).floor() as usize;
    let train_len = (train_batches * batch_size).min(dataset.len());

    let (train, val) = dataset.samples.split_at(train_len);
    (dataset.with_samples(train.to_vec()), dataset.with_samples(val.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: u64, classes: usize) -> ImageDataset {
        let names = (0..classes).map(|c| format!("class_{c}")).collect();
        let samples = (0..n)
            .map(|i| ImageSample::new(i, vec![0.0], usize::try_from(i).unwrap_or(0) % classes))
            .collect();
        ImageDataset::new(samples, names, [1, 1], 1)
    }

    fn ids(ds: &ImageDataset) -> Vec<u64> {
        ds.samples.iter().map(|s| s.id).collect()
    }

    #[test]
    fn split_ratio_try_new() {
        assert!(SplitRatio::try_new(0.5).is_some());
        assert!(SplitRatio::try_new(0.0).is_none());
        assert!(SplitRatio::try_new(1.0).is_none());
        assert!(SplitRatio::try_new(-0.5).is_none());
    }

    #[test]
    fn split_ratio_from_val_split() {
        let ratio = SplitRatio::from_val_split(0.2).unwrap();
        assert!((ratio.train_ratio() - 0.8).abs() < 1e-6);
        assert!(SplitRatio::from_val_split(0.0).is_none());
    }

    #[test]
    fn split_ratio_split_point() {
        let ratio = SplitRatio::new(0.8);
        assert_eq!(ratio.split_point(100), 80);
        assert_eq!(ratio.split_point(10), 8);
    }

    #[test]
    fn split_dataset_is_a_partition() {
        let ds = dataset(10, 1);
        let (train, val) = split_dataset(&ds, SplitRatio::EIGHTY_TWENTY, Some(42));

        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);

        let mut all = ids(&train);
        all.extend(ids(&val));
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn split_dataset_edge_sizes() {
        let (train, val) = split_dataset(&dataset(0, 1), SplitRatio::default(), None);
        assert!(train.is_empty() && val.is_empty());

        let (train, val) = split_dataset(&dataset(1, 1), SplitRatio::default(), None);
        assert_eq!((train.len(), val.len()), (1, 0));

        let (train, val) = split_dataset(&dataset(2, 1), SplitRatio::NINETY_TEN, None);
        assert_eq!((train.len(), val.len()), (1, 1));
    }

    #[test]
    fn split_dataset_reproducible() {
        let ds = dataset(100, 1);
        let (train1, val1) = split_dataset(&ds, SplitRatio::EIGHTY_TWENTY, Some(42));
        let (train2, val2) = split_dataset(&ds, SplitRatio::EIGHTY_TWENTY, Some(42));
        assert_eq!(ids(&train1), ids(&train2));
        assert_eq!(ids(&val1), ids(&val2));
    }

    #[test]
    fn split_stratified_keeps_class_ratio() {
        let ds = dataset(70, 7);
        let (train, val) = split_stratified(&ds, SplitRatio::EIGHTY_TWENTY, Some(3));

        assert_eq!(train.len(), 56);
        assert_eq!(val.len(), 14);
        for label in 0..7 {
            assert_eq!(val.samples.iter().filter(|s| s.label == label).count(), 2);
        }
    }

    #[test]
    fn split_batches_preserves_order() {
        let ds = dataset(10, 2);
        let (train, val) = split_batches(&ds, 3, 0.25);

        // 4 batches -> 3 for training
        assert_eq!(ids(&train), (0..9).collect::<Vec<_>>());
        assert_eq!(ids(&val), vec![9]);
    }

    #[test]
    fn split_batches_without_validation() {
        let ds = dataset(10, 2);
        let (train, val) = split_batches(&ds, 4, 0.0);
        assert_eq!(train.len(), 10);
        assert!(val.is_empty());
    }

    #[test]
    fn split_batches_single_batch_goes_to_validation() {
        let ds = dataset(5, 1);
        let (train, val) = split_batches(&ds, 8, 0.2);
        assert!(train.is_empty());
        assert_eq!(val.len(), 5);
    }

    #[test]
    fn split_batches_floors_exact_products() {
        // 0.65 * 180 is exactly 117 batches; single precision rounds it down to 116
        let (train, val) = split_batches(&dataset(180, 1), 1, 0.35);
        assert_eq!(train.len(), 117);
        assert_eq!(val.len(), 63);

        let (train, val) = split_batches(&dataset(5, 1), 1, 0.2);
        assert_eq!(train.len(), 4);
        assert_eq!(val.len(), 1);
    }
}
