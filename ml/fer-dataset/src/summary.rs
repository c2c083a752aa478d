//! Dataset summary and statistics.

use serde::{Deserialize, Serialize};

use crate::sample::ImageDataset;

/// Per-class sample counts for a dataset.
///
/// Useful for spotting class imbalance before training.
///
/// # Example
///
/// ```
/// use fer_dataset::{DatasetSummary, ImageDataset, ImageSample};
///
/// let samples = (0..10).map(|i| ImageSample::new(i, vec![0.0], (i % 2) as usize)).collect();
/// let dataset = ImageDataset::new(samples, vec!["angry".into(), "happy".into()], [1, 1], 1);
///
/// let summary = DatasetSummary::from_dataset(&dataset);
/// assert_eq!(summary.total_samples, 10);
/// assert_eq!(summary.class_counts, vec![5, 5]);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Total number of samples.
    pub total_samples: usize,

    /// Class names, indexed by label.
    pub class_names: Vec<String>,

    /// Number of samples per class, indexed by label.
    pub class_counts: Vec<usize>,

    /// Image size as `[height, width]`.
    pub image_size: [usize; 2],

    /// Channels per image.
    pub channels: usize,
}

impl DatasetSummary {
    /// Creates a summary of `dataset`.
    ///
    /// Samples whose label has no class name are counted in the total only.
    #[must_use]
    pub fn from_dataset(dataset: &ImageDataset) -> Self {
        let mut class_counts = vec![0usize; dataset.num_classes()];
        for sample in &dataset.samples {
            if let Some(count) = class_counts.get_mut(sample.label) {
                *count += 1;
            }
        }

        Self {
            total_samples: dataset.len(),
            class_names: dataset.class_names.clone(),
            class_counts,
            image_size: dataset.image_size,
            channels: dataset.channels,
        }
    }

    /// Returns true if the dataset is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    /// Fraction of samples in each class.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn class_ratios(&self) -> Vec<f32> {
        if self.total_samples == 0 {
            return vec![0.0; self.class_counts.len()];
        }
        self.class_counts
            .iter()
            .map(|&count| count as f32 / self.total_samples as f32)
            .collect()
    }

    /// Label of the largest class, if any.
    #[must_use]
    pub fn majority_class(&self) -> Option<usize> {
        self.class_counts
            .iter()
            .enumerate()
            .max_by_key(|&(label, &count)| (count, std::cmp::Reverse(label)))
            .map(|(label, _)| label)
    }

    /// Checks if the classes are balanced (within tolerance).
    ///
    /// Every class ratio must lie within `tolerance` of the uniform ratio
    /// `1 / num_classes`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_balanced(&self, tolerance: f32) -> bool {
        if self.class_counts.is_empty() {
            return true;
        }
        let uniform = 1.0 / self.class_counts.len() as f32;
        self.class_ratios()
            .iter()
            .all(|ratio| (ratio - uniform).abs() <= tolerance)
    }

    /// Returns a human-readable summary string.
    #[must_use]
    #[allow(clippy::let_underscore_must_use)] // String::write_fmt is infallible
    pub fn to_report(&self) -> String {
        use std::fmt::Write;

        let mut report = String::new();
        let _ = writeln!(report, "Dataset Summary");
        let _ = writeln!(report, "===============");
        let _ = writeln!(report, "Total samples: {}", self.total_samples);
        let _ = writeln!(
            report,
            "Image size: {}x{}x{}",
            self.image_size[0], self.image_size[1], self.channels
        );

        if !self.class_counts.is_empty() {
            let _ = writeln!(report, "\nClass Distribution:");
            for ((name, count), ratio) in self
                .class_names
                .iter()
                .zip(&self.class_counts)
                .zip(self.class_ratios())
            {
                let _ = writeln!(report, "  {name}: {count} ({:.1}%)", ratio * 100.0);
            }
        }

        report
    }

    /// Merges two summaries together.
    ///
    /// Useful for combining train/val statistics. Classes are matched by
    /// label; the longer class list wins.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let len = self.class_counts.len().max(other.class_counts.len());
        let mut class_counts = vec![0usize; len];
        for (i, &count) in self.class_counts.iter().enumerate() {
            class_counts[i] += count;
        }
        for (i, &count) in other.class_counts.iter().enumerate() {
            class_counts[i] += count;
        }

        let class_names = if self.class_names.len() >= other.class_names.len() {
            self.class_names.clone()
        } else {
            other.class_names.clone()
        };

        Self {
            total_samples: self.total_samples + other.total_samples,
            class_names,
            class_counts,
            image_size: self.image_size,
            channels: self.channels,
        }
    }
}
