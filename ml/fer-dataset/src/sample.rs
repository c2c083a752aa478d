//! Image samples and in-memory datasets.

use std::path::PathBuf;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

/// Colour mode images are converted to when decoded.
///
/// # Example
///
/// ```
/// use fer_dataset::ColorMode;
///
/// assert_eq!(ColorMode::default().channels(), 3);
/// assert_eq!(ColorMode::Grayscale.channels(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ColorMode {
    /// Single luminance channel.
    Grayscale,

    /// Three RGB channels.
    #[default]
    Rgb,
}

impl ColorMode {
    /// Number of channels produced by this mode.
    #[must_use]
    pub const fn channels(&self) -> usize {
        match self {
            Self::Grayscale => 1,
            Self::Rgb => 3,
        }
    }

    /// Returns the mode name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::Rgb => "rgb",
        }
    }
}

impl std::fmt::Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single decoded image with its class label.
///
/// Pixels are stored as a flat `Vec<f32>` in CHW (Channel-Height-Width)
/// layout, normalized to `[0, 1]`.
///
/// # Example
///
/// ```
/// use fer_dataset::ImageSample;
///
/// let sample = ImageSample::new(7, vec![0.5; 48 * 48], 3);
/// assert_eq!(sample.id, 7);
/// assert_eq!(sample.label, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Sample ID, unique within a dataset.
    pub id: u64,

    /// Pixel data in CHW layout, normalized to `[0, 1]`.
    pub pixels: Vec<f32>,

    /// Class index.
    pub label: usize,

    /// File the sample was decoded from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ImageSample {
    /// Creates a sample that is not backed by a file.
    #[must_use]
    pub const fn new(id: u64, pixels: Vec<f32>, label: usize) -> Self {
        Self {
            id,
            pixels,
            label,
            path: None,
        }
    }

    /// Sets the source path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// An ordered collection of equally sized images and their class names.
///
/// # Example
///
/// ```
/// use fer_dataset::{ImageDataset, ImageSample};
///
/// let samples = (0..10).map(|i| ImageSample::new(i, vec![0.0; 4], 0)).collect();
/// let dataset = ImageDataset::new(samples, vec!["happy".into()], [2, 2], 1);
///
/// assert_eq!(dataset.len(), 10);
/// assert_eq!(dataset.cardinality(4), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDataset {
    /// Samples, in iteration order.
    pub samples: Vec<ImageSample>,

    /// Class names; a sample's label indexes into this list.
    pub class_names: Vec<String>,

    /// Image size as `[height, width]`.
    pub image_size: [usize; 2],

    /// Channels per image.
    pub channels: usize,
}

impl ImageDataset {
    /// Creates a dataset.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(
        samples: Vec<ImageSample>,
        class_names: Vec<String>,
        image_size: [usize; 2],
        channels: usize,
    ) -> Self {
        Self {
            samples,
            class_names,
            image_size,
            channels,
        }
    }

    /// Creates a dataset with the same classes and geometry but other samples.
    #[must_use]
    pub fn with_samples(&self, samples: Vec<ImageSample>) -> Self {
        Self {
            samples,
            class_names: self.class_names.clone(),
            image_size: self.image_size,
            channels: self.channels,
        }
    }

    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the number of classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Returns the class name for a label.
    #[must_use]
    pub fn class_name(&self, label: usize) -> Option<&str> {
        self.class_names.get(label).map(String::as_str)
    }

    /// Number of values per image (C * H * W).
    #[must_use]
    pub const fn pixels_per_image(&self) -> usize {
        self.channels * self.image_size[0] * self.image_size[1]
    }

    /// Number of batches of `batch_size` samples, counting a trailing
    /// partial batch.
    #[must_use]
    pub fn cardinality(&self, batch_size: usize) -> usize {
        if batch_size == 0 {
            0
        } else {
            self.len().div_ceil(batch_size)
        }
    }

    /// Shuffles the samples in place.
    ///
    /// Uses a ChaCha RNG seeded from `seed`, or from entropy when `None`.
    pub fn shuffle(&mut self, seed: Option<u64>) {
        let mut rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        self.samples.shuffle(&mut rng);
    }

    /// Checks that every sample matches the dataset geometry and classes.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidDimensions`] for a zero-sized geometry
    /// and [`DatasetError::Validation`] for the first inconsistent sample.
    pub fn validate(&self) -> Result<()> {
        let [height, width] = self.image_size;
        if height == 0 || width == 0 || self.channels == 0 {
            return Err(DatasetError::invalid_dimensions(width, height));
        }

        let expected = self.pixels_per_image();
        for sample in &self.samples {
            if sample.pixels.len() != expected {
                return Err(DatasetError::validation(format!(
                    "sample {} has {} values, expected {expected}",
                    sample.id,
                    sample.pixels.len()
                )));
            }
            if sample.label >= self.num_classes() {
                return Err(DatasetError::validation(format!(
                    "sample {} has label {} but there are {} classes",
                    sample.id,
                    sample.label,
                    self.num_classes()
                )));
            }
        }
        Ok(())
    }
}
