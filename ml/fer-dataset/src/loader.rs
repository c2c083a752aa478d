//! Loading labelled images from a class-per-directory layout.
//!
//! ```text
//! <root>/train/<class_name>/*.png
//! <root>/test/<class_name>/*.png
//! ```
//!
//! Class names are the sub-directory names in lexicographic order; a
//! sample's label is the index of its directory in that order.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use image::imageops::FilterType;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DatasetError, Result};
use crate::sample::{ColorMode, ImageDataset, ImageSample};
use crate::splits::split_batches;

/// Default side length of decoded images.
pub const DEFAULT_IMAGE_SIZE: usize = 48;

/// Settings for decoding an image folder.
///
/// # Example
///
/// ```
/// use fer_dataset::{ColorMode, LoaderConfig};
///
/// let config = LoaderConfig::default().with_color_mode(ColorMode::Grayscale);
/// assert_eq!(config.image_size, [48, 48]);
/// assert!(config.accepts(std::path::Path::new("face.PNG")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Target size `[height, width]`; images are resized to exactly this.
    pub image_size: [usize; 2],

    /// Colour mode images are converted to.
    pub color_mode: ColorMode,

    /// Accepted file extensions (lowercase, without the dot).
    pub extensions: Vec<String>,

    /// Seed for shuffling the training set before splitting.
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            image_size: [DEFAULT_IMAGE_SIZE, DEFAULT_IMAGE_SIZE],
            color_mode: ColorMode::default(),
            extensions: ["bmp", "gif", "jpeg", "jpg", "png"]
                .into_iter()
                .map(String::from)
                .collect(),
            seed: None,
        }
    }
}

impl LoaderConfig {
    /// Sets the target image size.
    #[must_use]
    pub const fn with_image_size(mut self, height: usize, width: usize) -> Self {
        self.image_size = [height, width];
        self
    }

    /// Sets the colour mode.
    #[must_use]
    pub const fn with_color_mode(mut self, color_mode: ColorMode) -> Self {
        self.color_mode = color_mode;
        self
    }

    /// Sets the shuffle seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns `true` if `path` has an accepted extension.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }

    fn target_size(&self) -> Result<(u32, u32)> {
        let [height, width] = self.image_size;
        let invalid = || DatasetError::invalid_dimensions(width, height);
        if height == 0 || width == 0 {
            return Err(invalid());
        }
        let h = u32::try_from(height).map_err(|_| invalid())?;
        let w = u32::try_from(width).map_err(|_| invalid())?;
        Ok((w, h))
    }
}

/// Train, validation and test datasets produced by [`load_data`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSplits {
    /// Training samples.
    pub train: ImageDataset,

    /// Validation samples carved from the training directory.
    pub validation: ImageDataset,

    /// Test samples.
    pub test: ImageDataset,

    /// Batch size the splits were computed for.
    pub batch_size: usize,
}

impl DataSplits {
    /// Class names shared by all splits.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.train.class_names
    }
}

/// Number of batches in `dataset` for the given batch size.
///
/// # Example
///
/// ```
/// use fer_dataset::{ImageDataset, ImageSample, dataset_length};
///
/// let samples = (0..33).map(|i| ImageSample::new(i, vec![0.0], 0)).collect();
/// let dataset = ImageDataset::new(samples, vec!["happy".into()], [1, 1], 1);
/// assert_eq!(dataset_length(&dataset, 32), 2);
/// ```
#[must_use]
pub fn dataset_length(dataset: &ImageDataset, batch_size: usize) -> usize {
    dataset.cardinality(batch_size)
}

/// Lists the class sub-directories of `dir`, sorted by name.
fn class_directories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut classes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => classes.push((name, path)),
            Err(name) => warn!(?name, "skipping class directory with non UTF-8 name"),
        }
    }
    classes.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(classes)
}

/// Lists accepted image files directly inside `dir`, sorted by path.
fn image_files(dir: &Path, config: &LoaderConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && config.accepts(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Converts a decoded image to normalized CHW pixels.
fn to_chw(image: &DynamicImage, color_mode: ColorMode) -> Vec<f32> {
    match color_mode {
        ColorMode::Grayscale => image
            .to_luma8()
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) / 255.0)
            .collect(),
        ColorMode::Rgb => {
            let rgb = image.to_rgb8();
            let plane = rgb.as_raw().len() / 3;
            let mut pixels = vec![0.0; plane * 3];
            for (i, px) in rgb.as_raw().chunks_exact(3).enumerate() {
                for (c, &value) in px.iter().enumerate() {
                    pixels[c * plane + i] = f32::from(value) / 255.0;
                }
            }
            pixels
        }
    }
}

/// Decodes one image file into a sample.
fn decode_sample(
    id: u64,
    path: &Path,
    label: usize,
    size: (u32, u32),
    color_mode: ColorMode,
) -> Result<ImageSample> {
    let image = image::open(path)
        .map_err(|e| DatasetError::decode_image(path.display().to_string(), e.to_string()))?;
    let (width, height) = size;
    let resized = image.resize_exact(width, height, FilterType::Triangle);
    Ok(ImageSample::new(id, to_chw(&resized, color_mode), label).with_path(path))
}

/// Loads every image under `dir`, labelled by class sub-directory.
///
/// Files are decoded in parallel; sample order is class-major, then by file
/// name.
///
/// # Errors
///
/// Returns [`DatasetError::DirectoryNotFound`] if `dir` is not a directory,
/// [`DatasetError::EmptyDataset`] if it contains no class directories or no
/// images, and [`DatasetError::DecodeImage`] for the first unreadable image.
pub fn load_image_folder(dir: &Path, config: &LoaderConfig) -> Result<ImageDataset> {
    if !dir.is_dir() {
        return Err(DatasetError::directory_not_found(dir.display().to_string()));
    }
    let size = config.target_size()?;

    let classes = class_directories(dir)?;
    if classes.is_empty() {
        return Err(DatasetError::empty_dataset(format!(
            "no class directories in {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for (label, (name, class_dir)) in classes.iter().enumerate() {
        let class_files = image_files(class_dir, config)?;
        debug!(class = %name, label, images = class_files.len(), "indexed class");
        files.extend(class_files.into_iter().map(|path| (path, label)));
    }
    if files.is_empty() {
        return Err(DatasetError::empty_dataset(format!(
            "no images in {}",
            dir.display()
        )));
    }

    let samples = files
        .par_iter()
        .enumerate()
        .map(|(id, (path, label))| decode_sample(id as u64, path, *label, size, config.color_mode))
        .collect::<Result<Vec<_>>>()?;

    let class_names: Vec<String> = classes.into_iter().map(|(name, _)| name).collect();
    info!(
        dir = %dir.display(),
        classes = class_names.len(),
        samples = samples.len(),
        "loaded image folder"
    );

    Ok(ImageDataset::new(
        samples,
        class_names,
        config.image_size,
        config.color_mode.channels(),
    ))
}

/// Loads `<root>/train` and `<root>/test` with default settings and splits
/// off a validation set.
///
/// See [`load_data_with`].
///
/// # Errors
///
/// See [`load_data_with`].
pub fn load_data(batch_size: usize, val_split: f64, root: &Path) -> Result<DataSplits> {
    load_data_with(batch_size, val_split, root, &LoaderConfig::default())
}

/// Loads `<root>/train` and `<root>/test` and splits off a validation set.
///
/// The training set is shuffled once, then split at batch granularity:
/// the first `floor((1 - val_split) * batches)` batches are kept for
/// training and the remaining samples form the validation set.
///
/// # Errors
///
/// Returns [`DatasetError::InvalidConfig`] for a zero batch size,
/// [`DatasetError::InvalidSplitRatio`] if `val_split` is outside `[0, 1)`,
/// [`DatasetError::ClassMismatch`] if train and test define different
/// classes, and any error from [`load_image_folder`].
pub fn load_data_with(
    batch_size: usize,
    val_split: f64,
    root: &Path,
    config: &LoaderConfig,
) -> Result<DataSplits> {
    if batch_size == 0 {
        return Err(DatasetError::invalid_config("batch size must be > 0"));
    }
    if !(0.0..1.0).contains(&val_split) {
        return Err(DatasetError::invalid_split_ratio(val_split));
    }

    let mut train = load_image_folder(&root.join("train"), config)?;
    let test = load_image_folder(&root.join("test"), config)?;
    if train.class_names != test.class_names {
        return Err(DatasetError::ClassMismatch {
            train: train.class_names,
            test: test.class_names,
        });
    }

    train.shuffle(config.seed);
    let (train, validation) = split_batches(&train, batch_size, val_split);

    info!(
        train = train.len(),
        validation = validation.len(),
        test = test.len(),
        batch_size,
        "prepared data splits"
    );

    Ok(DataSplits {
        train,
        validation,
        test,
        batch_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn write_gray(path: &Path, value: u8, size: u32) {
        GrayImage::from_pixel(size, size, Luma([value]))
            .save(path)
            .unwrap();
    }

    fn make_folder(root: &Path, classes: &[(&str, usize)]) {
        for (class, count) in classes {
            let dir = root.join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                write_gray(&dir.join(format!("{i:03}.png")), 255, 8);
            }
        }
    }

    #[test]
    fn config_accepts_extensions() {
        let config = LoaderConfig::default();
        assert!(config.accepts(Path::new("a.png")));
        assert!(config.accepts(Path::new("a.JPG")));
        assert!(!config.accepts(Path::new("a.txt")));
        assert!(!config.accepts(Path::new("noext")));
    }

    #[test]
    fn config_rejects_zero_size() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), &[("happy", 1)]);
        let config = LoaderConfig::default().with_image_size(0, 48);
        assert!(matches!(
            load_image_folder(dir.path(), &config),
            Err(DatasetError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn missing_directory() {
        let result = load_image_folder(Path::new("/no/such/dir"), &LoaderConfig::default());
        assert!(matches!(result, Err(DatasetError::DirectoryNotFound(_))));
    }

    #[test]
    fn directory_without_classes() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_image_folder(dir.path(), &LoaderConfig::default());
        assert!(matches!(result, Err(DatasetError::EmptyDataset(_))));
    }

    #[test]
    fn classes_without_images() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("happy")).unwrap();
        fs::write(dir.path().join("happy").join("notes.txt"), "skip me").unwrap();
        let result = load_image_folder(dir.path(), &LoaderConfig::default());
        assert!(matches!(result, Err(DatasetError::EmptyDataset(_))));
    }

    #[test]
    fn corrupt_image_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sad")).unwrap();
        fs::write(dir.path().join("sad").join("broken.png"), b"not a png").unwrap();
        let result = load_image_folder(dir.path(), &LoaderConfig::default());
        assert!(matches!(result, Err(DatasetError::DecodeImage { .. })));
    }

    #[test]
    fn labels_follow_sorted_class_names() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), &[("surprise", 2), ("angry", 3), ("happy", 1)]);

        let config = LoaderConfig::default()
            .with_image_size(4, 4)
            .with_color_mode(ColorMode::Grayscale);
        let ds = load_image_folder(dir.path(), &config).unwrap();

        assert_eq!(ds.class_names, vec!["angry", "happy", "surprise"]);
        assert_eq!(ds.len(), 6);
        let labels: Vec<usize> = ds.samples.iter().map(|s| s.label).collect();
        assert_eq!(labels, vec![0, 0, 0, 1, 2, 2]);
        assert!(ds.validate().is_ok());
    }

    #[test]
    fn images_are_resized_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), &[("neutral", 1)]);

        let ds = load_image_folder(dir.path(), &LoaderConfig::default()).unwrap();
        assert_eq!(ds.channels, 3);
        assert_eq!(ds.image_size, [48, 48]);
        assert_eq!(ds.samples[0].pixels.len(), 3 * 48 * 48);
        assert!(ds.samples[0].pixels.iter().all(|&p| (p - 1.0).abs() < 1e-6));
    }

    #[test]
    fn rgb_pixels_are_channel_major() {
        let dir = tempfile::tempdir().unwrap();
        let class_dir = dir.path().join("fear");
        fs::create_dir_all(&class_dir).unwrap();
        RgbImage::from_pixel(2, 2, Rgb([255, 0, 51]))
            .save(class_dir.join("0.png"))
            .unwrap();

        let config = LoaderConfig::default().with_image_size(2, 2);
        let ds = load_image_folder(dir.path(), &config).unwrap();
        let pixels = &ds.samples[0].pixels;

        assert!(pixels[..4].iter().all(|&p| (p - 1.0).abs() < 1e-6));
        assert!(pixels[4..8].iter().all(|&p| p.abs() < 1e-6));
        assert!(pixels[8..].iter().all(|&p| (p - 0.2).abs() < 1e-6));
    }

    #[test]
    fn load_data_splits_by_batches() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(&dir.path().join("train"), &[("angry", 10), ("happy", 10)]);
        make_folder(&dir.path().join("test"), &[("angry", 2), ("happy", 3)]);

        let config = LoaderConfig::default()
            .with_image_size(4, 4)
            .with_color_mode(ColorMode::Grayscale)
            .with_seed(1);
        let splits = load_data_with(4, 0.2, dir.path(), &config).unwrap();

        // 20 samples -> 5 batches -> 4 train batches
        assert_eq!(splits.train.len(), 16);
        assert_eq!(splits.validation.len(), 4);
        assert_eq!(splits.test.len(), 5);
        assert_eq!(splits.batch_size, 4);
        assert_eq!(splits.class_names(), ["angry", "happy"]);
        assert_eq!(dataset_length(&splits.train, 4), 4);
    }

    #[test]
    fn load_data_rejects_bad_arguments() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_data(0, 0.2, dir.path()),
            Err(DatasetError::InvalidConfig(_))
        ));
        assert!(matches!(
            load_data(32, 1.0, dir.path()),
            Err(DatasetError::InvalidSplitRatio(_))
        ));
        assert!(matches!(
            load_data(32, 0.2, dir.path()),
            Err(DatasetError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn load_data_detects_class_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(&dir.path().join("train"), &[("angry", 1), ("happy", 1)]);
        make_folder(&dir.path().join("test"), &[("angry", 1)]);

        let config = LoaderConfig::default().with_image_size(4, 4);
        let result = load_data_with(2, 0.0, dir.path(), &config);
        assert!(matches!(result, Err(DatasetError::ClassMismatch { .. })));
    }
}
