//! Image folder loading and batching for facial expression recognition.
//!
//! This crate turns a class-per-directory image tree into tensors:
//!
//! # Loading
//!
//! - [`load_data`] - Load `train/` and `test/`, carve a validation split
//! - [`load_image_folder`] - Load a single class-per-directory folder
//! - [`LoaderConfig`] - Target size, colour mode, accepted extensions
//! - [`dataset_length`] - Number of batches in a dataset
//!
//! # Dataset Operations
//!
//! - [`ImageDataset`] - Decoded samples plus class names
//! - [`split_batches`] - Batch-granular train/validation split
//! - [`split_dataset`] / [`split_stratified`] - Shuffled ratio splits
//! - [`DatasetSummary`] - Per-class counts
//!
//! # Batching
//!
//! - [`BatchIter`] - Sequential or shuffled batches of sample references
//! - [`ImageBatcher`] - Stacks samples into Burn tensors
//!
//! # Example
//!
//! ```
//! use fer_dataset::{ImageDataset, ImageSample, SplitRatio, split_dataset};
//!
//! let samples = (0..4).map(|i| ImageSample::new(i, vec![0.0], 0)).collect();
//! let dataset = ImageDataset::new(samples, vec!["neutral".into()], [1, 1], 1);
//!
//! let (train, val) = split_dataset(&dataset, SplitRatio::new(0.75), Some(42));
//! assert_eq!(train.len(), 3);
//! assert_eq!(val.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod batcher;
mod error;
mod loader;
mod sample;
mod splits;
mod summary;

// Re-export sample types
pub use sample::{ColorMode, ImageDataset, ImageSample};

// Re-export loading
pub use loader::{
    DEFAULT_IMAGE_SIZE, DataSplits, LoaderConfig, dataset_length, load_data, load_data_with,
    load_image_folder,
};

// Re-export split utilities
pub use splits::{SplitRatio, split_batches, split_dataset, split_stratified};

// Re-export batching
pub use batcher::{BatchIter, BatchOrder, ImageBatch, ImageBatcher};

// Re-export summary types
pub use summary::DatasetSummary;

// Re-export error types
pub use error::{DatasetError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        BatchOrder, ColorMode, DataSplits, DatasetError, DatasetSummary, ImageBatch, ImageBatcher,
        ImageDataset, ImageSample, LoaderConfig, SplitRatio, dataset_length, load_data,
        load_data_with, split_batches,
    };
}
