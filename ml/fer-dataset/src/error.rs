//! Error types for fer-dataset crate.

use thiserror::Error;

/// Errors that can occur while loading or preparing datasets.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Dataset directory does not exist or is not a directory.
    #[error("dataset directory not found: {0}")]
    DirectoryNotFound(String),

    /// Failed to decode an image file.
    #[error("failed to decode image {path}: {reason}")]
    DecodeImage {
        /// Path to the image file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid image dimensions.
    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Width in pixels.
        width: usize,
        /// Height in pixels.
        height: usize,
    },

    /// Invalid validation split.
    #[error("invalid split ratio: {0} (must be in [0, 1))")]
    InvalidSplitRatio(f64),

    /// Invalid loader or batching configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No class directories or no images were found.
    #[error("dataset is empty: {0}")]
    EmptyDataset(String),

    /// Train and test directories define different classes.
    #[error("class mismatch: train has {train:?}, test has {test:?}")]
    ClassMismatch {
        /// Training class names.
        train: Vec<String>,
        /// Test class names.
        test: Vec<String>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),
}

impl DatasetError {
    /// Creates a directory not found error.
    #[must_use]
    pub fn directory_not_found(path: impl Into<String>) -> Self {
        Self::DirectoryNotFound(path.into())
    }

    /// Creates an image decoding error.
    #[must_use]
    pub fn decode_image(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DecodeImage {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid dimensions error.
    #[must_use]
    pub const fn invalid_dimensions(width: usize, height: usize) -> Self {
        Self::InvalidDimensions { width, height }
    }

    /// Creates an invalid split ratio error.
    #[must_use]
    pub const fn invalid_split_ratio(ratio: f64) -> Self {
        Self::InvalidSplitRatio(ratio)
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates an empty dataset error.
    #[must_use]
    pub fn empty_dataset(reason: impl Into<String>) -> Self {
        Self::EmptyDataset(reason.into())
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for fer-dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_directory_not_found() {
        let err = DatasetError::directory_not_found("data/train");
        assert!(err.to_string().contains("data/train"));
    }

    #[test]
    fn error_decode_image() {
        let err = DatasetError::decode_image("happy/0001.png", "truncated");
        assert!(err.to_string().contains("happy/0001.png"));
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn error_invalid_dimensions() {
        let err = DatasetError::invalid_dimensions(0, 48);
        assert!(err.to_string().contains("0x48"));
    }

    #[test]
    fn error_invalid_split_ratio() {
        let err = DatasetError::invalid_split_ratio(1.5);
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn error_class_mismatch() {
        let err = DatasetError::ClassMismatch {
            train: vec!["angry".into(), "happy".into()],
            test: vec!["happy".into()],
        };
        assert!(err.to_string().contains("angry"));
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: DatasetError = io_err.into();
        assert!(matches!(err, DatasetError::Io(_)));
    }
}
