//! Weight persistence through Burn recorders.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{BinFileRecorder, FullPrecisionSettings, PrettyJsonFileRecorder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ModelError, Result};

/// Supported checkpoint file formats.
///
/// # Example
///
/// ```
/// use fer_models::CheckpointFormat;
///
/// assert_eq!(CheckpointFormat::from_extension("bin"), Some(CheckpointFormat::Binary));
/// assert_eq!(CheckpointFormat::from_extension("json"), Some(CheckpointFormat::Json));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckpointFormat {
    /// Compact binary weights (`BinFileRecorder`, full precision).
    #[default]
    Binary,

    /// Human-readable weights (`PrettyJsonFileRecorder`).
    Json,
}

impl CheckpointFormat {
    /// Determines the format from a file extension (`bin` or `json`).
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "bin" => Some(Self::Binary),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Determines the format from a file path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// File extension written for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Binary => "bin",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Saves model weights to `path` with the format's extension appended.
///
/// Returns the path actually written.
///
/// # Errors
///
/// Returns [`ModelError::SaveCheckpoint`] if the recorder fails.
pub fn save_checkpoint<B, M>(model: &M, path: &Path, format: CheckpointFormat) -> Result<PathBuf>
where
    B: Backend,
    M: Module<B>,
{
    let full_path = path.with_extension(format.extension());
    let shown = full_path.display().to_string();

    match format {
        CheckpointFormat::Binary => model
            .clone()
            .save_file(&full_path, &BinFileRecorder::<FullPrecisionSettings>::new())
            .map_err(|e| ModelError::save_checkpoint(&shown, e.to_string()))?,
        CheckpointFormat::Json => model
            .clone()
            .save_file(&full_path, &PrettyJsonFileRecorder::<FullPrecisionSettings>::new())
            .map_err(|e| ModelError::save_checkpoint(&shown, e.to_string()))?,
    }

    info!(path = %shown, %format, "saved checkpoint");
    Ok(full_path)
}

/// Loads weights from `path` into `model`.
///
/// The format is inferred from the file extension.
///
/// # Errors
///
/// Returns [`ModelError::CheckpointNotFound`] if the file is missing,
/// [`ModelError::UnsupportedFormat`] for an unknown extension and
/// [`ModelError::LoadCheckpoint`] if the recorder fails (e.g. the record
/// does not match the model architecture).
pub fn load_checkpoint<B, M>(model: M, path: &Path, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let shown = path.display().to_string();
    if !path.exists() {
        return Err(ModelError::checkpoint_not_found(&shown));
    }

    let format = CheckpointFormat::from_path(path).ok_or_else(|| {
        ModelError::unsupported_format(
            path.extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("<none>"),
        )
    })?;
    debug!(path = %shown, %format, "loading checkpoint");

    // Burn recorders append their own extension.
    let stem = path.with_extension("");
    match format {
        CheckpointFormat::Binary => model
            .load_file(stem, &BinFileRecorder::<FullPrecisionSettings>::new(), device)
            .map_err(|e| ModelError::load_checkpoint(&shown, e.to_string())),
        CheckpointFormat::Json => model
            .load_file(stem, &PrettyJsonFileRecorder::<FullPrecisionSettings>::new(), device)
            .map_err(|e| ModelError::load_checkpoint(&shown, e.to_string())),
    }
}
