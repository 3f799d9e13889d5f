//! Error types for feature extraction

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the extraction pipeline.
///
/// Every error is reported to the immediate caller of the failing
/// operation; nothing is retried internally.
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// Malformed or missing configuration, invalid mirror mode, unreadable mean source
    #[error("init error: {0}")]
    Init(String),

    /// Buffer capacity violation or malformed input image
    #[error("load data error: {0}")]
    LoadData(String),

    /// Requested layer is not produced by the model, or the layer list is malformed
    #[error("feature layer error: {0}")]
    FeatureLayer(String),

    /// Too many images for a single-shot batch, or an invalid extraction request
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Failure inside the inference runtime (device, memory, bad outputs)
    #[error("inference error: {0}")]
    Inference(String),

    #[error("failed to decode image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("npy error on '{path}': {message}")]
    Npy { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractorError {
    pub(crate) fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    pub(crate) fn load_data(msg: impl Into<String>) -> Self {
        Self::LoadData(msg.into())
    }

    pub(crate) fn feature_layer(msg: impl Into<String>) -> Self {
        Self::FeatureLayer(msg.into())
    }

    pub(crate) fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Wrap any runtime error as an inference failure
    pub fn inference(err: impl std::fmt::Display) -> Self {
        Self::Inference(err.to_string())
    }

    /// True for errors caused by unreadable or malformed input images
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::LoadData(_) | Self::Image { .. })
    }
}

/// Convenience result alias used across the crate
pub type Result<T> = std::result::Result<T, ExtractorError>;
