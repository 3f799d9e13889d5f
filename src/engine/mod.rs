//! Feature extraction engine
//!
//! Pipeline per batch: preprocess -> batch buffer -> bound graph ->
//! mirror fusion / normalization. Provides:
//! - Configurable image preprocessing
//! - Fixed-capacity batch buffer with paired mirror slots
//! - Output layer selection and graph rebinding
//! - OpenVINO-backed inference

pub mod batch;
pub mod buffer;
pub mod extractor;
pub mod features;
pub mod fuser;
pub mod inference;
pub mod layers;
pub mod preprocess;
pub mod runtime;

pub use buffer::{BatchBuffer, PairedRows};
pub use extractor::FeatureExtractor;
pub use features::FeatureResult;
pub use fuser::fuse;
pub use inference::{BoundGraph, InferenceEngine, ModelHandle};
pub use layers::{split_layer_names, LayerSelector};
pub use preprocess::{Preprocessor, RawImage};
pub use runtime::{OpenVinoEngine, OpenVinoGraph};
