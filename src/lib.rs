//! Face Feature Extraction Library
//!
//! Batched, multi-layer embedding extraction with optional mirror-trick
//! fusion and L2 output normalization.

pub mod config;
pub mod engine;
pub mod error;
pub mod storage;
pub mod utils;

pub use config::{ExtractorConfig, MirrorMode};
pub use engine::{FeatureExtractor, FeatureResult};
pub use error::{ExtractorError, Result};
