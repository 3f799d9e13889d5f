//! Storage module for extracted feature persistence

pub mod npy;
pub mod traits;

pub use npy::NpyFeatureStore;
pub use traits::FeatureStore;
