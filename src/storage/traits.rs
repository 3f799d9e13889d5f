//! Storage abstraction traits
//!
//! Defines the interface for feature persistence. The extraction core never
//! writes results itself; callers hand a [`FeatureResult`] to a store.

use std::path::PathBuf;

use ndarray::ArrayView1;

use crate::engine::FeatureResult;
use crate::error::{ExtractorError, Result};

/// Feature store trait
pub trait FeatureStore {
    /// Persist one embedding for one (image, layer) pair.
    /// Returns where it was written.
    fn save(&mut self, image: &str, layer: &str, feature: ArrayView1<'_, f32>) -> Result<PathBuf>;

    /// Persist every embedding of `features`; `images[i]` names row `i`.
    fn save_all(&mut self, images: &[String], features: &FeatureResult) -> Result<usize> {
        if features.num_images() != images.len() {
            return Err(ExtractorError::extraction(format!(
                "{} images but {} feature rows",
                images.len(),
                features.num_images()
            )));
        }

        let mut saved = 0;
        for (layer, rows) in features.iter() {
            for (image, feature) in images.iter().zip(rows) {
                self.save(image, layer, feature.view())?;
                saved += 1;
            }
        }
        Ok(saved)
    }
}
