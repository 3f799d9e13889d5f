//! Batch orchestration
//!
//! Collects images into groups of at most `B`, runs one inference per group
//! and concatenates the per-layer results so they line up with the input
//! order. A trailing partial group yields exactly as many results as it
//! holds images.

use std::path::Path;

use ndarray::Array3;
use tracing::{debug, info};

use super::extractor::FeatureExtractor;
use super::features::FeatureResult;
use super::inference::InferenceEngine;
use super::preprocess::RawImage;
use crate::error::{ExtractorError, Result};
use crate::utils::image::{read_image, resolve_image_path};

impl<E: InferenceEngine> FeatureExtractor<E> {
    /// Extract features for at most `B` images in one inference pass
    pub fn extract_features_batch(
        &mut self,
        images: &[RawImage],
        layers: Option<&[String]>,
    ) -> Result<FeatureResult> {
        if images.len() > self.batch_size() {
            return Err(ExtractorError::extraction(format!(
                "number of input images ({}) > batch_size={}",
                images.len(),
                self.batch_size()
            )));
        }

        if let Some(layers) = layers {
            self.set_feature_layers(layers)?;
        }

        let tensors = images
            .iter()
            .map(|image| self.prepare_image(image))
            .collect::<Result<Vec<_>>>()?;
        self.run_batch(&tensors)
    }

    /// Extract features for any number of images, `B` at a time. The first
    /// failing image or batch aborts the whole call.
    pub fn extract_features_for_images<I>(&mut self, images: I) -> Result<FeatureResult>
    where
        I: IntoIterator<Item = Result<RawImage>>,
    {
        let capacity = self.batch_size();
        let mut features = FeatureResult::with_layers(self.feature_layers());
        let mut pending: Vec<Array3<f32>> = Vec::with_capacity(capacity);
        let mut batches = 0usize;

        for image in images {
            let image = image?;
            pending.push(self.prepare_image(&image)?);

            if pending.len() == capacity {
                features.extend(self.run_batch(&pending)?)?;
                pending.clear();
                batches += 1;
            }
        }

        if !pending.is_empty() {
            features.extend(self.run_batch(&pending)?)?;
            batches += 1;
        }

        debug!("Extracted {} images in {} batches", features.num_images(), batches);
        Ok(features)
    }

    /// Decode and extract a list of image paths, optionally relative to `root`
    pub fn extract_features_for_image_list<P: AsRef<Path>>(
        &mut self,
        image_list: &[P],
        root: Option<&Path>,
    ) -> Result<FeatureResult> {
        info!("Extracting features for {} images", image_list.len());
        let as_grey = self.config.image_as_grey;
        let images = image_list
            .iter()
            .map(|path| read_image(resolve_image_path(root, path), as_grey));
        self.extract_features_for_images(images)
    }

    /// Load preprocessed tensors into slots 0..k and run one inference
    fn run_batch(&mut self, tensors: &[Array3<f32>]) -> Result<FeatureResult> {
        self.buffer.reset();
        for tensor in tensors {
            self.buffer.push(tensor.view())?;
        }
        debug!("Running batch of {}/{} images", tensors.len(), self.buffer.capacity());
        self.get_features(tensors.len())
    }
}
