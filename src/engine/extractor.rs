//! Face Feature Extractor
//!
//! Owns the preprocessor, the reusable batch buffer and the bound model.
//! One extractor runs one batch at a time; callers that want parallelism
//! create one extractor per worker, each with its own buffer and graph.

use std::path::Path;

use ndarray::Array3;
use tracing::info;

use super::buffer::BatchBuffer;
use super::features::FeatureResult;
use super::fuser::fuse;
use super::inference::{InferenceEngine, ModelHandle};
use super::preprocess::{to_three_channels, Preprocessor, RawImage};
use super::runtime::OpenVinoEngine;
use crate::config::{ExtractorConfig, MirrorMode};
use crate::error::{ExtractorError, Result};
use crate::utils::image::read_image;

/// Batched multi-layer feature extractor
pub struct FeatureExtractor<E: InferenceEngine = OpenVinoEngine> {
    pub(super) config: ExtractorConfig,
    pub(super) preprocessor: Preprocessor,
    pub(super) buffer: BatchBuffer,
    pub(super) model: ModelHandle<E>,
}

impl FeatureExtractor<OpenVinoEngine> {
    /// Load the configured checkpoint with OpenVINO and bind the requested layers
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let engine = OpenVinoEngine::load(&config.network_model, config.device)?;
        Self::with_engine(config, engine)
    }

    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(ExtractorConfig::load(path)?)
    }
}

impl<E: InferenceEngine> FeatureExtractor<E> {
    /// Build an extractor around an already loaded engine
    pub fn with_engine(config: ExtractorConfig, engine: E) -> Result<Self> {
        let model = ModelHandle::new(engine, &config.feature_layers, config.input_batch_shape())?;
        let buffer = BatchBuffer::new(
            config.batch_size,
            config.mirror_trick.is_enabled(),
            config.input_height,
            config.input_width,
        );
        let preprocessor = Preprocessor::new(&config);

        info!(
            "Feature extractor ready: batch {} (effective {}), input {}x{}, mirror {:?}, normalize {}, device {}",
            config.batch_size,
            buffer.effective_capacity(),
            config.input_width,
            config.input_height,
            config.mirror_trick,
            config.normalize_output,
            config.device,
        );

        Ok(Self {
            config,
            preprocessor,
            buffer,
            model,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn mirror_mode(&self) -> MirrorMode {
        self.config.mirror_trick
    }

    /// Currently bound output layers
    pub fn feature_layers(&self) -> &[String] {
        self.model.bound_layers()
    }

    /// All layers the model can produce
    pub fn available_layers(&self) -> &[String] {
        self.model.selector().available()
    }

    pub fn first_layer_name(&self) -> Option<&str> {
        self.available_layers().first().map(String::as_str)
    }

    pub fn final_layer_name(&self) -> Option<&str> {
        self.available_layers().last().map(String::as_str)
    }

    /// Select new output layers (empty for the model defaults). Always
    /// rebinds the graph.
    pub fn set_feature_layers<S: AsRef<str>>(&mut self, layers: &[S]) -> Result<()> {
        self.model.rebind(layers)
    }

    /// Decode an image the way this extractor is configured to
    pub fn read_image(&self, path: impl AsRef<Path>) -> Result<RawImage> {
        read_image(path, self.config.image_as_grey)
    }

    /// Validate and preprocess one image into a (3, H, W) tensor
    pub fn prepare_image(&self, image: &RawImage) -> Result<Array3<f32>> {
        let (height, width, _) = image.dim();
        if height == 0 || width == 0 {
            return Err(ExtractorError::load_data(format!(
                "image has empty spatial size {height}x{width}"
            )));
        }
        let image = to_three_channels(image)?;
        self.preprocessor.preprocess(image.view())
    }

    /// Preprocess `image` into buffer slot `slot` (mirror written alongside)
    pub fn load_image_to_data_buffer(&mut self, image: &RawImage, slot: usize) -> Result<()> {
        let tensor = self.prepare_image(image)?;
        self.buffer.load(tensor.view(), slot)
    }

    /// Run the bound graph on the buffer and return fused embeddings for the
    /// first `n_imgs` slots. Slots beyond those loaded since the last reset
    /// are never read.
    pub fn get_features(&mut self, n_imgs: usize) -> Result<FeatureResult> {
        if n_imgs > self.buffer.loaded() {
            return Err(ExtractorError::extraction(format!(
                "requested {n_imgs} features but only {} images are loaded",
                self.buffer.loaded()
            )));
        }

        let mut result = FeatureResult::with_layers(self.model.bound_layers());
        if n_imgs == 0 {
            return Ok(result);
        }

        let outputs = self.model.forward(self.buffer.as_tensor())?;
        let mode = self.config.mirror_trick;
        let normalize = self.config.normalize_output;

        for (index, output) in outputs.iter().enumerate() {
            let rows = self.buffer.paired_rows(output.view());
            for slot in 0..n_imgs {
                result.push(index, fuse(rows.original(slot), rows.mirror(slot), mode, normalize));
            }
        }

        Ok(result)
    }

    /// Features of a single image; each layer holds one embedding
    pub fn extract_feature(&mut self, image: &RawImage, layers: Option<&[String]>) -> Result<FeatureResult> {
        self.extract_features_batch(std::slice::from_ref(image), layers)
    }

    /// Decode and extract a single image
    pub fn extract_feature_from_path(&mut self, path: impl AsRef<Path>) -> Result<FeatureResult> {
        let image = self.read_image(path)?;
        self.extract_feature(&image, None)
    }
}
