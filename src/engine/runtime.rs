//! OpenVINO inference engine
//!
//! Loads a checkpoint exported as OpenVINO IR (`<prefix>-<epoch>.xml/.bin`)
//! and compiles it for the configured device. Each bind compiles a fresh
//! model with its own infer request, so a rebind never disturbs the graph
//! that produced earlier results.

use std::time::Instant;

use ndarray::{Array2, ArrayView4};
use openvino::{CompiledModel, Core, ElementType, InferRequest, Model, Shape, Tensor};
use tracing::{debug, info};

use super::inference::{BoundGraph, InferenceEngine};
use crate::config::{Device, ModelSpec};
use crate::error::{ExtractorError, Result};

/// Checkpoint loaded into an OpenVINO core
pub struct OpenVinoEngine {
    core: Core,
    model: Model,
    device: String,
    outputs: Vec<String>,
}

impl OpenVinoEngine {
    /// Read the checkpoint files and enumerate its outputs
    pub fn load(spec: &ModelSpec, device: Device) -> Result<Self> {
        let (xml, bin) = spec.checkpoint_files();
        let xml_path = xml.to_string_lossy().into_owned();
        let bin_path = bin.to_string_lossy().into_owned();

        info!("Loading model: {} (epoch {}) from {}", spec.prefix, spec.epoch, xml_path);
        let start = Instant::now();

        let mut core = Core::new().map_err(ExtractorError::inference)?;
        let model = core
            .read_model_from_file(&xml_path, &bin_path)
            .map_err(|e| ExtractorError::init(format!("failed to load checkpoint {xml_path}: {e}")))?;

        let count = model.get_outputs_len().map_err(ExtractorError::inference)?;
        let mut outputs = Vec::with_capacity(count);
        for i in 0..count {
            let node = model.get_output_by_index(i).map_err(ExtractorError::inference)?;
            outputs.push(node.get_name().map_err(ExtractorError::inference)?);
        }

        info!("Model {} loaded in {:?}", spec.prefix, start.elapsed());

        Ok(Self {
            core,
            model,
            device: device.as_openvino_name(),
            outputs,
        })
    }
}

impl InferenceEngine for OpenVinoEngine {
    type Graph = OpenVinoGraph;

    // IR exposes its result nodes only, so every selectable layer is an output.
    fn available_layers(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn native_outputs(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn bind(&mut self, layers: &[String], input_shape: [usize; 4]) -> Result<OpenVinoGraph> {
        debug!("Compiling model for {} with outputs {:?}", self.device, layers);
        let mut compiled = self
            .core
            .compile_model(&self.model, self.device.as_str().into())
            .map_err(ExtractorError::inference)?;
        let request = compiled.create_infer_request().map_err(ExtractorError::inference)?;

        let dims: Vec<i64> = input_shape.iter().map(|&d| d as i64).collect();
        let shape = Shape::new(&dims).map_err(ExtractorError::inference)?;

        Ok(OpenVinoGraph {
            _compiled: compiled,
            request,
            shape,
            outputs: layers.to_vec(),
        })
    }
}

/// A compiled model with one infer request and a fixed input shape
pub struct OpenVinoGraph {
    _compiled: CompiledModel,
    request: InferRequest,
    shape: Shape,
    outputs: Vec<String>,
}

impl BoundGraph for OpenVinoGraph {
    fn forward(&mut self, batch: ArrayView4<'_, f32>) -> Result<Vec<Array2<f32>>> {
        let rows = batch.dim().0;
        let batch = batch.as_standard_layout();
        let input_data = batch
            .as_slice()
            .ok_or_else(|| ExtractorError::Inference("input batch is not contiguous".into()))?;

        let mut input = Tensor::new(ElementType::F32, &self.shape).map_err(ExtractorError::inference)?;
        let tensor_data = input.get_data_mut::<f32>().map_err(ExtractorError::inference)?;
        if tensor_data.len() != input_data.len() {
            return Err(ExtractorError::Inference(format!(
                "input tensor holds {} values, batch has {}",
                tensor_data.len(),
                input_data.len()
            )));
        }
        tensor_data.copy_from_slice(input_data);

        self.request.set_input_tensor(&input).map_err(ExtractorError::inference)?;
        self.request.infer().map_err(ExtractorError::inference)?;

        let mut results = Vec::with_capacity(self.outputs.len());
        for name in &self.outputs {
            let output = self.request.get_tensor(name).map_err(ExtractorError::inference)?;
            let data = output.get_data::<f32>().map_err(ExtractorError::inference)?;
            if rows == 0 || data.len() % rows != 0 {
                return Err(ExtractorError::Inference(format!(
                    "output {name} has {} values, not divisible into {rows} rows",
                    data.len()
                )));
            }
            let dim = data.len() / rows;
            let features = Array2::from_shape_vec((rows, dim), data.to_vec()).map_err(ExtractorError::inference)?;
            results.push(features);
        }

        Ok(results)
    }
}
