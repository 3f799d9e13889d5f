//! Inference runtime interface
//!
//! The network runtime is an external collaborator. An [`InferenceEngine`]
//! knows which layers a loaded checkpoint can produce and compiles a
//! [`BoundGraph`] for a chosen output set and input shape. Rebinding never
//! mutates a graph in place: [`ModelHandle::rebind`] builds a fresh graph and
//! swaps it in only once it exists.

use std::time::Instant;

use ndarray::{Array2, ArrayView4};
use tracing::info;

use super::layers::LayerSelector;
use crate::error::{ExtractorError, Result};

/// A loaded checkpoint that can be bound to output layer sets
pub trait InferenceEngine {
    type Graph: BoundGraph;

    /// All layer names in the model graph, in graph order
    fn available_layers(&self) -> Vec<String>;

    /// The model's default outputs, in model order
    fn native_outputs(&self) -> Vec<String>;

    /// Build an executable graph producing exactly `layers`, in that order,
    /// for inputs of shape `input_shape` (rows, 3, H, W).
    fn bind(&mut self, layers: &[String], input_shape: [usize; 4]) -> Result<Self::Graph>;
}

/// An executable graph bound to one output set and one input shape
pub trait BoundGraph {
    /// Run a forward pass. Returns one (rows, dim) tensor per bound layer,
    /// in bound order.
    fn forward(&mut self, batch: ArrayView4<'_, f32>) -> Result<Vec<Array2<f32>>>;
}

/// Loaded model plus its currently bound output layers and graph
pub struct ModelHandle<E: InferenceEngine> {
    engine: E,
    selector: LayerSelector,
    bound: Vec<String>,
    graph: E::Graph,
    input_shape: [usize; 4],
}

impl<E: InferenceEngine> ModelHandle<E> {
    /// Resolve the initial layer request and bind the first graph
    pub fn new<S: AsRef<str>>(mut engine: E, requested: &[S], input_shape: [usize; 4]) -> Result<Self> {
        let native = engine.native_outputs();
        if native.is_empty() {
            return Err(ExtractorError::init("model declares no outputs"));
        }
        let available = engine.available_layers();
        info!("Model exposes {} layers: {:?}", available.len(), available);

        let selector = LayerSelector::new(available, native);
        let bound = selector.resolve(requested)?;
        let graph = bind_logged(&mut engine, &bound, input_shape)?;

        Ok(Self {
            engine,
            selector,
            bound,
            graph,
            input_shape,
        })
    }

    /// Resolve a new layer request and replace the bound graph. On failure the
    /// previous binding stays in place.
    pub fn rebind<S: AsRef<str>>(&mut self, requested: &[S]) -> Result<()> {
        let layers = self.selector.resolve(requested)?;
        let graph = bind_logged(&mut self.engine, &layers, self.input_shape)?;
        self.graph = graph;
        self.bound = layers;
        Ok(())
    }

    /// Currently bound output layers; output tensors follow this order
    pub fn bound_layers(&self) -> &[String] {
        &self.bound
    }

    pub fn selector(&self) -> &LayerSelector {
        &self.selector
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    /// Forward pass with output count and row count checked
    pub fn forward(&mut self, batch: ArrayView4<'_, f32>) -> Result<Vec<Array2<f32>>> {
        let outputs = self.graph.forward(batch)?;

        if outputs.len() != self.bound.len() {
            return Err(ExtractorError::Inference(format!(
                "graph returned {} outputs for {} bound layers",
                outputs.len(),
                self.bound.len()
            )));
        }
        for (layer, output) in self.bound.iter().zip(&outputs) {
            if output.nrows() != self.input_shape[0] {
                return Err(ExtractorError::Inference(format!(
                    "layer {layer} returned {} rows, expected {}",
                    output.nrows(),
                    self.input_shape[0]
                )));
            }
        }
        Ok(outputs)
    }
}

fn bind_logged<E: InferenceEngine>(engine: &mut E, layers: &[String], input_shape: [usize; 4]) -> Result<E::Graph> {
    let start = Instant::now();
    let graph = engine.bind(layers, input_shape)?;
    info!("Bound output layers {:?} for input {:?} in {:?}", layers, input_shape, start.elapsed());
    Ok(graph)
}
