//! Deterministic stand-in for the inference runtime.
//!
//! Every layer is a simple function of one input row so expected features can
//! be computed by hand:
//! - `data`:    the flattened row
//! - `conv1`:   per-channel mean
//! - `fc1`:     per-channel sum plus a column-weighted sum of channel 0
//! - `fc5`:     channel 0 at the top-left and top-right pixels
//! - `softmax`: softmax over `fc5`

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use facefeat::engine::{BoundGraph, InferenceEngine};
use facefeat::{ExtractorConfig, ExtractorError, FeatureExtractor, Result};
use ndarray::{s, Array1, Array2, Array3, ArrayView3, ArrayView4, Axis};
use serde_json::{json, Value};

pub const AVAILABLE: [&str; 5] = ["data", "conv1", "fc1", "fc5", "softmax"];
pub const NATIVE: [&str; 2] = ["fc5", "softmax"];

#[derive(Clone, Default)]
pub struct Counters {
    pub binds: Rc<Cell<usize>>,
    pub forwards: Rc<Cell<usize>>,
    /// Forward pass number (1-based) that fails, if any
    pub fail_on_forward: Rc<Cell<Option<usize>>>,
}

pub struct MockEngine {
    pub counters: Counters,
}

impl MockEngine {
    pub fn new() -> (Self, Counters) {
        let counters = Counters::default();
        (
            Self {
                counters: counters.clone(),
            },
            counters,
        )
    }
}

impl InferenceEngine for MockEngine {
    type Graph = MockGraph;

    fn available_layers(&self) -> Vec<String> {
        AVAILABLE.iter().map(|s| s.to_string()).collect()
    }

    fn native_outputs(&self) -> Vec<String> {
        NATIVE.iter().map(|s| s.to_string()).collect()
    }

    fn bind(&mut self, layers: &[String], input_shape: [usize; 4]) -> Result<MockGraph> {
        self.counters.binds.set(self.counters.binds.get() + 1);
        Ok(MockGraph {
            layers: layers.to_vec(),
            input_shape,
            counters: self.counters.clone(),
        })
    }
}

pub struct MockGraph {
    layers: Vec<String>,
    input_shape: [usize; 4],
    counters: Counters,
}

impl BoundGraph for MockGraph {
    fn forward(&mut self, batch: ArrayView4<'_, f32>) -> Result<Vec<Array2<f32>>> {
        let count = self.counters.forwards.get() + 1;
        self.counters.forwards.set(count);
        if self.counters.fail_on_forward.get() == Some(count) {
            return Err(ExtractorError::Inference("device lost".into()));
        }

        let shape = batch.shape();
        if shape != &self.input_shape[..] {
            return Err(ExtractorError::Inference(format!(
                "bound for {:?}, got {:?}",
                self.input_shape, shape
            )));
        }

        Ok(self
            .layers
            .iter()
            .map(|layer| {
                let rows: Vec<Array1<f32>> = batch
                    .axis_iter(Axis(0))
                    .map(|row| layer_output(layer, row))
                    .collect();
                let views: Vec<_> = rows.iter().map(|r| r.view()).collect();
                ndarray::stack(Axis(0), &views).unwrap()
            })
            .collect())
    }
}

/// Native output of `layer` for one (3, H, W) input row
pub fn layer_output(layer: &str, row: ArrayView3<'_, f32>) -> Array1<f32> {
    let width = row.dim().2;
    match layer {
        "data" => row.iter().copied().collect(),
        "conv1" => row.axis_iter(Axis(0)).map(|c| c.mean().unwrap()).collect(),
        "fc1" => {
            let mut out: Vec<f32> = row.axis_iter(Axis(0)).map(|c| c.sum()).collect();
            let weighted: f32 = row
                .slice(s![0, .., ..])
                .indexed_iter()
                .map(|((_, x), v)| (x + 1usize) as f32 * v)
                .sum();
            out.push(weighted);
            Array1::from(out)
        }
        "fc5" => Array1::from(vec![row[[0, 0, 0]], row[[0, 0, width - 1]]]),
        "softmax" => {
            let logits = layer_output("fc5", row);
            let max = logits.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let exp = logits.mapv(|v| (v - max).exp());
            let sum = exp.sum();
            exp / sum
        }
        other => panic!("mock has no layer {other}"),
    }
}

/// Config for a 4x6 input, CPU; `extra` holds JSON fields that override
/// the defaults
pub fn config(extra: &str) -> ExtractorConfig {
    let mut body = json!({
        "network_model": "mock,0",
        "feature_layer": "",
        "cpu_only": 1,
        "input_height": 4,
        "input_width": 6,
    });
    let overrides: Value = serde_json::from_str(&format!("{{{extra}}}")).unwrap();
    if let (Some(body), Value::Object(overrides)) = (body.as_object_mut(), overrides) {
        body.extend(overrides);
    }
    ExtractorConfig::from_json_str(&body.to_string()).unwrap()
}

pub fn extractor(extra: &str) -> (FeatureExtractor<MockEngine>, Counters) {
    let (engine, counters) = MockEngine::new();
    let extractor = FeatureExtractor::with_engine(config(extra), engine).unwrap();
    (extractor, counters)
}

/// Deterministic 4x6 BGR image; `seed` shifts every pixel
pub fn image(seed: u8) -> Array3<u8> {
    Array3::from_shape_fn((4, 6, 3), |(y, x, c)| {
        seed.wrapping_mul(7)
            .wrapping_add((y * 13 + x * 5 + c * 31) as u8)
    })
}

pub fn images(n: usize) -> Vec<Array3<u8>> {
    (0..n).map(|i| image(i as u8 + 1)).collect()
}

pub fn assert_close(a: &Array1<f32>, b: &Array1<f32>) {
    assert_eq!(a.len(), b.len(), "length mismatch: {a} vs {b}");
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-4, "{a} != {b}");
    }
}
