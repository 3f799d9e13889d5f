//! Feature extractor configuration
//!
//! The on-disk document is loosely typed (numbers may be strings, flags may be
//! integers). [`RawConfig`] captures it as written and
//! [`ExtractorConfig::from_raw`] validates it into an immutable typed config.
//! Every check happens here, before any model is loaded.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array3, ArrayD, Ix1, Ix3};
use serde::Deserialize;
use tracing::info;

use crate::error::{ExtractorError, Result};

/// How the embedding of an image is combined with the embedding of its
/// horizontally flipped copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorMode {
    #[default]
    None,
    Average,
    Max,
    Concat,
}

impl MirrorMode {
    /// Map the integer `mirror_trick` code (0..=3)
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Average),
            2 => Ok(Self::Max),
            3 => Ok(Self::Concat),
            other => Err(ExtractorError::init(format!(
                "\"mirror_trick\" must be one of [0, 1, 2, 3], got {other}"
            ))),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::None => 0,
            Self::Average => 1,
            Self::Max => 2,
            Self::Concat => 3,
        }
    }

    /// Whether flipped copies are written to the batch buffer
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Output width of a fused embedding given the layer's native width
    pub fn fused_dim(&self, native_dim: usize) -> usize {
        match self {
            Self::Concat => native_dim * 2,
            _ => native_dim,
        }
    }
}

/// Compute device for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu(u32),
}

impl Device {
    /// Device name understood by OpenVINO
    pub fn as_openvino_name(&self) -> String {
        match self {
            Device::Cpu => "CPU".to_string(),
            Device::Gpu(id) => format!("GPU.{id}"),
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(id) => write!(f, "gpu:{id}"),
        }
    }
}

/// Checkpoint identifier parsed from `"<prefix>,<epoch>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub prefix: String,
    pub epoch: u32,
}

impl ModelSpec {
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(',');
        let prefix = parts.next().map(str::trim).unwrap_or_default();
        let epoch = parts.next().map(str::trim);

        let (prefix, epoch) = match epoch {
            Some(epoch) if !prefix.is_empty() => (prefix, epoch),
            _ => {
                return Err(ExtractorError::init(format!(
                    "network_model must be in the form of \"prefix,epoch\", got \"{value}\""
                )))
            }
        };

        let epoch = epoch.parse::<u32>().map_err(|_| {
            ExtractorError::init(format!("invalid epoch \"{epoch}\" in network_model"))
        })?;

        Ok(Self {
            prefix: prefix.to_string(),
            epoch,
        })
    }

    /// Graph description and weights files for this checkpoint
    pub fn checkpoint_files(&self) -> (PathBuf, PathBuf) {
        let stem = format!("{}-{:04}", self.prefix, self.epoch);
        (
            PathBuf::from(format!("{stem}.xml")),
            PathBuf::from(format!("{stem}.bin")),
        )
    }
}

/// Mean subtracted from every image before scaling
#[derive(Debug, Clone, PartialEq)]
pub enum Mean {
    /// One value per channel, broadcast over H x W
    PerChannel([f32; 3]),
    /// Full H x W x 3 mean image
    Full(Array3<f32>),
}

/// Validated, immutable extractor configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    pub network_model: ModelSpec,
    /// Requested output layers; empty means the model's default outputs
    pub feature_layers: Vec<String>,
    pub batch_size: usize,
    pub input_width: usize,
    pub input_height: usize,
    pub input_scale: f32,
    pub channel_swap: [usize; 3],
    pub image_as_grey: bool,
    pub mirror_trick: MirrorMode,
    pub normalize_output: bool,
    pub data_mean: Option<Mean>,
    pub device: Device,
}

impl ExtractorConfig {
    /// Load a JSON (`.json`) or TOML (anything else) config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExtractorError::init(format!("failed to read config {}: {e}", path.display()))
        })?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(content)
            .map_err(|e| ExtractorError::init(format!("malformed JSON config: {e}")))?;
        Self::from_raw(raw)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| ExtractorError::init(format!("malformed TOML config: {e}")))?;
        Self::from_raw(raw)
    }

    /// Validate a raw document. Defaults follow the reference extractor:
    /// batch 1, 112x112 input, scale 1.0, identity channel order, no mirror
    /// trick, no output normalization, GPU 0 unless `cpu_only`.
    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let network_model = raw
            .network_model
            .ok_or_else(|| ExtractorError::init("missing \"network_model\""))?;
        let network_model = ModelSpec::parse(&network_model)?;

        let feature_layers = match raw.feature_layer {
            Some(spec) => spec.into_names()?,
            None => return Err(ExtractorError::init("missing \"feature_layer\"")),
        };

        // Checked before anything touches the model.
        let mirror_trick = match raw.mirror_trick {
            Some(code) => MirrorMode::from_code(code.to_i64("mirror_trick")?)?,
            None => MirrorMode::None,
        };

        let batch_size = positive(raw.batch_size, "batch_size", 1)?;
        let input_width = positive(raw.input_width, "input_width", 112)?;
        let input_height = positive(raw.input_height, "input_height", 112)?;

        let input_scale = match raw.input_scale {
            Some(scale) => scale.to_f32("input_scale")?,
            None => 1.0,
        };

        let channel_swap = match raw.channel_swap {
            Some(swap) => swap.into_permutation()?,
            None => [0, 1, 2],
        };

        let data_mean = match raw.data_mean {
            Some(source) => source.load(input_height, input_width)?,
            None => None,
        };

        let cpu_only = raw.cpu_only.map(|b| b.is_set()).unwrap_or(false);
        let gpu_id = match raw.gpu_id {
            Some(id) => id.to_i64("gpu_id")?,
            None => 0,
        };
        let device = if !cpu_only && gpu_id >= 0 {
            let id = u32::try_from(gpu_id)
                .map_err(|_| ExtractorError::init(format!("gpu_id {gpu_id} out of range")))?;
            Device::Gpu(id)
        } else {
            Device::Cpu
        };

        Ok(Self {
            network_model,
            feature_layers,
            batch_size,
            input_width,
            input_height,
            input_scale,
            channel_swap,
            image_as_grey: raw.image_as_grey.map(|b| b.is_set()).unwrap_or(false),
            mirror_trick,
            normalize_output: raw.normalize_output.map(|b| b.is_set()).unwrap_or(false),
            data_mean,
            device,
        })
    }

    /// Rows of the network input: B, or 2B with the mirror trick
    pub fn effective_batch_size(&self) -> usize {
        if self.mirror_trick.is_enabled() {
            self.batch_size * 2
        } else {
            self.batch_size
        }
    }

    /// Network input shape (rows, 3, H, W)
    pub fn input_batch_shape(&self) -> [usize; 4] {
        [
            self.effective_batch_size(),
            3,
            self.input_height,
            self.input_width,
        ]
    }
}

fn positive(value: Option<IntLike>, key: &str, default: usize) -> Result<usize> {
    let Some(value) = value else {
        return Ok(default);
    };
    let n = value.to_i64(key)?;
    if n < 1 {
        return Err(ExtractorError::init(format!("\"{key}\" must be >= 1, got {n}")));
    }
    Ok(n as usize)
}

/// Configuration document as written on disk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    pub network_model: Option<String>,
    pub feature_layer: Option<LayerSpec>,
    pub batch_size: Option<IntLike>,
    pub input_width: Option<IntLike>,
    pub input_height: Option<IntLike>,
    pub input_scale: Option<FloatLike>,
    pub channel_swap: Option<ChannelSwap>,
    pub image_as_grey: Option<BoolLike>,
    pub mirror_trick: Option<IntLike>,
    pub normalize_output: Option<BoolLike>,
    pub data_mean: Option<MeanSource>,
    pub cpu_only: Option<BoolLike>,
    pub gpu_id: Option<IntLike>,
}

/// Flag accepting `true`, `1`, `"yes"` and friends
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BoolLike {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl BoolLike {
    /// Any nonzero number or affirmative string enables the flag
    pub fn is_set(&self) -> bool {
        match self {
            BoolLike::Bool(b) => *b,
            BoolLike::Int(i) => *i != 0,
            BoolLike::Float(f) => *f != 0.0,
            BoolLike::Text(s) => {
                let s = s.trim().to_ascii_lowercase();
                match s.as_str() {
                    "true" | "yes" | "on" => true,
                    _ => s.parse::<f64>().map(|v| v != 0.0).unwrap_or(false),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IntLike {
    Int(i64),
    Text(String),
}

impl IntLike {
    fn to_i64(&self, key: &str) -> Result<i64> {
        match self {
            IntLike::Int(i) => Ok(*i),
            IntLike::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ExtractorError::init(format!("\"{key}\" must be an integer, got \"{s}\""))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FloatLike {
    Float(f64),
    Text(String),
}

impl FloatLike {
    fn to_f32(&self, key: &str) -> Result<f32> {
        match self {
            FloatLike::Float(f) => Ok(*f as f32),
            FloatLike::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ExtractorError::init(format!("\"{key}\" must be a number, got \"{s}\""))),
        }
    }
}

/// `feature_layer`: comma separated string or list of names
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LayerSpec {
    List(Vec<String>),
    Text(String),
}

impl LayerSpec {
    fn into_names(self) -> Result<Vec<String>> {
        let names = match self {
            LayerSpec::List(names) => names,
            LayerSpec::Text(text) => return crate::engine::layers::split_layer_names(&text),
        };
        let names: Vec<String> = names.into_iter().map(|n| n.trim().to_string()).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(ExtractorError::feature_layer("empty layer name in \"feature_layer\""));
        }
        Ok(names)
    }
}

/// `channel_swap`: `"2,1,0"` or `[2, 1, 0]`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChannelSwap {
    List(Vec<i64>),
    Text(String),
}

impl ChannelSwap {
    fn into_permutation(self) -> Result<[usize; 3]> {
        let values: Vec<i64> = match self {
            ChannelSwap::List(values) => values,
            ChannelSwap::Text(text) => text
                .split(',')
                .map(|v| v.trim().parse::<i64>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| {
                    ExtractorError::init(format!("\"channel_swap\" must be 3 comma separated integers, got \"{text}\""))
                })?,
        };

        let mut perm = [0usize; 3];
        let mut seen = [false; 3];
        if values.len() != 3 {
            return Err(ExtractorError::init(format!(
                "\"channel_swap\" needs exactly 3 entries, got {}",
                values.len()
            )));
        }
        for (slot, &v) in perm.iter_mut().zip(values.iter()) {
            if !(0..3).contains(&v) || seen[v as usize] {
                return Err(ExtractorError::init(format!(
                    "\"channel_swap\" must be a permutation of 0,1,2, got {values:?}"
                )));
            }
            seen[v as usize] = true;
            *slot = v as usize;
        }
        Ok(perm)
    }
}

/// `data_mean`: path to a `.npy` array or a literal list of 3 floats
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MeanSource {
    Values(Vec<f32>),
    Path(String),
}

impl MeanSource {
    fn load(self, height: usize, width: usize) -> Result<Option<Mean>> {
        match self {
            MeanSource::Values(values) => match values.as_slice() {
                [] => Ok(None),
                &[b, g, r] => Ok(Some(Mean::PerChannel([b, g, r]))),
                _ => Err(ExtractorError::init(format!(
                    "literal \"data_mean\" needs 3 values, got {}",
                    values.len()
                ))),
            },
            MeanSource::Path(path) if path.trim().is_empty() => Ok(None),
            MeanSource::Path(path) if path.ends_with(".npy") => {
                load_mean_file(Path::new(&path), height, width).map(Some)
            }
            MeanSource::Path(path) => Err(ExtractorError::init(format!(
                "data_mean must be a valid path to .npy or a list of 3 floats, got \"{path}\""
            ))),
        }
    }
}

fn mean_error(path: &Path, err: impl std::fmt::Display) -> ExtractorError {
    ExtractorError::init(format!("failed to load \"data_mean\" {}: {err}", path.display()))
}

fn load_mean_file(path: &Path, height: usize, width: usize) -> Result<Mean> {
    let array: ArrayD<f32> = match ndarray_npy::read_npy::<_, ArrayD<f32>>(path) {
        Ok(array) => array,
        Err(_) => ndarray_npy::read_npy::<_, ArrayD<f64>>(path)
            .map_err(|e| mean_error(path, e))?
            .mapv(|v| v as f32),
    };

    match array.ndim() {
        1 => {
            let values: Array1<f32> = array.into_dimensionality::<Ix1>().map_err(|e| mean_error(path, e))?;
            match values.as_slice() {
                Some(&[b, g, r]) => Ok(Mean::PerChannel([b, g, r])),
                _ => Err(ExtractorError::init(format!(
                    "mean vector in {} must have 3 values, got {}",
                    path.display(),
                    values.len()
                ))),
            }
        }
        3 => {
            let full: Array3<f32> = array.into_dimensionality::<Ix3>().map_err(|e| mean_error(path, e))?;
            if full.dim() != (height, width, 3) {
                return Err(ExtractorError::init(format!(
                    "mean array in {} has shape {:?}, expected ({height}, {width}, 3)",
                    path.display(),
                    full.shape()
                )));
            }
            Ok(Mean::Full(full))
        }
        n => Err(ExtractorError::init(format!(
            "mean array in {} must be 1-D or 3-D, got {n}-D",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(body: &str) -> Result<ExtractorConfig> {
        ExtractorConfig::from_json_str(body)
    }

    #[test]
    fn test_defaults() {
        let config = json(r#"{"network_model": "models/r100,0", "feature_layer": ""}"#).unwrap();
        assert_eq!(config.network_model.prefix, "models/r100");
        assert_eq!(config.network_model.epoch, 0);
        assert!(config.feature_layers.is_empty());
        assert_eq!(config.batch_size, 1);
        assert_eq!((config.input_height, config.input_width), (112, 112));
        assert_eq!(config.channel_swap, [0, 1, 2]);
        assert_eq!(config.mirror_trick, MirrorMode::None);
        assert!(!config.normalize_output);
        assert_eq!(config.device, Device::Gpu(0));
        assert_eq!(config.input_batch_shape(), [1, 3, 112, 112]);
    }

    #[test]
    fn test_loose_types() {
        let config = json(
            r#"{
                "network_model": "m,3",
                "feature_layer": "fc1, fc5",
                "batch_size": "4",
                "input_scale": "0.0078125",
                "channel_swap": "2,1,0",
                "mirror_trick": "3",
                "normalize_output": 1,
                "cpu_only": "true",
                "data_mean": [127.5, 127.5, 127.5]
            }"#,
        )
        .unwrap();
        assert_eq!(config.feature_layers, vec!["fc1", "fc5"]);
        assert_eq!(config.batch_size, 4);
        assert!((config.input_scale - 0.0078125).abs() < 1e-9);
        assert_eq!(config.channel_swap, [2, 1, 0]);
        assert_eq!(config.mirror_trick, MirrorMode::Concat);
        assert!(config.normalize_output);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.data_mean, Some(Mean::PerChannel([127.5, 127.5, 127.5])));
        assert_eq!(config.input_batch_shape(), [8, 3, 112, 112]);
    }

    #[test]
    fn test_normalize_truthiness() {
        for (value, expected) in [("0", false), ("2", true), ("0.5", true), ("\"no\"", false), ("\"on\"", true)] {
            let body = format!(
                r#"{{"network_model": "m,1", "feature_layer": "", "normalize_output": {value}}}"#
            );
            assert_eq!(json(&body).unwrap().normalize_output, expected, "value {value}");
        }
    }

    #[test]
    fn test_invalid_mirror_trick() {
        let err = json(r#"{"network_model": "m,1", "feature_layer": "", "mirror_trick": 4}"#).unwrap_err();
        assert!(matches!(err, ExtractorError::Init(_)));
    }

    #[test]
    fn test_missing_required_keys() {
        assert!(matches!(json(r#"{"feature_layer": ""}"#), Err(ExtractorError::Init(_))));
        assert!(matches!(json(r#"{"network_model": "m,1"}"#), Err(ExtractorError::Init(_))));
    }

    #[test]
    fn test_bad_network_model() {
        assert!(ModelSpec::parse("prefix_only").is_err());
        assert!(ModelSpec::parse("prefix,abc").is_err());
        assert!(ModelSpec::parse(",3").is_err());
        let spec = ModelSpec::parse(" model/r50 , 12 ").unwrap();
        let (xml, bin) = spec.checkpoint_files();
        assert_eq!(xml, PathBuf::from("model/r50-0012.xml"));
        assert_eq!(bin, PathBuf::from("model/r50-0012.bin"));
    }

    #[test]
    fn test_bad_channel_swap() {
        for swap in ["\"0,1\"", "\"0,0,1\"", "[0, 1, 3]", "\"a,b,c\""] {
            let body = format!(r#"{{"network_model": "m,1", "feature_layer": "", "channel_swap": {swap}}}"#);
            assert!(matches!(json(&body), Err(ExtractorError::Init(_))), "swap {swap}");
        }
    }

    #[test]
    fn test_bad_batch_size() {
        let err = json(r#"{"network_model": "m,1", "feature_layer": "", "batch_size": 0}"#).unwrap_err();
        assert!(matches!(err, ExtractorError::Init(_)));
    }

    #[test]
    fn test_bad_mean_source() {
        let err = json(r#"{"network_model": "m,1", "feature_layer": "", "data_mean": "mean.txt"}"#).unwrap_err();
        assert!(matches!(err, ExtractorError::Init(_)));
        let err = json(r#"{"network_model": "m,1", "feature_layer": "", "data_mean": [1.0, 2.0]}"#).unwrap_err();
        assert!(matches!(err, ExtractorError::Init(_)));
    }

    #[test]
    fn test_mean_npy_shape_checked() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.npy");
        let bad = dir.path().join("bad.npy");
        ndarray_npy::write_npy(&good, &Array3::<f32>::from_elem((4, 5, 3), 1.0)).unwrap();
        ndarray_npy::write_npy(&bad, &Array3::<f32>::from_elem((5, 4, 3), 1.0)).unwrap();

        let body = |p: &Path| {
            format!(
                r#"{{"network_model": "m,1", "feature_layer": "", "input_height": 4, "input_width": 5, "data_mean": "{}"}}"#,
                p.display()
            )
        };
        let config = json(&body(&good)).unwrap();
        assert!(matches!(config.data_mean, Some(Mean::Full(ref m)) if m.dim() == (4, 5, 3)));
        assert!(matches!(json(&body(&bad)), Err(ExtractorError::Init(_))));
    }

    #[test]
    fn test_toml_config() {
        let config = ExtractorConfig::from_toml_str(
            r#"
            network_model = "models/r100,1"
            feature_layer = "fc1"
            batch_size = 8
            mirror_trick = 1
            gpu_id = -1
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.mirror_trick, MirrorMode::Average);
        assert_eq!(config.device, Device::Cpu);
    }
}
