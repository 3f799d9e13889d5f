//! `.npy` file storage
//!
//! One file per (image, layer): `<root>/<image dir>/<image stem>_<layer>.npy`.

use std::path::{Component, Path, PathBuf};

use ndarray::ArrayView1;
use tracing::debug;

use super::traits::FeatureStore;
use crate::error::{ExtractorError, Result};

/// Writes embeddings as numpy arrays under a root directory
pub struct NpyFeatureStore {
    root: PathBuf,
}

impl NpyFeatureStore {
    /// Create a store, making sure the root directory exists
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Target file for an (image, layer) pair
    pub fn feature_path(&self, image: &str, layer: &str) -> PathBuf {
        let image = Path::new(image);
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let layer = layer.replace(['/', '\\'], "_");

        // plain directory names only; `..` and roots never leave `self.root`
        let mut dir = self.root.clone();
        if let Some(parent) = image.parent().filter(|p| p.is_relative()) {
            for component in parent.components() {
                if let Component::Normal(name) = component {
                    dir.push(name);
                }
            }
        }
        dir.join(format!("{stem}_{layer}.npy"))
    }
}

impl FeatureStore for NpyFeatureStore {
    fn save(&mut self, image: &str, layer: &str, feature: ArrayView1<'_, f32>) -> Result<PathBuf> {
        let path = self.feature_path(image, layer);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        ndarray_npy::write_npy(&path, &feature).map_err(|e| ExtractorError::Npy {
            path: path.clone(),
            message: e.to_string(),
        })?;
        debug!("Saved {} feature of {} to {}", layer, image, path.display());
        Ok(path)
    }
}
