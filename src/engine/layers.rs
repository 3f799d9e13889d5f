//! Output layer selection

use crate::error::{ExtractorError, Result};

/// Split a comma separated layer list. Whitespace around names is ignored;
/// an all-blank string yields no names (the model defaults).
pub fn split_layer_names(spec: &str) -> Result<Vec<String>> {
    if spec.trim().is_empty() {
        return Ok(Vec::new());
    }

    let names: Vec<String> = spec.split(',').map(|name| name.trim().to_string()).collect();
    if names.iter().any(|name| name.is_empty()) {
        return Err(ExtractorError::feature_layer(format!(
            "layer names must be separated by single commas, got \"{spec}\""
        )));
    }
    Ok(names)
}

/// Resolves requested layer names against what the loaded model can produce
#[derive(Debug, Clone)]
pub struct LayerSelector {
    available: Vec<String>,
    native_outputs: Vec<String>,
}

impl LayerSelector {
    pub fn new(available: Vec<String>, native_outputs: Vec<String>) -> Self {
        Self {
            available,
            native_outputs,
        }
    }

    /// Every layer name the model graph exposes, in graph order
    pub fn available(&self) -> &[String] {
        &self.available
    }

    /// The model's default outputs
    pub fn native_outputs(&self) -> &[String] {
        &self.native_outputs
    }

    /// Resolve a request. Empty means the default outputs in model order;
    /// otherwise the caller's order is kept and every name is checked.
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Ok(self.native_outputs.clone());
        }

        let mut resolved: Vec<String> = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.as_ref();
            if !self.available.iter().any(|layer| layer == name) {
                return Err(ExtractorError::feature_layer(format!(
                    "invalid feature layer name: {name}"
                )));
            }
            if resolved.iter().any(|layer| layer == name) {
                return Err(ExtractorError::feature_layer(format!(
                    "feature layer requested twice: {name}"
                )));
            }
            resolved.push(name.to_string());
        }
        Ok(resolved)
    }

    /// Resolve a comma separated request string
    pub fn resolve_spec(&self, spec: &str) -> Result<Vec<String>> {
        self.resolve(&split_layer_names(spec)?)
    }
}
