//! Extraction results

use ndarray::{Array1, Array2, Axis};

use crate::error::{ExtractorError, Result};

/// Per-layer embeddings, one per extracted image, in load order.
/// Layers keep the order they were bound in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureResult {
    layers: Vec<(String, Vec<Array1<f32>>)>,
}

impl FeatureResult {
    /// Empty result with one (empty) entry per layer
    pub fn with_layers<S: AsRef<str>>(layers: &[S]) -> Self {
        Self {
            layers: layers
                .iter()
                .map(|name| (name.as_ref().to_string(), Vec::new()))
                .collect(),
        }
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(name, _)| name.as_str())
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Number of images covered (all layers hold the same count)
    pub fn num_images(&self) -> usize {
        self.layers.first().map(|(_, v)| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_images() == 0
    }

    pub fn get(&self, layer: &str) -> Option<&[Array1<f32>]> {
        self.layers
            .iter()
            .find(|(name, _)| name == layer)
            .map(|(_, features)| features.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Array1<f32>])> {
        self.layers.iter().map(|(name, v)| (name.as_str(), v.as_slice()))
    }

    /// Embedding of one layer for the image at `index`
    pub fn feature(&self, layer: &str, index: usize) -> Option<&Array1<f32>> {
        self.get(layer).and_then(|features| features.get(index))
    }

    /// Stack a layer's embeddings into an (images, dim) matrix
    pub fn matrix(&self, layer: &str) -> Option<Array2<f32>> {
        let features = self.get(layer)?;
        let views: Vec<_> = features.iter().map(|f| f.view()).collect();
        ndarray::stack(Axis(0), &views).ok()
    }

    pub(crate) fn push(&mut self, layer_index: usize, feature: Array1<f32>) {
        self.layers[layer_index].1.push(feature);
    }

    /// Append another result with the same layers, keeping image order
    pub fn extend(&mut self, other: FeatureResult) -> Result<()> {
        if self.layers.len() != other.layers.len()
            || self.layer_names().zip(other.layer_names()).any(|(a, b)| a != b)
        {
            return Err(ExtractorError::extraction(format!(
                "cannot merge results for layers {:?} into {:?}",
                other.layer_names().collect::<Vec<_>>(),
                self.layer_names().collect::<Vec<_>>()
            )));
        }

        for ((_, mine), (_, theirs)) in self.layers.iter_mut().zip(other.layers) {
            mine.extend(theirs);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_extend_keeps_order() {
        let mut a = FeatureResult::with_layers(&["fc1", "fc5"]);
        a.push(0, array![1.0]);
        a.push(1, array![10.0, 11.0]);

        let mut b = FeatureResult::with_layers(&["fc1", "fc5"]);
        b.push(0, array![2.0]);
        b.push(1, array![20.0, 21.0]);

        a.extend(b).unwrap();
        assert_eq!(a.num_images(), 2);
        assert_eq!(a.feature("fc1", 1), Some(&array![2.0]));
        assert_eq!(a.matrix("fc5").unwrap(), array![[10.0, 11.0], [20.0, 21.0]]);
    }

    #[test]
    fn test_extend_rejects_other_layers() {
        let mut a = FeatureResult::with_layers(&["fc1"]);
        let b = FeatureResult::with_layers(&["fc5"]);
        assert!(matches!(a.extend(b), Err(ExtractorError::Extraction(_))));
    }

    #[test]
    fn test_layer_order() {
        let result = FeatureResult::with_layers(&["z", "a"]);
        assert_eq!(result.layer_names().collect::<Vec<_>>(), vec!["z", "a"]);
        assert!(result.is_empty());
        assert!(result.get("missing").is_none());
    }
}
