//! Mirror-trick fusion and output normalization

use ndarray::{Array1, ArrayView1, Zip};

use crate::config::MirrorMode;
use crate::utils::math::l2_normalize;

/// Combine an embedding with its mirror per `mode`, then L2 normalize if
/// requested. Fusion always happens before normalization.
///
/// With `MirrorMode::None`, or when no mirror embedding is given, the
/// original passes through unchanged.
pub fn fuse(
    original: ArrayView1<'_, f32>,
    mirrored: Option<ArrayView1<'_, f32>>,
    mode: MirrorMode,
    normalize: bool,
) -> Array1<f32> {
    let mut embedding = match (mode, mirrored) {
        (MirrorMode::None, _) | (_, None) => original.to_owned(),
        (MirrorMode::Average, Some(flip)) => {
            Zip::from(original).and(flip).map_collect(|&a, &b| (a + b) * 0.5)
        }
        (MirrorMode::Max, Some(flip)) => Zip::from(original).and(flip).map_collect(|&a, &b| a.max(b)),
        (MirrorMode::Concat, Some(flip)) => original.iter().chain(flip.iter()).copied().collect(),
    };

    if normalize {
        if let Some(values) = embedding.as_slice_mut() {
            l2_normalize(values);
        }
    }

    embedding
}
