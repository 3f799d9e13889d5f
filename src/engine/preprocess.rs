//! Image preprocessing for the feature network
//!
//! Turns a raw H' x W' x 3 pixel array into the 3 x H x W float tensor the
//! network consumes: resize, channel reorder, mean subtraction, scaling and
//! the final channel-first transpose, always in that order.

use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{s, Array3, ArrayView3, Axis, Zip};

use crate::config::{ExtractorConfig, Mean};
use crate::error::{ExtractorError, Result};

/// Decoded image, H x W x C, one byte per sample
pub type RawImage = Array3<u8>;

/// Per-image normalization into the network layout
#[derive(Debug, Clone)]
pub struct Preprocessor {
    height: usize,
    width: usize,
    channel_swap: [usize; 3],
    mean: Option<Mean>,
    scale: f32,
}

impl Preprocessor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            height: config.input_height,
            width: config.input_width,
            channel_swap: config.channel_swap,
            mean: config.data_mean.clone(),
            scale: config.input_scale,
        }
    }

    /// Output tensor shape (3, H, W)
    pub fn output_shape(&self) -> (usize, usize, usize) {
        (3, self.height, self.width)
    }

    /// Normalize one image. The input must have three channels; see
    /// [`to_three_channels`] for single channel images. A resize of any
    /// other channel count fails with a load error.
    pub fn preprocess(&self, image: ArrayView3<'_, u8>) -> Result<Array3<f32>> {
        let (height, width, _) = image.dim();
        let mut net_in = if height != self.height || width != self.width {
            resize(image, self.height, self.width)?.mapv(f32::from)
        } else {
            image.mapv(f32::from)
        };

        if self.channel_swap != [0, 1, 2] {
            net_in = net_in.select(Axis(2), &self.channel_swap);
        }

        match &self.mean {
            Some(Mean::PerChannel(mean)) => {
                for (c, m) in mean.iter().enumerate() {
                    net_in.index_axis_mut(Axis(2), c).mapv_inplace(|v| v - m);
                }
            }
            Some(Mean::Full(mean)) => net_in -= mean,
            None => {}
        }

        if self.scale != 1.0 {
            net_in *= self.scale;
        }

        Ok(net_in
            .permuted_axes([2, 0, 1])
            .as_standard_layout()
            .into_owned())
    }
}

/// Bring a 1 or 3 channel image to 3 channels; grey images are replicated.
pub fn to_three_channels(image: &RawImage) -> Result<Cow<'_, RawImage>> {
    match image.dim().2 {
        3 => Ok(Cow::Borrowed(image)),
        1 => {
            let grey = image.index_axis(Axis(2), 0);
            let (h, w) = grey.dim();
            let expanded = Array3::from_shape_fn((h, w, 3), |(y, x, _)| grey[[y, x]]);
            Ok(Cow::Owned(expanded))
        }
        n => Err(ExtractorError::load_data(format!(
            "image must have 1 or 3 channels, got {n}"
        ))),
    }
}

/// Bilinear resize of an H x W x 3 image to `height` x `width`
pub fn resize(image: ArrayView3<'_, u8>, height: usize, width: usize) -> Result<RawImage> {
    let (src_h, src_w, channels) = image.dim();
    if channels != 3 {
        return Err(ExtractorError::load_data(format!(
            "resize expects 3 channels, got {channels}"
        )));
    }
    let pixels: Vec<u8> = image.iter().copied().collect();
    let rgb = RgbImage::from_raw(src_w as u32, src_h as u32, pixels)
        .ok_or_else(|| ExtractorError::load_data(format!("cannot resize a {src_h}x{src_w} image")))?;

    let resized = imageops::resize(&rgb, width as u32, height as u32, FilterType::Triangle);
    Array3::from_shape_vec((height, width, 3), resized.into_raw())
        .map_err(|e| ExtractorError::load_data(format!("resized image has unexpected size: {e}")))
}

/// Reverse the width axis of a channel-first C x H x W tensor
pub fn flip_horizontal(tensor: ArrayView3<'_, f32>) -> Array3<f32> {
    tensor.slice(s![.., .., ..;-1]).to_owned()
}

/// Write the horizontal flip of `src` into `dst` without allocating
pub(crate) fn flip_horizontal_into(src: ArrayView3<'_, f32>, dst: ndarray::ArrayViewMut3<'_, f32>) {
    Zip::from(dst)
        .and(src.slice(s![.., .., ..;-1]))
        .for_each(|d, &s| *d = s);
}
