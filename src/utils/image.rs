//! Image and image-list loading

use std::path::{Path, PathBuf};

use ndarray::Array3;

use crate::engine::preprocess::RawImage;
use crate::error::{ExtractorError, Result};

/// Decode an image file into an H x W x C array.
///
/// Colour images come back with 3 channels in BGR order; with `as_grey`
/// the result is a single luminance channel.
pub fn read_image(path: impl AsRef<Path>, as_grey: bool) -> Result<RawImage> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| ExtractorError::Image {
        path: path.to_path_buf(),
        source,
    })?;

    if as_grey {
        let grey = img.to_luma8();
        let (width, height) = grey.dimensions();
        Array3::from_shape_vec((height as usize, width as usize, 1), grey.into_raw())
            .map_err(|e| ExtractorError::load_data(format!("{}: {e}", path.display())))
    } else {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
            rgb.get_pixel(x as u32, y as u32)[2 - c]
        }))
    }
}

/// Read an image list file: first whitespace separated token of each line,
/// skipping blank lines and `#` comments.
pub fn load_image_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect())
}

/// Join an image path onto an optional root directory
pub fn resolve_image_path(root: Option<&Path>, path: impl AsRef<Path>) -> PathBuf {
    match root {
        Some(root) => root.join(path),
        None => path.as_ref().to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_read_image_is_bgr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([10, 20, 30]));
        img.save(&path).unwrap();

        let raw = read_image(&path, false).unwrap();
        assert_eq!(raw.dim(), (2, 3, 3));
        assert_eq!([raw[[1, 2, 0]], raw[[1, 2, 1]], raw[[1, 2, 2]]], [30, 20, 10]);
    }

    #[test]
    fn test_read_image_grey() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grey.png");
        let mut img = GrayImage::new(4, 4);
        img.put_pixel(1, 3, Luma([77]));
        img.save(&path).unwrap();

        let raw = read_image(&path, true).unwrap();
        assert_eq!(raw.dim(), (4, 4, 1));
        assert_eq!(raw[[3, 1, 0]], 77);
    }

    #[test]
    fn test_read_missing_image() {
        let err = read_image("/nonexistent/face.jpg", false).unwrap_err();
        assert!(err.is_load_error());
    }

    #[test]
    fn test_load_image_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "# header\na/1.jpg 0\n\nb/2.jpg\n  c/3.png  7 extra\n").unwrap();
        assert_eq!(load_image_list(&path).unwrap(), vec!["a/1.jpg", "b/2.jpg", "c/3.png"]);
    }

    #[test]
    fn test_resolve_image_path() {
        assert_eq!(resolve_image_path(Some(Path::new("/data")), "a/1.jpg"), PathBuf::from("/data/a/1.jpg"));
        assert_eq!(resolve_image_path(None, "a/1.jpg"), PathBuf::from("a/1.jpg"));
    }
}
