use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, RgbImage, imageops::{self, FilterType}};
use ndarray::{Array2, Array4};

use crate::Normalization;

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum =
            (0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64) as u8;
        gray.put_pixel(x, y, Luma([lum]));
    }

    gray
}

pub fn gray_to_array(image: &GrayImage) -> Array2<f64> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0] as f64;
    }

    arr
}

/// Per-channel absolute difference of two equally sized images.
pub fn abs_difference(a: &RgbImage, b: &RgbImage) -> RgbImage {
    let (width, height) = a.dimensions();
    let mut diff = RgbImage::new(width, height);

    for (x, y, pixel) in diff.enumerate_pixels_mut() {
        let pa = a.get_pixel(x, y);
        let pb = b.get_pixel(x, y);
        for c in 0..3 {
            pixel[c] = pa[c].abs_diff(pb[c]);
        }
    }

    diff
}

pub fn mean_intensity(image: &GrayImage) -> f64 {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return 0.0;
    }
    image.pixels().map(|p| p[0] as f64).sum::<f64>() / count as f64
}

/// Resizes to `size`x`size` and lays the pixels out as a `[1, 3, size, size]`
/// tensor normalized per channel.
pub fn to_input_tensor(image: &RgbImage, size: u32, normalization: Normalization) -> Array4<f32> {
    let resized = imageops::resize(image, size, size, FilterType::Triangle);
    let (mean, std) = normalization.mean_std();
    let mut tensor = Array4::zeros((1, 3, size as usize, size as usize));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - mean[c]) / std[c];
        }
    }

    tensor
}

/// `dir/photo.png` + `"ela"` -> `dir/photo_ela.png`
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_abs_difference_is_symmetric() {
        let a = RgbImage::from_pixel(2, 2, Rgb([10, 200, 30]));
        let b = RgbImage::from_pixel(2, 2, Rgb([20, 100, 30]));

        assert_eq!(abs_difference(&a, &b), abs_difference(&b, &a));
        assert_eq!(abs_difference(&a, &b).get_pixel(1, 1), &Rgb([10, 100, 0]));
    }

    #[test]
    fn test_input_tensor_shape_and_normalization() {
        let image = RgbImage::from_pixel(40, 20, Rgb([255, 0, 127]));
        let tensor = to_input_tensor(&image, 8, Normalization::Symmetric);

        assert_eq!(tensor.dim(), (1, 3, 8, 8));
        assert!((tensor[[0, 0, 3, 3]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 3, 3]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling_path(Path::new("out/abc_heatmap.png"), "ela"),
            PathBuf::from("out/abc_heatmap_ela.png")
        );
        assert_eq!(sibling_path(Path::new("heat"), "ela"), PathBuf::from("heat_ela"));
    }
}
