use image::{RgbImage, imageops::{self, FilterType}};
use ndarray::Array2;

use crate::{error::{ForensicsError, Result}, image_utils::{gray_to_array, rgb_to_gray}};

const SAMPLE_SIZE: usize = 32;
const HASH_SIZE: usize = 8;

/// DCT based perceptual hash. Visually similar images produce hashes with a
/// small Hamming distance.
pub struct PerceptualHasher {
    dct_matrix: Array2<f64>,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        Self { dct_matrix: Self::compute_dct_matrix(SAMPLE_SIZE) }
    }

    /// Unnormalized DCT-II basis, `2 * cos(pi * k * (2n + 1) / 2N)`.
    fn compute_dct_matrix(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, n), |(k, j)| {
            2.0 * (std::f64::consts::PI * k as f64 * (2.0 * j as f64 + 1.0) / (2.0 * n as f64)).cos()
        })
    }

    pub fn hash(&self, image: &RgbImage) -> Result<String> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ForensicsError::ImageTooSmall(1));
        }

        let small = imageops::resize(image, SAMPLE_SIZE as u32, SAMPLE_SIZE as u32, FilterType::Lanczos3);
        let pixels = gray_to_array(&rgb_to_gray(&small));

        let dct = self.dct_matrix.dot(&pixels).dot(&self.dct_matrix.t());
        let low_freq = dct.slice(ndarray::s![..HASH_SIZE, ..HASH_SIZE]);

        let mut sorted = low_freq.iter().cloned().collect::<Vec<_>>();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

        let bits = low_freq
            .iter()
            .fold(0u64, |acc, &v| (acc << 1) | (v > median) as u64);

        Ok(format!("{:016x}", bits))
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

pub fn hamming_distance(a: &str, b: &str) -> Result<u32> {
    if a.len() != b.len() {
        return Err(ForensicsError::InvalidParameter(format!(
            "Hash length mismatch: {} vs {}", a.len(), b.len()
        )));
    }

    let parse = |h: &str| {
        u64::from_str_radix(h, 16)
            .map_err(|e| ForensicsError::InvalidParameter(format!("Invalid hash {}: {}", h, e)))
    };

    Ok((parse(a)? ^ parse(b)?).count_ones())
}
