use std::{
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use image::{ImageReader, RgbImage, codecs::jpeg::JpegEncoder};
use imageproc::filter::gaussian_blur_f32;
use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::{
    TamperResult,
    error::{ForensicsError, Result},
    image_utils::{abs_difference, mean_intensity, rgb_to_gray},
};

/// Error level analysis: re-encodes the image as JPEG and measures how much
/// the pixels move. The residual is only a heuristic for local edits.
pub struct ElaAnalyzer {
    quality: u8,
    blur_sigma: Option<f32>,
    scratch_dir: Option<PathBuf>,
}

impl ElaAnalyzer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            blur_sigma: Some(2.0),
            scratch_dir: None,
        }
    }

    pub fn with_blur(mut self, sigma: Option<f32>) -> Self {
        self.blur_sigma = sigma;
        self
    }

    pub fn with_scratch_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.scratch_dir = dir;
        self
    }

    pub fn analyze(&self, image: &RgbImage, heatmap_out: Option<&Path>) -> Result<TamperResult> {
        let recompressed = self.recompress_jpeg(image)?;

        if recompressed.dimensions() != image.dimensions() {
            return Err(ForensicsError::AnalysisFailed(format!(
                "Recompressed image is {:?}, expected {:?}",
                recompressed.dimensions(),
                image.dimensions()
            )));
        }

        let difference = abs_difference(image, &recompressed);
        let max_difference = difference.pixels().flat_map(|p| p.0).max().unwrap_or(0);

        let scale = if max_difference == 0 {
            1.0
        } else {
            255.0 / max_difference as f64
        };
        let amplified = Self::amplify(&difference, scale);

        let intensity = rgb_to_gray(&amplified);
        let score = (mean_intensity(&intensity) / 255.0 * 100.0).clamp(0.0, 100.0);
        debug!("ELA q{}: max difference {}, score {:.2}", self.quality, max_difference, score);

        let heatmap = heatmap_out.and_then(|path| match self.save_heatmap(&amplified, path) {
            Ok(()) => Some(path.to_path_buf()),
            Err(e) => {
                warn!("Tamper heatmap could not be written to {}: {}", path.display(), e);
                None
            }
        });

        Ok(TamperResult {
            score,
            max_difference,
            heatmap,
        })
    }

    fn amplify(difference: &RgbImage, scale: f64) -> RgbImage {
        let mut amplified = difference.clone();
        for pixel in amplified.pixels_mut() {
            for c in pixel.0.iter_mut() {
                *c = (*c as f64 * scale).min(255.0) as u8;
            }
        }
        amplified
    }

    fn scratch_file(&self) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ela-").suffix(".jpg");

        let file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file)
    }

    // The scratch file is removed when `scratch` drops, on every return path.
    fn recompress_jpeg(&self, image: &RgbImage) -> Result<RgbImage> {
        let mut scratch = self.scratch_file()?;

        {
            let mut writer = BufWriter::new(scratch.as_file_mut());
            let encoder = JpegEncoder::new_with_quality(&mut writer, self.quality);
            image.write_with_encoder(encoder)?;
            writer.flush()?;
        }

        let recompressed = ImageReader::open(scratch.path())?
            .with_guessed_format()?
            .decode()?
            .to_rgb8();

        scratch.close()?;
        Ok(recompressed)
    }

    fn save_heatmap(&self, amplified: &RgbImage, path: &Path) -> Result<()> {
        match self.blur_sigma {
            Some(sigma) if sigma > 0.0 => gaussian_blur_f32(amplified, sigma).save(path)?,
            _ => amplified.save(path)?,
        }
        Ok(())
    }
}
