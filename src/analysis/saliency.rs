use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, RgbImage, imageops::{self, FilterType}};
use log::debug;
use ndarray::{Array2, Array4, Axis};

use crate::{
    error::{ForensicsError, Result},
    model::{ActivationTrace, Classifier},
    report::visualization::{VisualizationConfig, Visualizer},
};

/// Grad-CAM overlay: which regions pushed the classifier towards its answer.
pub struct SaliencyRenderer {
    input_size: u32,
    visualizer: Visualizer,
}

impl SaliencyRenderer {
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            visualizer: Visualizer::new(),
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.visualizer = Visualizer::with_config(VisualizationConfig { overlay_opacity: opacity });
        self
    }

    /// Gradient-weighted sum of the activation channels, rectified and
    /// scaled to [0, 1].
    pub fn class_activation_map(trace: &ActivationTrace) -> Result<Array2<f32>> {
        if trace.activations.dim() != trace.gradients.dim() {
            return Err(ForensicsError::AnalysisFailed(format!(
                "activation shape {:?} does not match gradient shape {:?}",
                trace.activations.shape(),
                trace.gradients.shape()
            )));
        }

        let (channels, height, width) = trace.activations.dim();
        if channels == 0 || height == 0 || width == 0 {
            return Err(ForensicsError::AnalysisFailed("empty activation map".into()));
        }

        let mut cam = Array2::<f32>::zeros((height, width));
        for (activation, gradient) in trace
            .activations
            .axis_iter(Axis(0))
            .zip(trace.gradients.axis_iter(Axis(0)))
        {
            let weight = gradient.mean().unwrap_or(0.0);
            cam.scaled_add(weight, &activation);
        }

        cam.mapv_inplace(|v| v.max(0.0));
        let min = cam.iter().cloned().fold(f32::INFINITY, f32::min);
        cam.mapv_inplace(|v| v - min);
        let max = cam.iter().cloned().fold(0.0f32, f32::max);
        cam.mapv_inplace(|v| v / (max + 1e-7));

        Ok(cam)
    }

    fn cam_to_gray(cam: &Array2<f32>) -> GrayImage {
        let (height, width) = cam.dim();
        let mut gray = GrayImage::new(width as u32, height as u32);

        for ((y, x), &v) in cam.indexed_iter() {
            gray.put_pixel(x as u32, y as u32, Luma([(v * 255.0).clamp(0.0, 255.0) as u8]));
        }

        gray
    }

    pub fn render(
        &self,
        classifier: &dyn Classifier,
        image: &RgbImage,
        tensor: &Array4<f32>,
        target_class: usize,
        out_path: &Path,
    ) -> Result<PathBuf> {
        let trace = classifier.trace(tensor, target_class)?;
        let cam = Self::class_activation_map(&trace)?;
        debug!("Class activation map {:?} for class {}", cam.dim(), target_class);

        let mask = imageops::resize(&Self::cam_to_gray(&cam), self.input_size, self.input_size, FilterType::Triangle);
        let base = imageops::resize(image, self.input_size, self.input_size, FilterType::Triangle);

        let heatmap = self.visualizer.create_heatmap(&mask);
        let overlay = self.visualizer.overlay_heatmap(&base, &heatmap);
        overlay.save(out_path)?;

        Ok(out_path.to_path_buf())
    }
}
