use std::{collections::BTreeMap, path::Path};

use log::info;
use ndarray::{Array1, Array2, Array3, Array4, ArrayD, Axis, Dimension, Ix1, Ix2, Ix4};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ForensicsError, Result},
    model::{
        ActivationTrace, Classifier,
        checkpoint::{LoadReport, StateDict},
    },
};

const KERNEL: usize = 3;
const STRIDE: usize = 2;
const PADDING: usize = 1;
const NUM_CLASSES: usize = 2;

/// Output channels of each convolution stage. The first stage is the stem,
/// the rest are `blocks.{i}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub channels: Vec<usize>,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self { channels: vec![16, 32, 64, 128] }
    }
}

impl ArchitectureConfig {
    fn stage_name(index: usize) -> String {
        if index == 0 {
            "stem".to_string()
        } else {
            format!("blocks.{}", index - 1)
        }
    }

    /// Parameter names and shapes in checkpoint order.
    pub fn parameters(&self) -> Vec<(String, Vec<usize>)> {
        let mut params = Vec::new();
        let mut in_channels = 3;

        for (i, &out_channels) in self.channels.iter().enumerate() {
            let name = Self::stage_name(i);
            params.push((format!("{}.weight", name), vec![out_channels, in_channels, KERNEL, KERNEL]));
            params.push((format!("{}.bias", name), vec![out_channels]));
            in_channels = out_channels;
        }

        params.push(("classifier.weight".to_string(), vec![NUM_CLASSES, in_channels]));
        params.push(("classifier.bias".to_string(), vec![NUM_CLASSES]));
        params
    }
}

struct ConvStage {
    weight: Array4<f32>,
    bias: Array1<f32>,
}

impl ConvStage {
    /// 3x3 stride-2 zero-padded convolution followed by ReLU.
    fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        let (in_channels, height, width) = input.dim();
        let out_channels = self.weight.dim().0;
        let out_h = (height + 2 * PADDING - KERNEL) / STRIDE + 1;
        let out_w = (width + 2 * PADDING - KERNEL) / STRIDE + 1;

        let planes = (0..out_channels)
            .into_par_iter()
            .map(|oc| {
                let mut plane = Array2::from_elem((out_h, out_w), self.bias[oc]);

                for ic in 0..in_channels {
                    for ky in 0..KERNEL {
                        for kx in 0..KERNEL {
                            let w = self.weight[[oc, ic, ky, kx]];
                            if w == 0.0 {
                                continue;
                            }

                            for oy in 0..out_h {
                                let iy = (oy * STRIDE + ky) as isize - PADDING as isize;
                                if iy < 0 || iy >= height as isize {
                                    continue;
                                }
                                for ox in 0..out_w {
                                    let ix = (ox * STRIDE + kx) as isize - PADDING as isize;
                                    if ix < 0 || ix >= width as isize {
                                        continue;
                                    }
                                    plane[[oy, ox]] += w * input[[ic, iy as usize, ix as usize]];
                                }
                            }
                        }
                    }
                }

                plane.mapv_inplace(|v| v.max(0.0));
                plane
            })
            .collect::<Vec<_>>();

        let mut output = Array3::zeros((out_channels, out_h, out_w));
        for (oc, plane) in planes.into_iter().enumerate() {
            output.index_axis_mut(Axis(0), oc).assign(&plane);
        }
        output
    }
}

/// Small convolutional two-class classifier evaluated with `ndarray`.
pub struct CompactCnn {
    arch: ArchitectureConfig,
    stages: Vec<ConvStage>,
    head_weight: Array2<f32>,
    head_bias: Array1<f32>,
}

impl CompactCnn {
    /// Zero-initialized network.
    pub fn new(arch: ArchitectureConfig) -> Result<Self> {
        Self::with_parameters(arch, BTreeMap::new())
    }

    pub fn from_state_dict(arch: ArchitectureConfig, state: &StateDict) -> Result<(Self, LoadReport)> {
        let (matched, report) = state.match_parameters(&arch.parameters());
        report.log_warnings();

        Ok((Self::with_parameters(arch, matched)?, report))
    }

    pub fn load<P: AsRef<Path>>(path: P, arch: ArchitectureConfig) -> Result<(Self, LoadReport)> {
        let state = StateDict::from_json_file(&path)?;
        let (model, report) = Self::from_state_dict(arch, &state)?;

        info!(
            "Classifier loaded from {} ({}/{} parameters)",
            path.as_ref().display(),
            report.loaded.len(),
            model.arch.parameters().len()
        );
        Ok((model, report))
    }

    fn with_parameters(arch: ArchitectureConfig, mut params: BTreeMap<String, ArrayD<f32>>) -> Result<Self> {
        if arch.channels.is_empty() {
            return Err(ForensicsError::InvalidParameter("architecture needs at least one stage".into()));
        }

        let mut stages = Vec::with_capacity(arch.channels.len());
        let mut in_channels = 3;

        for (i, &out_channels) in arch.channels.iter().enumerate() {
            let name = ArchitectureConfig::stage_name(i);
            stages.push(ConvStage {
                weight: take::<Ix4>(&mut params, &format!("{}.weight", name), (out_channels, in_channels, KERNEL, KERNEL))?,
                bias: take::<Ix1>(&mut params, &format!("{}.bias", name), out_channels)?,
            });
            in_channels = out_channels;
        }

        let head_weight = take::<Ix2>(&mut params, "classifier.weight", (NUM_CLASSES, in_channels))?;
        let head_bias = take::<Ix1>(&mut params, "classifier.bias", NUM_CLASSES)?;

        Ok(Self {
            arch,
            stages,
            head_weight,
            head_bias,
        })
    }

    pub fn architecture(&self) -> &ArchitectureConfig {
        &self.arch
    }

    fn features(&self, input: &Array4<f32>) -> Result<Array3<f32>> {
        let (batch, channels, height, width) = input.dim();
        if batch != 1 || channels != 3 {
            return Err(ForensicsError::Inference(format!(
                "expected a [1, 3, H, W] tensor, got {:?}",
                input.shape()
            )));
        }
        if height == 0 || width == 0 {
            return Err(ForensicsError::Inference("empty input tensor".into()));
        }

        let mut x = input.index_axis(Axis(0), 0).to_owned();
        for stage in &self.stages {
            x = stage.forward(&x);
        }
        Ok(x)
    }

    fn head(&self, features: &Array3<f32>) -> Result<[f32; 2]> {
        let pooled = features
            .mean_axis(Axis(2))
            .and_then(|m| m.mean_axis(Axis(1)))
            .ok_or_else(|| ForensicsError::Inference("feature map has no spatial extent".into()))?;

        let logits = self.head_weight.dot(&pooled) + &self.head_bias;
        Ok([logits[0], logits[1]])
    }
}

/// Removes `name` from `params` or falls back to zeros of `shape`.
fn take<D: Dimension>(
    params: &mut BTreeMap<String, ArrayD<f32>>,
    name: &str,
    shape: impl ndarray::ShapeBuilder<Dim = D>,
) -> Result<ndarray::Array<f32, D>> {
    match params.remove(name) {
        Some(tensor) => Ok(tensor.into_dimensionality::<D>()?),
        None => Ok(ndarray::Array::zeros(shape)),
    }
}

impl Classifier for CompactCnn {
    fn logits(&self, input: &Array4<f32>) -> Result<[f32; 2]> {
        let features = self.features(input)?;
        self.head(&features)
    }

    fn trace(&self, input: &Array4<f32>, class: usize) -> Result<ActivationTrace> {
        if class >= NUM_CLASSES {
            return Err(ForensicsError::InvalidParameter(format!("class index {} out of range", class)));
        }

        let activations = self.features(input)?;
        let logits = self.head(&activations)?;

        // logit = W[class] . mean(A) + b, so d logit / d A[c, y, x] = W[class, c] / (H * W)
        let (_, height, width) = activations.dim();
        let area = (height * width) as f32;
        let gradients = Array3::from_shape_fn(activations.dim(), |(c, _, _)| self.head_weight[[class, c]] / area);

        Ok(ActivationTrace {
            logits,
            activations,
            gradients,
        })
    }
}
