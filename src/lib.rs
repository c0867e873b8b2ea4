use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::RgbImage;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{ela::ElaAnalyzer, phash::PerceptualHasher, saliency::SaliencyRenderer},
    detection::{AuthenticityResult, authenticity::AuthenticityScorer},
    error::{ForensicsError, Result},
    image_utils::sibling_path,
    metadata::exif::{ExifExtractor, Metadata},
    model::{
        Classifier, FAKE_INDEX, REAL_INDEX,
        network::{ArchitectureConfig, CompactCnn},
    },
};

pub mod error;
pub mod image_utils;
pub mod analysis;
pub mod detection;
pub mod metadata;
pub mod model;
pub mod report;

pub use detection::Label;

/// Per-channel mean and standard deviation applied before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    /// mean = [0.485, 0.456, 0.406], std = [0.229, 0.224, 0.225]
    ImageNet,
    /// mean = std = 0.5
    Symmetric,
}

impl Normalization {
    pub fn mean_std(&self) -> ([f32; 3], [f32; 3]) {
        match self {
            Normalization::ImageNet => ([0.485, 0.456, 0.406], [0.229, 0.224, 0.225]),
            Normalization::Symmetric => ([0.5; 3], [0.5; 3]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub ela_quality: u8,
    /// Probability-scale margin under which real vs. fake counts as a tie.
    pub margin: f64,
    pub input_size: u32,
    pub normalization: Normalization,
    pub heatmap_blur_sigma: Option<f32>,
    pub overlay_opacity: f32,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ela_quality: 90,
            margin: 0.05,
            input_size: 300,
            normalization: Normalization::ImageNet,
            heatmap_blur_sigma: Some(2.0),
            overlay_opacity: 0.5,
            scratch_dir: None,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_ela_quality(mut self, quality: u8) -> Self {
        self.ela_quality = quality;
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.ela_quality) {
            return Err(ForensicsError::InvalidParameter(format!(
                "ELA quality must be between 1 and 100, got {}", self.ela_quality
            )));
        }
        if !(0.0..1.0).contains(&self.margin) {
            return Err(ForensicsError::InvalidParameter(format!(
                "margin must be in [0, 1), got {}", self.margin
            )));
        }
        if self.input_size == 0 {
            return Err(ForensicsError::InvalidParameter("input size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.overlay_opacity) {
            return Err(ForensicsError::InvalidParameter(format!(
                "overlay opacity must be in [0, 1], got {}", self.overlay_opacity
            )));
        }
        if let Some(sigma) = self.heatmap_blur_sigma {
            if sigma <= 0.0 {
                return Err(ForensicsError::InvalidParameter(format!(
                    "blur sigma must be positive, got {}", sigma
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperResult {
    /// Mean amplified residual on a 0-100 scale.
    pub score: f64,
    pub max_difference: u8,
    pub heatmap: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub metadata: Metadata,
    pub perceptual_hash: Option<String>,
    pub tamper_score: f64,
    /// Saliency overlay if one was rendered, otherwise the tamper heatmap.
    pub heatmap_path: Option<PathBuf>,
    pub tamper_heatmap: Option<PathBuf>,
    pub saliency_heatmap: Option<PathBuf>,
    pub authenticity: AuthenticityResult,
    pub error: Option<String>,
}

impl AnalysisResult {
    fn failed(message: String) -> Self {
        Self {
            metadata: Metadata::new(),
            perceptual_hash: None,
            tamper_score: 0.0,
            heatmap_path: None,
            tamper_heatmap: None,
            saliency_heatmap: None,
            authenticity: AuthenticityResult::error(),
            error: Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs every analysis stage over one image. Stages fail independently;
/// only an unreadable source image fails the whole record.
pub struct ForensicsPipeline {
    classifier: Arc<dyn Classifier>,
    config: AnalysisConfig,
}

impl ForensicsPipeline {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            config: AnalysisConfig::default(),
        }
    }

    pub fn from_checkpoint<P: AsRef<Path>>(path: P, arch: ArchitectureConfig, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let (model, _) = CompactCnn::load(path, arch)?;
        Self::new(Arc::new(model)).with_config(config)
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn classifier(&self) -> Arc<dyn Classifier> {
        Arc::clone(&self.classifier)
    }

    /// Never fails: problems are reported through the record's fields.
    pub fn analyze<P: AsRef<Path>>(&self, image_path: P, heatmap_out: Option<&Path>) -> AnalysisResult {
        let image_path = image_path.as_ref();

        let rgb = match image::open(image_path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                error!("Error analyzing image {}: {}", image_path.display(), e);
                return AnalysisResult::failed(ForensicsError::from(e).to_string());
            }
        };
        info!("Analyzing {} ({}x{})", image_path.display(), rgb.width(), rgb.height());

        let metadata = ExifExtractor::extract(image_path);
        let perceptual_hash = self.perceptual_hash(&rgb);
        let tamper = self.tamper(&rgb, heatmap_out);
        let (authenticity, saliency_heatmap) = self.authenticity(&rgb, heatmap_out);

        AnalysisResult {
            metadata,
            perceptual_hash,
            tamper_score: tamper.score,
            heatmap_path: saliency_heatmap.clone().or_else(|| tamper.heatmap.clone()),
            tamper_heatmap: tamper.heatmap,
            saliency_heatmap,
            authenticity,
            error: None,
        }
    }

    fn perceptual_hash(&self, rgb: &RgbImage) -> Option<String> {
        PerceptualHasher::new()
            .hash(rgb)
            .map_err(|e| warn!("Perceptual hash failed: {}", e))
            .ok()
    }

    fn tamper(&self, rgb: &RgbImage, heatmap_out: Option<&Path>) -> TamperResult {
        let target = heatmap_out.map(|p| sibling_path(p, "ela"));

        ElaAnalyzer::new(self.config.ela_quality)
            .with_blur(self.config.heatmap_blur_sigma)
            .with_scratch_dir(self.config.scratch_dir.clone())
            .analyze(rgb, target.as_deref())
            .unwrap_or_else(|e| {
                warn!("Tamper analysis failed: {}", e);
                TamperResult {
                    score: 0.0,
                    max_difference: 0,
                    heatmap: None,
                }
            })
    }

    fn authenticity(&self, rgb: &RgbImage, heatmap_out: Option<&Path>) -> (AuthenticityResult, Option<PathBuf>) {
        let scorer = AuthenticityScorer::new(self.classifier.as_ref())
            .with_input_size(self.config.input_size)
            .with_normalization(self.config.normalization)
            .with_margin(self.config.margin);

        let scored = scorer
            .preprocess(rgb)
            .and_then(|tensor| scorer.score_tensor(&tensor).map(|result| (tensor, result)));

        let (tensor, authenticity) = match scored {
            Ok(scored) => scored,
            Err(e) => {
                error!("Authenticity scoring failed: {}", e);
                return (AuthenticityResult::error(), None);
            }
        };

        let saliency = heatmap_out.and_then(|out| {
            let target = if authenticity.real_probability >= authenticity.fake_probability {
                REAL_INDEX
            } else {
                FAKE_INDEX
            };

            SaliencyRenderer::new(self.config.input_size)
                .with_opacity(self.config.overlay_opacity)
                .render(self.classifier.as_ref(), rgb, &tensor, target, out)
                .map_err(|e| error!("Heatmap generation failed: {}", e))
                .ok()
        });

        (authenticity, saliency)
    }
}
