pub mod visualization;

use serde::Serialize;

use crate::{AnalysisResult, Label, metadata::exif::Metadata};

/// Flat record in the shape the upload API stores and returns.
#[derive(Serialize)]
pub struct JsonReport {
    pub phash: Option<String>,
    pub exif: Metadata,
    pub tamper_score: f64,
    pub heatmap: Option<String>,
    pub tamper_heatmap: Option<String>,
    pub saliency_heatmap: Option<String>,
    pub label: Label,
    pub authenticity: f64,
    pub real_prob: f64,
    pub fake_prob: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&AnalysisResult> for JsonReport {
    fn from(result: &AnalysisResult) -> Self {
        let path_string = |p: &Option<std::path::PathBuf>| p.as_ref().map(|p| p.to_string_lossy().to_string());

        Self {
            phash: result.perceptual_hash.clone(),
            exif: result.metadata.clone(),
            tamper_score: result.tamper_score,
            heatmap: path_string(&result.heatmap_path),
            tamper_heatmap: path_string(&result.tamper_heatmap),
            saliency_heatmap: path_string(&result.saliency_heatmap),
            label: result.authenticity.label,
            authenticity: result.authenticity.authenticity_score,
            real_prob: result.authenticity.real_probability,
            fake_prob: result.authenticity.fake_probability,
            error: result.error.clone(),
        }
    }
}

impl JsonReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
