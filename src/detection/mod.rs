pub mod authenticity;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ForensicsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Real,
    Fake,
    Suspicious,
    #[serde(rename = "error")]
    Error,
}

impl Label {
    /// Three-way decision. A near tie (within `margin` on the probability
    /// scale) is reported as `Suspicious` instead of being resolved.
    pub fn decide(real_probability: f64, fake_probability: f64, margin: f64) -> Self {
        match (real_probability, fake_probability) {
            (r, f) if (r - f).abs() <= margin => Label::Suspicious,
            (r, f) if r > f => Label::Real,
            _ => Label::Fake,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Label::Real => "Real",
            Label::Fake => "Fake",
            Label::Suspicious => "Suspicious",
            Label::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticityResult {
    pub real_probability: f64,
    pub fake_probability: f64,
    pub authenticity_score: f64,
    pub label: Label,
}

impl AuthenticityResult {
    pub fn from_probabilities(real_probability: f64, fake_probability: f64, margin: f64) -> Self {
        Self {
            real_probability,
            fake_probability,
            authenticity_score: real_probability * 100.0,
            label: Label::decide(real_probability, fake_probability, margin),
        }
    }

    /// Zero-confidence placeholder used when the classifier could not run.
    pub fn error() -> Self {
        Self {
            real_probability: 0.0,
            fake_probability: 0.0,
            authenticity_score: 0.0,
            label: Label::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.label == Label::Error
    }
}

/// Softmax with the maximum subtracted first so large logits cannot overflow.
pub fn softmax(logits: &[f32]) -> Result<Vec<f64>> {
    if logits.is_empty() {
        return Err(ForensicsError::Inference("no logits to normalize".into()));
    }
    if logits.iter().any(|l| !l.is_finite()) {
        return Err(ForensicsError::Inference(format!("non-finite logits: {:?}", logits)));
    }

    let max = logits.iter().map(|&l| l as f64).fold(f64::NEG_INFINITY, f64::max);
    let exps = logits.iter().map(|&l| (l as f64 - max).exp()).collect::<Vec<_>>();
    let sum = exps.iter().sum::<f64>();

    Ok(exps.into_iter().map(|e| e / sum).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_policy() {
        assert_eq!(Label::decide(0.52, 0.48, 0.05), Label::Suspicious);
        assert_eq!(Label::decide(0.48, 0.52, 0.05), Label::Suspicious);
        assert_eq!(Label::decide(0.9, 0.1, 0.05), Label::Real);
        assert_eq!(Label::decide(0.1, 0.9, 0.05), Label::Fake);
        assert_eq!(Label::decide(0.5, 0.5, 0.05), Label::Suspicious);
        assert_eq!(Label::decide(0.53, 0.47, 0.05), Label::Real);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        for logits in [[0.0f32, 0.0], [1000.0, -1000.0], [-3.5, 2.25], [80.0, 81.0]] {
            let probs = softmax(&logits).unwrap();
            assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_softmax_rejects_nan() {
        assert!(softmax(&[f32::NAN, 0.0]).is_err());
        assert!(softmax(&[f32::INFINITY, 0.0]).is_err());
        assert!(softmax(&[]).is_err());
    }

    #[test]
    fn test_authenticity_score_scale() {
        let result = AuthenticityResult::from_probabilities(0.9, 0.1, 0.05);
        assert!((result.authenticity_score - 90.0).abs() < 1e-9);
        assert_eq!(result.label, Label::Real);
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_string(&Label::Suspicious).unwrap(), "\"Suspicious\"");
        assert_eq!(serde_json::to_string(&Label::Error).unwrap(), "\"error\"");
        assert_eq!(Label::Error.to_string(), "error");
        assert!(AuthenticityResult::error().is_error());
    }
}
