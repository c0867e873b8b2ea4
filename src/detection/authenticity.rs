use image::RgbImage;
use log::debug;
use ndarray::Array4;

use crate::{
    Normalization,
    detection::{AuthenticityResult, softmax},
    error::{ForensicsError, Result},
    image_utils::to_input_tensor,
    model::{Classifier, FAKE_INDEX, REAL_INDEX},
};

/// Runs the classifier on a normalized copy of the image and applies the
/// real/fake/suspicious decision policy.
pub struct AuthenticityScorer<'a> {
    classifier: &'a dyn Classifier,
    input_size: u32,
    normalization: Normalization,
    margin: f64,
}

impl<'a> AuthenticityScorer<'a> {
    pub fn new(classifier: &'a dyn Classifier) -> Self {
        Self {
            classifier,
            input_size: 300,
            normalization: Normalization::ImageNet,
            margin: 0.05,
        }
    }

    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn preprocess(&self, image: &RgbImage) -> Result<Array4<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ForensicsError::ImageTooSmall(1));
        }
        if self.input_size == 0 {
            return Err(ForensicsError::InvalidParameter("input size must be positive".into()));
        }
        Ok(to_input_tensor(image, self.input_size, self.normalization))
    }

    pub fn score_tensor(&self, tensor: &Array4<f32>) -> Result<AuthenticityResult> {
        let logits = self.classifier.logits(tensor)?;
        let probs = softmax(&logits)?;

        let real = probs[REAL_INDEX];
        let fake = probs[FAKE_INDEX];
        let result = AuthenticityResult::from_probabilities(real, fake, self.margin);

        debug!("Logits {:?} -> real {:.4}, fake {:.4}, {}", logits, real, fake, result.label);
        Ok(result)
    }

    pub fn score(&self, image: &RgbImage) -> Result<AuthenticityResult> {
        let tensor = self.preprocess(image)?;
        self.score_tensor(&tensor)
    }
}
