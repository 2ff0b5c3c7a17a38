// THEORY:
// External models (tumour classifier, object detector, zero-shot skin labeller,
// malignancy model) are not part of the engine. They are handed in as trait objects,
// built and owned by the caller, so every analysis stays a function of its arguments.
// The types here are the shapes of their output, nothing more.

use image::RgbImage;
use serde::Serialize;

use crate::error::Result;

/// Scores a brain scan for the presence of a tumour.
pub trait TumorClassifier: Send + Sync {
    /// Tumour confidence in percent (0-100).
    fn tumor_confidence(&self, scan: &RgbImage) -> Result<f64>;
}

/// Finds hands and instruments in an operative frame.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

/// Ranks free-text labels against a skin photo, best first.
pub trait SkinLabeler: Send + Sync {
    fn rank_labels(&self, photo: &RgbImage, candidates: &[&str]) -> Result<Vec<LabelScore>>;
}

/// Estimates the probability that a skin lesion is malignant.
pub trait MalignancyModel: Send + Sync {
    fn malignancy_probability(&self, photo: &RgbImage) -> Result<f64>;
}

/// One detected object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    /// Detector class index (COCO numbering).
    pub class_id: u32,
    /// Confidence in 0..=1.
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f32; 4],
}

/// A label and its score in 0..=1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self { label: label.into(), score }
    }
}
