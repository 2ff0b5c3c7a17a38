// THEORY:
// The `pipeline` module is the top-level API of the triage engine. It wraps the
// domain analyses behind one struct that owns the configuration and the injected
// external models, so a caller hands in bytes or an image and gets back a
// fully-formed assessment.
//
// Key architectural principles:
// 1.  **Decode At The Edge**: Undecodable bytes and zero-sized images are the only hard
//     input failures. They are rejected here, before any stage runs.
// 2.  **Explicit Collaborators**: Models are `Arc<dyn Trait>` handles set at
//     construction. There is no global model cache; a pipeline without a detector simply
//     takes counts from its caller.
// 3.  **Cheap To Share**: Cloning a `TriagePipeline` clones handles, not models, so the
//     worker pool can give every worker its own copy.

use std::path::Path;
use std::sync::Arc;

use image::{GrayImage, RgbImage};
use log::{debug, info};
use serde::Serialize;

use crate::collaborators::{MalignancyModel, ObjectDetector, SkinLabeler, TumorClassifier};
use crate::config::TriageConfig;
use crate::core_modules::calibration::{self, DetectedCircle, ScaleRatio};
use crate::core_modules::filters;
use crate::core_modules::skin_labels::{self, CANDIDATE_LABELS};
use crate::error::{Result, TriageError};

// Re-export the result types of the public API.
pub use crate::core_modules::dermatology::{DermatologyAnalysis, SkinAssessment};
pub use crate::core_modules::neurology::{NeuroAnalysis, NeuroAssessment};
pub use crate::core_modules::skin_labels::SkinLabelAssessment;
pub use crate::core_modules::surgery::{FieldCounts, FieldDetections, FrameReport, SurgeryAnalysis, SurgeryAssessment};

use crate::core_modules::{dermatology, neurology, surgery};

/// Decodes any format `image` understands into an RGB buffer.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(TriageError::EmptyImage { width: image.width(), height: image.height() });
    }
    Ok(image)
}

pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage> {
    decode_image(&std::fs::read(path)?)
}

/// Scale established for an image, and how.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub scale_ratio: ScaleRatio,
    pub reference_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin: Option<DetectedCircle>,
}

#[derive(Clone, Default)]
pub struct TriagePipeline {
    config: TriageConfig,
    tumor_classifier: Option<Arc<dyn TumorClassifier>>,
    object_detector: Option<Arc<dyn ObjectDetector>>,
    skin_labeler: Option<Arc<dyn SkinLabeler>>,
    malignancy_model: Option<Arc<dyn MalignancyModel>>,
}

impl TriagePipeline {
    pub fn new(config: TriageConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn with_tumor_classifier(mut self, classifier: Arc<dyn TumorClassifier>) -> Self {
        self.tumor_classifier = Some(classifier);
        self
    }

    pub fn with_object_detector(mut self, detector: Arc<dyn ObjectDetector>) -> Self {
        self.object_detector = Some(detector);
        self
    }

    pub fn with_skin_labeler(mut self, labeler: Arc<dyn SkinLabeler>) -> Self {
        self.skin_labeler = Some(labeler);
        self
    }

    pub fn with_malignancy_model(mut self, model: Arc<dyn MalignancyModel>) -> Self {
        self.malignancy_model = Some(model);
        self
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn calibrate(&self, image: &RgbImage) -> CalibrationReport {
        let found = calibration::detect_coin_reference(&filters::to_gray(image));
        let scale_ratio = calibration::resolve_scale(None, found.as_ref(), image.width());
        CalibrationReport { scale_ratio, reference_found: found.is_some(), coin: found.map(|c| c.coin) }
    }

    /// Measures and grades the most prominent lesion. `scale` is pixels per millimetre.
    pub fn analyze_derma(&self, image: &RgbImage, scale: Option<f64>) -> Result<DermatologyAnalysis> {
        let scale = scale.map(ScaleRatio::new).transpose()?;
        Ok(dermatology::analyze_skin(image, scale))
    }

    /// Reads a skin photo through the injected labeller, with the malignancy override.
    /// `Ok(None)` when the labeller ranks nothing.
    pub fn analyze_skin_labels(&self, image: &RgbImage) -> Result<Option<SkinLabelAssessment>> {
        let labeler = self
            .skin_labeler
            .as_ref()
            .ok_or_else(|| TriageError::Collaborator("no skin labeller configured".to_string()))?;
        let ranked = labeler.rank_labels(image, &CANDIDATE_LABELS)?;
        let Some(mut assessment) = skin_labels::interpret(&ranked) else {
            return Ok(None);
        };
        let top_score = ranked.first().map_or(0.0, |l| l.score);

        let consult = skin_labels::needs_malignancy_check(&assessment, top_score, self.config.label_confidence_gate);
        if let (true, Some(model)) = (consult, &self.malignancy_model) {
            let probability = model.malignancy_probability(image)?;
            debug!("malignancy probability {probability:.3}");
            skin_labels::apply_malignancy_override(&mut assessment, probability, self.config.malignancy_probability_gate);
        }
        info!("skin label '{}' -> {}", assessment.label, assessment.diagnosis);
        Ok(Some(assessment))
    }

    /// Grades a brain scan. A supplied confidence (percent) takes precedence over the
    /// injected classifier.
    pub fn analyze_neuro(
        &self,
        scan: &RgbImage,
        confidence: Option<f64>,
        heatmap: Option<&GrayImage>,
    ) -> Result<NeuroAnalysis> {
        let confidence = match (confidence, &self.tumor_classifier) {
            (Some(confidence), _) => confidence,
            (None, Some(classifier)) => classifier.tumor_confidence(scan)?,
            (None, None) => {
                return Err(TriageError::Collaborator("no tumour confidence and no classifier configured".to_string()));
            }
        };
        neurology::analyze_scan(scan, confidence, heatmap, &self.config)
    }

    /// Assesses an operative image. Supplied counts take precedence over the detector;
    /// with neither, the field is treated as empty.
    pub fn analyze_surgery(&self, image: &RgbImage, counts: Option<FieldCounts>) -> Result<SurgeryAnalysis> {
        let field = self.observe_field(image, counts)?;
        Ok(surgery::analyze_field(image, field, self.config.hemorrhage_threshold_percent))
    }

    /// Monitor status of one video frame.
    pub fn analyze_frame(&self, frame: &RgbImage) -> Result<FrameReport> {
        let field = self.observe_field(frame, None)?;
        Ok(surgery::analyze_frame(frame, &field, self.config.hemorrhage_threshold_percent))
    }

    fn observe_field(&self, image: &RgbImage, counts: Option<FieldCounts>) -> Result<FieldDetections> {
        match (counts, &self.object_detector) {
            (Some(counts), _) => Ok(FieldDetections::from_counts(counts.tools, counts.hands)),
            (None, Some(detector)) => Ok(FieldDetections::from_detections(detector.detect(image)?)),
            (None, None) => Ok(FieldDetections::default()),
        }
    }
}
