// THEORY:
// The `surgery` module watches an operative field. Two measurements come from the
// pixels (blood share and sharpness); two counts come from an external detector (tools
// and hands). Everything after that is rule chains.
//
// Key architectural principles:
// 1.  **Strict Blood Band**: Only saturated, bright reds count as blood, so tissue pink
//     and shadows stay out of the percentage.
// 2.  **Sharpness As Visibility**: Smoke and a fogged lens both flatten the image; the
//     variance of the Laplacian drops below 100 in either case.
// 3.  **Two Views Of One Frame**: A single image gets the full assessment (phase, status,
//     alert); a video frame gets the compact monitor status. Both read the same
//     measurements, so a frame analysed either way agrees on the blood share.

use image::RgbImage;
use log::{debug, info};
use serde::Serialize;

use crate::collaborators::Detection;
use crate::core_modules::classifier::{self, FieldObservation};
use crate::core_modules::filters;
use crate::core_modules::geometry::round_to;
use crate::core_modules::mask::Mask;
use crate::core_modules::pixel::pixel::{HsvRange, Pixel};
use crate::core_modules::region::Point;
use crate::core_modules::severity::{
    self, AlertLevel, BloodLevel, FrameSignals, Priority, VisibilityStatus,
};
use crate::core_modules::utils::image_helper::image_helper;

pub const HEMORRHAGE_LOW_BAND: HsvRange = HsvRange::new([0, 120, 70], [10, 255, 255]);
pub const HEMORRHAGE_HIGH_BAND: HsvRange = HsvRange::new([170, 120, 70], [180, 255, 255]);
/// Laplacian variance below which the field counts as smoky or blurred.
pub const SMOKE_SHARPNESS: f64 = 100.0;

pub const HANDS_CLASS: u32 = 0;
pub const TOOL_CLASSES: [u32; 4] = [42, 43, 44, 76];

pub fn class_label(class_id: u32) -> String {
    match class_id {
        0 => "Hands".to_string(),
        42 => "Retractor".to_string(),
        43 => "Scalpel".to_string(),
        44 => "Instrument".to_string(),
        76 => "Scissors".to_string(),
        other => format!("Object {other}"),
    }
}

#[derive(Debug, Clone)]
pub struct Hemorrhage {
    pub mask: Mask,
    /// Share of the frame, percent.
    pub blood_percent: f64,
    pub detected: bool,
}

pub fn detect_hemorrhage(image: &RgbImage, threshold_percent: f64) -> Hemorrhage {
    let mask = Mask::from_fn(image.width(), image.height(), |x, y| {
        let hsv = Pixel::from(image.get_pixel(x, y)).hsv();
        HEMORRHAGE_LOW_BAND.contains(hsv) || HEMORRHAGE_HIGH_BAND.contains(hsv)
    });
    let total = mask.area();
    let blood_percent = if total == 0 { 0.0 } else { mask.count() as f64 * 100.0 / total as f64 };
    Hemorrhage { mask, blood_percent, detected: blood_percent > threshold_percent }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visibility {
    pub sharpness: f64,
    pub smoke_or_blur: bool,
}

pub fn check_visibility(image: &RgbImage) -> Visibility {
    let sharpness = filters::laplacian_variance(&filters::to_gray(image));
    Visibility { sharpness, smoke_or_blur: sharpness < SMOKE_SHARPNESS }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldCounts {
    pub tools: u32,
    pub hands: u32,
}

/// A detection as reported to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelledDetection {
    pub label: String,
    /// Percent, one decimal.
    pub confidence: f64,
}

impl From<&Detection> for LabelledDetection {
    fn from(detection: &Detection) -> Self {
        Self {
            label: class_label(detection.class_id),
            confidence: round_to(detection.confidence as f64 * 100.0, 1),
        }
    }
}

/// What the detector saw, or counts supplied by hand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDetections {
    pub counts: FieldCounts,
    pub detections: Vec<Detection>,
}

impl FieldDetections {
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let tools = detections.iter().filter(|d| TOOL_CLASSES.contains(&d.class_id)).count() as u32;
        let hands = detections.iter().filter(|d| d.class_id == HANDS_CLASS).count() as u32;
        Self { counts: FieldCounts { tools, hands }, detections }
    }

    pub fn from_counts(tools: u32, hands: u32) -> Self {
        Self { counts: FieldCounts { tools, hands }, detections: Vec::new() }
    }

    fn labelled(&self) -> Vec<LabelledDetection> {
        self.detections.iter().map(LabelledDetection::from).collect()
    }
}

/// The reported result for one operative image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurgeryAssessment {
    pub phase: String,
    pub status: String,
    pub suggestion: String,
    pub priority: Priority,
    pub blood_level: BloodLevel,
    pub visibility_status: VisibilityStatus,
    pub alert: AlertLevel,
    pub threshold_met: bool,
    pub tools: u32,
    pub hands: u32,
    pub blood_percent: f64,
    pub sharpness: f64,
    pub detections: Vec<LabelledDetection>,
}

#[derive(Debug, Clone)]
pub struct SurgeryAnalysis {
    pub assessment: SurgeryAssessment,
    pub hemorrhage: Hemorrhage,
    pub field: FieldDetections,
}

impl SurgeryAnalysis {
    /// Blood tinted red, tools boxed green, hands boxed yellow.
    pub fn annotate(&self, image: &RgbImage) -> RgbImage {
        let mut annotated = image.clone();
        image_helper::tint_mask(&mut annotated, &self.hemorrhage.mask, image_helper::RED, 0.4);
        for detection in &self.field.detections {
            let colour = if detection.class_id == HANDS_CLASS { image_helper::YELLOW } else { image_helper::GREEN };
            image_helper::draw_box(&mut annotated, detection_box(detection, image), colour);
        }
        annotated
    }
}

fn detection_box(detection: &Detection, image: &RgbImage) -> (Point, Point) {
    let clamp = |v: f32, limit: u32| (v.max(0.0) as u32).min(limit.saturating_sub(1));
    let [x1, y1, x2, y2] = detection.bbox;
    let (min_x, max_x) = (clamp(x1.min(x2), image.width()), clamp(x1.max(x2), image.width()));
    let (min_y, max_y) = (clamp(y1.min(y2), image.height()), clamp(y1.max(y2), image.height()));
    (Point::new(min_x, min_y), Point::new(max_x, max_y))
}

/// Full assessment of one operative image.
pub fn analyze_field(image: &RgbImage, field: FieldDetections, hemorrhage_threshold_percent: f64) -> SurgeryAnalysis {
    let hemorrhage = detect_hemorrhage(image, hemorrhage_threshold_percent);
    let visibility = check_visibility(image);
    let observation = FieldObservation {
        tools: field.counts.tools,
        hands: field.counts.hands,
        blood_percent: hemorrhage.blood_percent,
        sharpness: visibility.sharpness,
    };

    let phase = classifier::classify_surgical_phase(&observation);
    let status = severity::assess_surgical_status(&observation);
    debug!("phase rule '{}', status rule '{}'", phase.rule, status.rule);
    let alert = AlertLevel::from_priority(status.outcome.priority, visibility.smoke_or_blur);

    let assessment = SurgeryAssessment {
        phase: phase.outcome.label().to_string(),
        status: status.outcome.status.to_string(),
        suggestion: status.outcome.suggestion.to_string(),
        priority: status.outcome.priority,
        blood_level: BloodLevel::from_percent(hemorrhage.blood_percent),
        visibility_status: VisibilityStatus::from_sharpness(visibility.sharpness),
        alert,
        threshold_met: alert.threshold_met(),
        tools: observation.tools,
        hands: observation.hands,
        blood_percent: round_to(hemorrhage.blood_percent, 1),
        sharpness: round_to(visibility.sharpness, 1),
        detections: field.labelled(),
    };
    info!("surgery: {} / {} ({:?})", assessment.phase, assessment.status, assessment.alert);

    SurgeryAnalysis { assessment, hemorrhage, field }
}

/// One monitored video frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub status: String,
    pub message: String,
    pub level: AlertLevel,
    pub tools: u32,
    pub hands: u32,
    pub blood_pct: f64,
    pub sharpness: f64,
    pub detections: Vec<LabelledDetection>,
}

pub fn analyze_frame(frame: &RgbImage, field: &FieldDetections, hemorrhage_threshold_percent: f64) -> FrameReport {
    let hemorrhage = detect_hemorrhage(frame, hemorrhage_threshold_percent);
    let visibility = check_visibility(frame);
    let fired = severity::frame_status_chain().evaluate(&FrameSignals {
        hemorrhage: hemorrhage.detected,
        blood_percent: hemorrhage.blood_percent,
        smoke_or_blur: visibility.smoke_or_blur,
        tools: field.counts.tools,
        hands: field.counts.hands,
    });
    FrameReport {
        status: fired.outcome.status.to_string(),
        message: fired.outcome.message,
        level: fired.outcome.level,
        tools: field.counts.tools,
        hands: field.counts.hands,
        blood_pct: round_to(hemorrhage.blood_percent, 1),
        sharpness: round_to(visibility.sharpness, 0),
        detections: field.labelled(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const BLOOD: Rgb<u8> = Rgb([200, 30, 30]);

    /// 100x100 checkerboard with the first `blood_columns` columns painted blood red.
    fn field(blood_columns: u32) -> RgbImage {
        RgbImage::from_fn(100, 100, |x, y| {
            if x < blood_columns {
                BLOOD
            } else if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn detection(class_id: u32) -> Detection {
        Detection { class_id, confidence: 0.876, bbox: [10.0, 10.0, 40.0, 30.0] }
    }

    #[test]
    fn blood_share_is_measured_over_the_whole_frame() {
        let hemorrhage = detect_hemorrhage(&field(30), 15.0);
        assert_eq!(hemorrhage.blood_percent, 30.0);
        assert!(hemorrhage.detected);
        assert!(!detect_hemorrhage(&field(10), 15.0).detected);
    }

    #[test]
    fn pale_pink_is_not_blood() {
        let image = RgbImage::from_pixel(10, 10, Rgb([230, 150, 150]));
        assert_eq!(detect_hemorrhage(&image, 15.0).blood_percent, 0.0);
    }

    #[test]
    fn flat_field_is_smoky() {
        assert!(check_visibility(&RgbImage::from_pixel(50, 50, Rgb([120, 120, 120]))).smoke_or_blur);
        assert!(!check_visibility(&field(0)).smoke_or_blur);
    }

    #[test]
    fn detections_map_to_counts_and_labels() {
        let field = FieldDetections::from_detections(vec![detection(0), detection(43), detection(76), detection(2)]);
        assert_eq!(field.counts, FieldCounts { tools: 2, hands: 1 });
        let labelled = field.labelled();
        assert_eq!(labelled[1].label, "Scalpel");
        assert_eq!(labelled[3].label, "Object 2");
        assert_eq!(labelled[0].confidence, 87.6);
    }

    #[test]
    fn unattended_massive_bleeding_is_an_emergency() {
        let analysis = analyze_field(&field(30), FieldDetections::default(), 15.0);
        let a = &analysis.assessment;
        assert_eq!(a.status, "EMERGENCY");
        assert_eq!(a.priority, Priority::Critical);
        assert_eq!(a.phase, "CLEAR FIELD");
        assert_eq!(a.blood_level, BloodLevel::Critical);
        assert_eq!(a.alert, AlertLevel::Red);
        assert!(a.threshold_met);
    }

    #[test]
    fn clean_prepared_field_is_green() {
        let analysis = analyze_field(&field(0), FieldDetections::from_counts(1, 1), 15.0);
        let a = &analysis.assessment;
        assert_eq!(a.phase, "PREPARATION");
        assert_eq!(a.status, "ACTIVE");
        assert_eq!(a.visibility_status, VisibilityStatus::Excellent);
        assert_eq!(a.alert, AlertLevel::Green);
        assert!(!a.threshold_met);
    }

    #[test]
    fn frame_report_flags_hemorrhage_first() {
        let report = analyze_frame(&field(30), &FieldDetections::from_counts(1, 0), 15.0);
        assert_eq!(report.status, "CRITICAL");
        assert_eq!(report.message, "HEMORRHAGE (30.0%)");
        assert_eq!(report.level, AlertLevel::Red);
        assert_eq!(report.blood_pct, 30.0);

        let idle = analyze_frame(&field(0), &FieldDetections::default(), 15.0);
        assert_eq!(idle.status, "INACTIVE");
        assert_eq!(idle.level, AlertLevel::Gray);
    }

    #[test]
    fn annotation_tints_blood_and_boxes_detections() {
        let image = field(30);
        let analysis = analyze_field(&image, FieldDetections::from_detections(vec![detection(43)]), 15.0);
        let annotated = analysis.annotate(&image);
        assert_ne!(*annotated.get_pixel(0, 50), BLOOD);
        assert_eq!(*annotated.get_pixel(40, 30), image_helper::GREEN);
        assert_eq!(*image.get_pixel(0, 50), BLOOD);
    }
}
