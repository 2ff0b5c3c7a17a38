// THEORY:
// The `dermatology` module runs the whole chain for one skin photo:
// calibrate → segment → measure → validate → classify → grade.
//
// Key architectural principles:
// 1.  **Every Exit Is An Answer**: No tissue, an oversized candidate, an empty interior
//     and a failed validation each produce a complete `SkinAssessment` with zero
//     severity. Only the caller's malformed input is an error, and that is caught
//     before this module is reached.
// 2.  **Scale Once**: The ratio is fixed before any measurement: the caller's value if
//     given, else a detected coin, else the frame-width fallback.
// 3.  **Keep The Evidence**: The analysis returns the fired rules, the validation score,
//     the lesion region and the coin next to the assessment, so a caller can explain or
//     draw the result without recomputing it.

use image::RgbImage;
use log::{debug, info, warn};
use serde::Serialize;

use crate::core_modules::calibration::{self, Calibration, ScaleRatio};
use crate::core_modules::classifier::{self, LesionFeatures};
use crate::core_modules::filters;
use crate::core_modules::geometry::{self, round_to};
use crate::core_modules::region::Region;
use crate::core_modules::segmentation::{self, Segmentation};
use crate::core_modules::severity::{self, MeasuredLesion};
use crate::core_modules::utils::image_helper::image_helper;
use crate::core_modules::validator::{self, ColorCounts, ValidationScore, ValidationSignals};

/// The reported result for one skin photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkinAssessment {
    #[serde(rename = "type")]
    pub kind: String,
    /// cm², two decimals.
    pub surface_area: f64,
    /// mm, one decimal.
    pub length: f64,
    pub severity: String,
    pub advice: String,
    pub urgent: bool,
}

impl SkinAssessment {
    fn soft(kind: &str, severity: &str, advice: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            surface_area: 0.0,
            length: 0.0,
            severity: severity.to_string(),
            advice: advice.into(),
            urgent: false,
        }
    }

    pub fn indeterminate() -> Self {
        Self::soft("Indeterminate", "Image unclear", "No skin detected.")
    }

    pub fn healthy() -> Self {
        Self::soft("Healthy Skin", "No lesion detected", "Skin appears healthy.")
    }

    pub fn imprecise() -> Self {
        Self::soft("Imprecise Detection", "Detected area too large", "Check lighting.")
    }

    pub fn detection_error() -> Self {
        Self::soft("Detection Error", "Empty ROI", "Retry photo.")
    }

    pub fn below_gate(score: &ValidationScore) -> Self {
        Self::soft("Normal Skin", "No lesion", format!("Score: {}/{}. Healthy.", score.total(), validator::MAX_SCORE))
    }

    /// Zero severity: one of the soft outcomes.
    pub fn is_soft(&self) -> bool {
        self.surface_area == 0.0 && self.length == 0.0 && !self.urgent
    }
}

/// The assessment plus the evidence behind it.
#[derive(Debug, Clone)]
pub struct DermatologyAnalysis {
    pub assessment: SkinAssessment,
    pub scale: ScaleRatio,
    pub calibration: Option<Calibration>,
    pub lesion: Option<Region>,
    pub validation: Option<ValidationScore>,
    /// Names of the lesion and severity rules that fired.
    pub fired: Option<(&'static str, &'static str)>,
}

impl DermatologyAnalysis {
    fn outcome(assessment: SkinAssessment, scale: ScaleRatio, calibration: Option<Calibration>) -> Self {
        Self { assessment, scale, calibration, lesion: None, validation: None, fired: None }
    }

    /// A copy of `image` with the lesion outlined in red and the coin circled in yellow.
    pub fn annotate(&self, image: &RgbImage) -> RgbImage {
        let mut annotated = image.clone();
        if let Some(lesion) = &self.lesion {
            image_helper::outline_region(&mut annotated, lesion, image_helper::RED);
        }
        if let Some(calibration) = &self.calibration {
            let coin = calibration.coin;
            image_helper::draw_circle(&mut annotated, (coin.center_x, coin.center_y), coin.radius, image_helper::YELLOW);
        }
        annotated
    }
}

/// Analyses one skin photo. `scale` overrides coin calibration when given.
pub fn analyze_skin(image: &RgbImage, scale: Option<ScaleRatio>) -> DermatologyAnalysis {
    let calibration = match scale {
        Some(_) => None,
        None => calibration::detect_coin_reference(&filters::to_gray(image)),
    };
    if scale.is_none() && calibration.is_none() {
        warn!("no reference coin; assuming a {} mm wide field", calibration::FALLBACK_FIELD_WIDTH_MM);
    }
    let ratio = calibration::resolve_scale(scale, calibration.as_ref(), image.width());
    debug!("scale ratio {:.3} px/mm", ratio.value());

    let candidate = match segmentation::segment(image) {
        Segmentation::NoTissue => return DermatologyAnalysis::outcome(SkinAssessment::indeterminate(), ratio, calibration),
        Segmentation::NoCandidate { .. } => {
            return DermatologyAnalysis::outcome(SkinAssessment::healthy(), ratio, calibration);
        }
        Segmentation::TooLarge { .. } => {
            return DermatologyAnalysis::outcome(SkinAssessment::imprecise(), ratio, calibration);
        }
        Segmentation::Candidate(candidate) => candidate,
    };

    let Some(measured) = geometry::extract_candidate(
        &candidate.gray,
        &candidate.lesion,
        &candidate.lesion_mask,
        &candidate.tissue.mask,
        ratio,
    ) else {
        warn!("candidate region encloses no pixels");
        return DermatologyAnalysis::outcome(SkinAssessment::detection_error(), ratio, calibration);
    };

    let colors = ColorCounts::within(&candidate.bands, &candidate.lesion_mask);
    let signals = ValidationSignals::measure(measured.contrast(), &colors, &candidate.edges.raw, &candidate.lesion_mask);
    let score = validator::score(&signals);
    if !score.passes() {
        info!("candidate rejected by validation ({}/{})", score.total(), validator::MAX_SCORE);
        let mut analysis = DermatologyAnalysis::outcome(SkinAssessment::below_gate(&score), ratio, calibration);
        analysis.validation = Some(score);
        return analysis;
    }

    let features = LesionFeatures {
        red_count: colors.red,
        dark_count: colors.dark,
        bruise_count: colors.bruise,
        red_ratio: colors.red_ratio(),
        dark_ratio: colors.dark_ratio(),
        aspect_ratio: measured.geometry.aspect_ratio,
        mean: measured.intensity.mean,
        std_dev: measured.intensity.std_dev,
        intensity_range: measured.intensity.range(),
        laplacian_variance: measured.intensity.laplacian_variance,
        very_dark_fraction: measured.intensity.very_dark_fraction,
        area_cm2: measured.geometry.area_cm2,
    };
    let lesion = classifier::classify_lesion(&features);
    let graded = severity::assess_skin(&MeasuredLesion {
        lesion: lesion.outcome,
        length_mm: measured.geometry.length_mm,
        area_cm2: measured.geometry.area_cm2,
    });
    debug!("lesion rule '{}', severity rule '{}'", lesion.rule, graded.rule);

    let assessment = SkinAssessment {
        kind: lesion.outcome.label().to_string(),
        surface_area: round_to(measured.geometry.area_cm2, 2),
        length: round_to(measured.geometry.length_mm, 1),
        severity: graded.outcome.level.label().to_string(),
        advice: graded.outcome.advice.to_string(),
        urgent: graded.outcome.urgent,
    };
    info!("skin: {} / {} (urgent: {})", assessment.kind, assessment.severity, assessment.urgent);

    DermatologyAnalysis {
        assessment,
        scale: ratio,
        calibration,
        lesion: Some(candidate.lesion),
        validation: Some(score),
        fired: Some((lesion.rule, graded.rule)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const SKIN: Rgb<u8> = Rgb([220, 170, 140]);
    const BLOOD: Rgb<u8> = Rgb([200, 30, 30]);
    const DARK: Rgb<u8> = Rgb([40, 40, 40]);

    /// A 29 x 141 strip at (100, 80) on 300 x 300 skin, painted per pixel.
    fn skin_with_strip(paint: impl Fn(u32, u32) -> Rgb<u8>) -> RgbImage {
        RgbImage::from_fn(300, 300, |x, y| {
            if (100..129).contains(&x) && (80..221).contains(&y) { paint(x, y) } else { SKIN }
        })
    }

    #[test]
    fn uniform_skin_is_healthy() {
        let image = RgbImage::from_pixel(300, 300, SKIN);
        let analysis = analyze_skin(&image, None);
        assert_eq!(analysis.assessment.kind, "Healthy Skin");
        assert_eq!(analysis.assessment.severity, "No lesion detected");
        assert!(!analysis.assessment.urgent);
        assert!(analysis.calibration.is_none());
        assert_eq!(analysis.scale.value(), 2.0);
    }

    #[test]
    fn long_narrow_red_strip_is_an_urgent_cut() {
        // Half the strip is red, the other half dark, in a checkerboard.
        let image = skin_with_strip(|x, y| if (x + y) % 2 == 0 { BLOOD } else { DARK });
        let scale = ScaleRatio::new(4.0).expect("positive");
        let analysis = analyze_skin(&image, Some(scale));

        let lesion = analysis.lesion.as_ref().expect("lesion measured");
        let colours = ColorCounts::within(&segmentation::color_bands(&image), &lesion.to_mask(300, 300));
        assert!((colours.red_ratio() - 0.5).abs() < 0.01);
        assert_eq!(analysis.validation.map(|v| v.color), Some(3));

        assert_eq!(analysis.assessment.kind, "Cut");
        assert_eq!(analysis.assessment.severity, "HIGH");
        assert!(analysis.assessment.urgent);
        assert!(analysis.assessment.length > 30.0);
        assert_eq!(analysis.fired, Some(("narrow-red", "long-cut")));
        assert!(analysis.validation.expect("validated").passes());
    }

    #[test]
    fn single_red_pixel_has_a_positive_length() {
        let mut image = RgbImage::from_pixel(300, 300, SKIN);
        image.put_pixel(150, 150, BLOOD);
        let analysis = analyze_skin(&image, None);
        assert_eq!(analysis.lesion.as_ref().map(Region::area), Some(1));
        assert!(analysis.assessment.length > 0.0);
    }

    #[test]
    fn frame_without_skin_is_indeterminate() {
        let image = RgbImage::from_pixel(120, 120, Rgb([20, 40, 200]));
        let analysis = analyze_skin(&image, ScaleRatio::new(2.0).ok());
        assert_eq!(analysis.assessment, SkinAssessment::indeterminate());
        assert!(analysis.assessment.is_soft());
    }

    #[test]
    fn oversized_patch_is_imprecise() {
        let image = RgbImage::from_fn(300, 300, |x, y| {
            if (50..250).contains(&x) && (50..250).contains(&y) { BLOOD } else { SKIN }
        });
        let analysis = analyze_skin(&image, ScaleRatio::new(2.0).ok());
        assert_eq!(analysis.assessment.kind, "Imprecise Detection");
        assert!(analysis.lesion.is_none());
    }

    #[test]
    fn gate_advice_carries_the_score() {
        let score = ValidationScore { contrast: 1, color: 1, edges: 0 };
        let assessment = SkinAssessment::below_gate(&score);
        assert_eq!(assessment.kind, "Normal Skin");
        assert_eq!(assessment.advice, "Score: 2/8. Healthy.");
    }

    #[test]
    fn annotation_leaves_the_input_untouched() {
        let image = skin_with_strip(|_, _| BLOOD);
        let analysis = analyze_skin(&image, ScaleRatio::new(4.0).ok());
        let annotated = analysis.annotate(&image);
        // Left edge of the strip, away from the corners the opening rounds off.
        assert_eq!(*image.get_pixel(100, 150), BLOOD);
        assert_eq!(*annotated.get_pixel(100, 150), image_helper::RED);
    }

    #[test]
    fn serialises_kind_as_type() {
        let json = serde_json::to_value(SkinAssessment::healthy()).expect("serialise");
        assert_eq!(json["type"], "Healthy Skin");
        assert_eq!(json["urgent"], false);
    }
}
