// THEORY:
// The `neurology` module grades a brain scan that an external classifier has already
// scored. The classifier says whether there is a tumour; this module says where it is,
// how big it is and how worried to be.
//
// Key architectural principles:
// 1.  **Confidence Gate**: Below the configured confidence the scan is "Healthy" and no
//     morphometry runs. A confidence outside 0-100 is malformed input.
// 2.  **Heatmap In, Region Out**: The tumour outline comes from a probability heatmap.
//     A detector may supply one; otherwise it is derived from the scan itself by
//     stretching contrast and keeping the brightest, smoothed structure.
// 3.  **Fixed Spacing**: Every scan is measured on the resized grid at 0.5 mm/pixel.
//     Region, risk and recommendations are pure functions of those millimetres.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use log::{debug, info};
use serde::Serialize;

use crate::config::TriageConfig;
use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::classifier::{self, ScanPosition};
use crate::core_modules::filters;
use crate::core_modules::geometry::{self, TumorMeasurements, TumorMorphometry, round_to};
use crate::core_modules::mask::{Mask, StructuringElement};
use crate::core_modules::region::Region;
use crate::core_modules::severity::{self, Recommendation, RiskAssessment, RiskInput, RiskLevel};
use crate::core_modules::utils::image_helper::image_helper;
use crate::error::{Result, TriageError};

/// Heatmap level above which a pixel belongs to the tumour.
pub const HEATMAP_THRESHOLD: u8 = 150;
/// Share of the brightest stretched level kept when deriving a heatmap.
pub const DERIVED_HEATMAP_CUTOFF: f64 = 0.7;
const DERIVED_OPEN_SIZE: u32 = 5;
const DERIVED_BLUR_KERNEL: u32 = 41;

/// Measurements, risk and actions for a detected tumour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvancedAnalysis {
    pub measurements: TumorMeasurements,
    pub risk: RiskAssessment,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeuroAssessment {
    pub diagnosis: String,
    /// Classifier confidence, percent, one decimal.
    pub confidence: f64,
    pub threshold_met: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedAnalysis>,
}

#[derive(Debug, Clone)]
pub struct NeuroAnalysis {
    pub assessment: NeuroAssessment,
    pub morphometry: Option<TumorMorphometry>,
    pub region: Option<Region>,
}

impl NeuroAnalysis {
    /// The scan resized to the measured grid, with the tumour boxed in the colour of
    /// its risk level. `None` when nothing was measured.
    pub fn annotate(&self, scan: &RgbImage) -> Option<RgbImage> {
        let morphometry = self.morphometry?;
        let level = self.assessment.advanced.as_ref()?.risk.level;
        let (width, height) = morphometry.frame;
        let mut annotated = imageops::resize(scan, width, height, FilterType::Triangle);
        image_helper::draw_box(&mut annotated, morphometry.bounding_box, level_colour(level));
        Some(annotated)
    }
}

pub fn level_colour(level: RiskLevel) -> image::Rgb<u8> {
    match level {
        RiskLevel::High => image_helper::RED,
        RiskLevel::Moderate => image_helper::ORANGE,
        RiskLevel::Low => image_helper::GREEN,
    }
}

/// The scan as a square gray image of side `scan_size`.
pub fn prepare_scan(scan: &RgbImage, scan_size: u32) -> GrayImage {
    let gray = filters::to_gray(scan);
    if gray.dimensions() == (scan_size, scan_size) {
        return gray;
    }
    imageops::resize(&gray, scan_size, scan_size, FilterType::Triangle)
}

/// Linear stretch of the gray range to 0..=255.
pub fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let stats = filters::SampleStats::from_samples(gray.pixels().map(|p| p[0]));
    if stats.is_empty() || stats.range() == 0 {
        return gray.clone();
    }
    let (low, span) = (stats.min as f64, stats.range() as f64);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([((gray.get_pixel(x, y)[0] as f64 - low) * 255.0 / span).round() as u8])
    })
}

/// Heatmap derived from the scan itself: the brightest structure, opened and smoothed.
pub fn derive_heatmap(scan_gray: &GrayImage) -> GrayImage {
    let stretched = stretch_contrast(scan_gray);
    let peak = stretched.pixels().map(|p| p[0]).max().unwrap_or(0) as f64;
    let cutoff = peak * DERIVED_HEATMAP_CUTOFF;
    let hot = Mask::from_fn(stretched.width(), stretched.height(), |x, y| stretched.get_pixel(x, y)[0] as f64 > cutoff)
        .open(&StructuringElement::rect(DERIVED_OPEN_SIZE, DERIVED_OPEN_SIZE), 2);
    filters::gaussian_blur(&hot.to_gray(), DERIVED_BLUR_KERNEL)
}

/// Largest hot component of a heatmap, cleaned with a 3x3 close and open.
pub fn measure_heatmap(heatmap: &GrayImage) -> Option<Region> {
    let square = StructuringElement::rect(3, 3);
    let hot = Mask::from_fn(heatmap.width(), heatmap.height(), |x, y| heatmap.get_pixel(x, y)[0] > HEATMAP_THRESHOLD)
        .close(&square, 2)
        .open(&square, 1);
    blob_detector::largest_region(&hot)
}

/// Region, risk and recommendations for a measured tumour.
pub fn assess_tumor(morphometry: &TumorMorphometry, confidence: f64) -> AdvancedAnalysis {
    let (width, height) = morphometry.frame;
    let region = classifier::classify_brain_region(&ScanPosition {
        x: morphometry.center.0 as f64,
        y: morphometry.center.1 as f64,
        width: width as f64,
        height: height as f64,
    })
    .outcome;
    let risk = severity::assess_risk(&RiskInput {
        volume_cm3: morphometry.volume_cm3,
        diameter_mm: morphometry.diameter_mm,
        confidence,
        distance_to_center_mm: morphometry.distance_to_center_mm,
        area_px: morphometry.area_px,
        region,
        min_margin_mm: morphometry.min_margin_mm,
    });
    let recommendations = severity::recommendations(risk.level, morphometry.volume_cm3);
    AdvancedAnalysis { measurements: morphometry.report(region.label()), risk, recommendations }
}

/// Grades a scan given the classifier's confidence (percent) and an optional heatmap.
pub fn analyze_scan(
    scan: &RgbImage,
    confidence: f64,
    heatmap: Option<&GrayImage>,
    config: &TriageConfig,
) -> Result<NeuroAnalysis> {
    if !(0.0..=100.0).contains(&confidence) {
        return Err(TriageError::InvalidConfidence(confidence));
    }
    let detected = confidence >= config.tumor_confidence_gate;
    let mut assessment = NeuroAssessment {
        diagnosis: if detected { "Tumor Detected" } else { "Healthy" }.to_string(),
        confidence: round_to(confidence, 1),
        threshold_met: detected,
        advanced: None,
    };
    if !detected {
        info!("scan below tumour gate ({confidence:.1}% < {:.1}%)", config.tumor_confidence_gate);
        return Ok(NeuroAnalysis { assessment, morphometry: None, region: None });
    }

    let derived;
    let heatmap = match heatmap {
        Some(supplied) => supplied,
        None => {
            derived = derive_heatmap(&prepare_scan(scan, config.scan_size));
            &derived
        }
    };
    let Some(region) = measure_heatmap(heatmap) else {
        info!("tumour reported but no heatmap region above {HEATMAP_THRESHOLD}");
        return Ok(NeuroAnalysis { assessment, morphometry: None, region: None });
    };
    debug!("tumour region: {} px, box {:?}", region.area(), region.bounding_box);

    let morphometry = geometry::measure_tumor(&region, heatmap.width(), heatmap.height());
    let advanced = assess_tumor(&morphometry, confidence);
    info!(
        "tumour in {}: risk {} ({:?})",
        advanced.measurements.region, advanced.risk.score, advanced.risk.level
    );
    assessment.advanced = Some(advanced);

    Ok(NeuroAnalysis { assessment, morphometry: Some(morphometry), region: Some(region) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn disc(size: u32, center: (i64, i64), radius: i64, inside: u8, outside: u8) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let (dx, dy) = (x as i64 - center.0, y as i64 - center.1);
            Luma([if dx * dx + dy * dy <= radius * radius { inside } else { outside }])
        })
    }

    fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
        RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
            let v = gray.get_pixel(x, y)[0];
            Rgb([v, v, v])
        })
    }

    #[test]
    fn below_gate_is_healthy() {
        let scan = RgbImage::new(224, 224);
        let analysis = analyze_scan(&scan, 50.0, None, &TriageConfig::default()).expect("valid input");
        assert_eq!(analysis.assessment.diagnosis, "Healthy");
        assert!(!analysis.assessment.threshold_met);
        assert!(analysis.assessment.advanced.is_none());
    }

    #[test]
    fn confidence_outside_percent_range_is_rejected() {
        let scan = RgbImage::new(8, 8);
        let config = TriageConfig::default();
        assert!(matches!(analyze_scan(&scan, 120.0, None, &config), Err(TriageError::InvalidConfidence(_))));
        assert!(analyze_scan(&scan, f64::NAN, None, &config).is_err());
    }

    #[test]
    fn large_frontal_tumour_is_high_risk() {
        let heatmap = disc(224, (112, 60), 50, 255, 0);
        let scan = gray_to_rgb(&heatmap);
        let analysis = analyze_scan(&scan, 97.0, Some(&heatmap), &TriageConfig::default()).expect("valid input");

        let advanced = analysis.assessment.advanced.as_ref().expect("measured");
        assert_eq!(analysis.assessment.diagnosis, "Tumor Detected");
        assert_eq!(advanced.measurements.region, "Frontal Lobe");
        assert!(advanced.measurements.volume > 50.0);
        assert_eq!(advanced.risk.score, 100);
        assert_eq!(advanced.risk.level, RiskLevel::High);
        assert_eq!(advanced.risk.priority, "URGENT");
        assert!(advanced.recommendations.iter().any(|r| r.timeframe == "Within 48h"));
        assert!(advanced.recommendations.iter().any(|r| r.action == "Consider surgical resection"));
    }

    #[test]
    fn heatmap_derived_from_a_bright_mass() {
        let scan = gray_to_rgb(&disc(224, (150, 150), 40, 220, 60));
        let analysis = analyze_scan(&scan, 90.0, None, &TriageConfig::default()).expect("valid input");
        let morphometry = analysis.morphometry.expect("derived heatmap yields a region");
        assert!((morphometry.center.0 - 150).abs() <= 2);
        assert!((morphometry.center.1 - 150).abs() <= 2);
        assert_eq!(morphometry.frame, (224, 224));
    }

    #[test]
    fn dark_heatmap_reports_detection_without_measurements() {
        let scan = RgbImage::new(224, 224);
        let heatmap = GrayImage::new(224, 224);
        let analysis = analyze_scan(&scan, 80.0, Some(&heatmap), &TriageConfig::default()).expect("valid input");
        assert!(analysis.assessment.threshold_met);
        assert!(analysis.assessment.advanced.is_none());
        assert!(analysis.annotate(&scan).is_none());
    }

    #[test]
    fn annotation_uses_the_risk_colour() {
        let heatmap = disc(224, (112, 60), 50, 255, 0);
        let scan = gray_to_rgb(&heatmap);
        let analysis = analyze_scan(&scan, 97.0, Some(&heatmap), &TriageConfig::default()).expect("valid input");
        let annotated = analysis.annotate(&scan).expect("measured");
        let (min, _) = analysis.morphometry.expect("measured").bounding_box;
        assert_eq!(*annotated.get_pixel(min.x, min.y), image_helper::RED);
    }

    #[test]
    fn stretch_maps_range_to_full_scale() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([[50, 100, 150][x as usize]]));
        let stretched = stretch_contrast(&gray);
        assert_eq!(stretched.get_pixel(0, 0)[0], 0);
        assert_eq!(stretched.get_pixel(2, 0)[0], 255);
    }
}
