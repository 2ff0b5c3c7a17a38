// THEORY:
// The `geometry` module turns a pixel region into numbers a clinician can read. It is
// the only layer that knows about physical units; everything before it counts pixels.
//
// Key architectural principles:
// 1.  **Scale In, Units Out**: Lesion measurements take a `ScaleRatio` (pixels per
//     millimetre). Area is reported in cm^2 (`px / ratio^2 / 100`), length in mm (the
//     long side of the minimal rotated rectangle over the ratio).
// 2.  **Interior Sampling Only**: Intensity statistics read only the pixels the region
//     encloses. The contrast reference reads a separate annulus: the region dilated by
//     a 15x15 ellipse, clipped to the tissue, minus the region itself.
// 3.  **Fixed Scan Spacing**: Scans (neurology) have no reference object; a constant
//     0.5 mm per pixel applies, and position relative to the frame (margins, distance
//     to centre) matters as much as size.
// 4.  **Empty Means Error**: A region with no interior pixels yields `None`, never a
//     division by zero.

use image::GrayImage;
use serde::Serialize;

use crate::core_modules::calibration::ScaleRatio;
use crate::core_modules::filters;
use crate::core_modules::mask::{Mask, StructuringElement};
use crate::core_modules::region::{Point, Region};
use crate::core_modules::shape::{self, RotatedRect};

/// Gray level below which an interior pixel counts as very dark.
pub const VERY_DARK_GRAY: u8 = 50;
pub const SURROUNDING_KERNEL: u32 = 15;
/// Millimetres per pixel of a resized scan.
pub const SCAN_MM_PER_PIXEL: f64 = 0.5;

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Size and shape of a lesion in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LesionGeometry {
    pub area_px: usize,
    pub area_cm2: f64,
    pub length_mm: f64,
    pub aspect_ratio: f64,
    pub rect: RotatedRect,
    pub centroid: (f64, f64),
}

pub fn measure_lesion(region: &Region, ratio: ScaleRatio) -> LesionGeometry {
    let ratio = ratio.value();
    let rect = shape::min_area_rect(&region.boundary());
    // A region spans at least one pixel even when its rectangle degenerates.
    let long_side = if region.area() > 0 { rect.long_side().max(1.0) } else { 0.0 };
    LesionGeometry {
        area_px: region.area(),
        area_cm2: region.area() as f64 / (ratio * ratio) / 100.0,
        length_mm: long_side / ratio,
        aspect_ratio: rect.aspect_ratio(),
        rect,
        centroid: region.center_of_mass,
    }
}

/// Gray-level statistics of a region's interior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityStats {
    pub pixel_count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: u8,
    pub max: u8,
    pub laplacian_variance: f64,
    pub very_dark_fraction: f64,
}

impl IntensityStats {
    /// `max - min` over the interior.
    pub fn range(&self) -> u8 {
        self.max - self.min
    }
}

/// Interior statistics, or `None` when the mask encloses nothing.
pub fn intensity_stats(gray: &GrayImage, mask: &Mask) -> Option<IntensityStats> {
    let stats = filters::SampleStats::of_masked(gray, mask);
    if stats.is_empty() {
        return None;
    }
    let laplacian = filters::laplacian(gray);
    let laplacian_variance = filters::variance(mask.iter_set().map(|(x, y)| laplacian[mask.index(x, y)]));
    let very_dark = mask.iter_set().filter(|&(x, y)| gray.get_pixel(x, y)[0] < VERY_DARK_GRAY).count();

    Some(IntensityStats {
        pixel_count: stats.count,
        mean: stats.mean,
        std_dev: stats.std_dev,
        min: stats.min,
        max: stats.max,
        laplacian_variance,
        very_dark_fraction: very_dark as f64 / stats.count as f64,
    })
}

/// The annulus around a region, inside the tissue.
pub fn surrounding_mask(region_mask: &Mask, tissue_mask: &Mask) -> Mask {
    region_mask
        .dilate(&StructuringElement::ellipse(SURROUNDING_KERNEL, SURROUNDING_KERNEL), 1)
        .intersection(tissue_mask)
        .xor(region_mask)
}

/// Mean gray level of the surrounding annulus, `None` when it is empty.
pub fn surrounding_mean(gray: &GrayImage, region_mask: &Mask, tissue_mask: &Mask) -> Option<f64> {
    let stats = filters::SampleStats::of_masked(gray, &surrounding_mask(region_mask, tissue_mask));
    (!stats.is_empty()).then_some(stats.mean)
}

/// A measured anomaly: shape, interior and context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyCandidate {
    pub geometry: LesionGeometry,
    pub intensity: IntensityStats,
    pub surrounding_mean: Option<f64>,
}

impl AnomalyCandidate {
    /// Absolute difference between interior and annulus means; 0 without an annulus.
    pub fn contrast(&self) -> f64 {
        self.surrounding_mean.map_or(0.0, |m| (self.intensity.mean - m).abs())
    }
}

/// Measures everything about a lesion, or `None` for an empty interior.
pub fn extract_candidate(
    gray: &GrayImage,
    lesion: &Region,
    lesion_mask: &Mask,
    tissue_mask: &Mask,
    ratio: ScaleRatio,
) -> Option<AnomalyCandidate> {
    let intensity = intensity_stats(gray, lesion_mask)?;
    Some(AnomalyCandidate {
        geometry: measure_lesion(lesion, ratio),
        intensity,
        surrounding_mean: surrounding_mean(gray, lesion_mask, tissue_mask),
    })
}

/// Raw morphometry of a scan region at the fixed scan spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TumorMorphometry {
    pub area_px: usize,
    pub area_cm2: f64,
    pub diameter_mm: f64,
    pub volume_cm3: f64,
    pub width_mm: f64,
    pub height_mm: f64,
    pub min_margin_mm: f64,
    pub distance_to_center_mm: f64,
    /// Enclosing-circle centre, truncated to whole pixels.
    pub center: (i64, i64),
    pub bounding_box: (Point, Point),
    pub frame: (u32, u32),
}

pub fn measure_tumor(region: &Region, frame_width: u32, frame_height: u32) -> TumorMorphometry {
    let circle = shape::min_enclosing_circle(&region.boundary());
    let center = (circle.center.x as i64, circle.center.y as i64);
    let diameter_mm = circle.radius * 2.0 * SCAN_MM_PER_PIXEL;

    let (min, max) = region.bounding_box;
    let margins = [
        min.y as i64,
        min.x as i64,
        frame_width as i64 - (max.x as i64 + 1),
        frame_height as i64 - (max.y as i64 + 1),
    ];
    let min_margin_px = margins.into_iter().min().unwrap_or(0);

    let frame_center = ((frame_width / 2) as i64, (frame_height / 2) as i64);
    let distance_px = (((center.0 - frame_center.0).pow(2) + (center.1 - frame_center.1).pow(2)) as f64).sqrt();

    TumorMorphometry {
        area_px: region.area(),
        area_cm2: region.area() as f64 * SCAN_MM_PER_PIXEL * SCAN_MM_PER_PIXEL / 100.0,
        diameter_mm,
        volume_cm3: 4.0 / 3.0 * std::f64::consts::PI * (diameter_mm / 2.0).powi(3) / 1000.0,
        width_mm: region.box_width() as f64 * SCAN_MM_PER_PIXEL,
        height_mm: region.box_height() as f64 * SCAN_MM_PER_PIXEL,
        min_margin_mm: min_margin_px as f64 * SCAN_MM_PER_PIXEL,
        distance_to_center_mm: distance_px * SCAN_MM_PER_PIXEL,
        center,
        bounding_box: region.bounding_box,
        frame: (frame_width, frame_height),
    }
}

/// Reported scan measurements, rounded for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TumorMeasurements {
    pub area: f64,
    pub diameter: f64,
    pub volume: f64,
    pub width: f64,
    pub height: f64,
    pub region: String,
    pub min_margin: f64,
    pub distance_to_center: f64,
}

impl TumorMorphometry {
    pub fn report(&self, region: &str) -> TumorMeasurements {
        TumorMeasurements {
            area: round_to(self.area_cm2, 2),
            diameter: round_to(self.diameter_mm, 1),
            volume: round_to(self.volume_cm3, 2),
            width: round_to(self.width_mm, 1),
            height: round_to(self.height_mm, 1),
            region: region.to_string(),
            min_margin: round_to(self.min_margin_mm, 1),
            distance_to_center: round_to(self.distance_to_center_mm, 1),
        }
    }
}
