// THEORY:
// The `calibration` module turns pixels into millimetres. A photo that contains a
// coin of known diameter can be measured; a photo without one falls back to an
// assumed field of view.
//
// Algorithm steps:
// 1.  **Edges and Gradients**: The gray frame is median-blurred (5x5) to suppress
//     texture, then Canny (50/100) marks boundary pixels and Sobel gives each boundary
//     pixel its gradient direction.
// 2.  **Centre Voting**: Every edge pixel casts one vote per radius in the search
//     window (20-100 px), walking both ways along its gradient. Circle centres collect
//     votes from their whole rim; everything else collects a handful.
// 3.  **Centre Selection**: Local maxima above 25 votes become candidates, strongest
//     first, each at least 30 px from every centre already accepted.
// 4.  **Radius Estimation**: Edge distances to a candidate centre are histogrammed; the
//     best-supported radius is then refined from the area of the uniform disc it
//     encloses, which is stable to the half-pixel jitter of edge localisation.
// 5.  **Coin Validation**: Circles crossing the frame are dropped, as are circles whose
//     interior intensity standard deviation reaches 40 (textured, so not a coin). The
//     largest surviving circle gives `ratio = 2 * radius / 23.0` pixels per millimetre.

use image::GrayImage;
use log::debug;
use serde::Serialize;

use crate::core_modules::filters::{self, SampleStats};
use crate::error::TriageError;

/// Assumed physical diameter of the reference coin, in millimetres.
pub const COIN_DIAMETER_MM: f64 = 23.0;
/// Assumed physical width of the photographed field, in millimetres.
pub const FALLBACK_FIELD_WIDTH_MM: f64 = 150.0;

pub const MIN_RADIUS: u32 = 20;
pub const MAX_RADIUS: u32 = 100;
pub const MIN_CENTER_DISTANCE: f64 = 30.0;
pub const ACCUMULATOR_THRESHOLD: u32 = 25;
pub const MAX_INTERIOR_STD_DEV: f64 = 40.0;

const MEDIAN_KERNEL: u32 = 5;
const CANNY_HIGH: f32 = 100.0;
const CANNY_LOW: f32 = CANNY_HIGH / 2.0;
const MAX_CENTER_CANDIDATES: usize = 32;

/// Pixels per millimetre. Established once per image, read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct ScaleRatio(f64);

impl ScaleRatio {
    /// A caller-supplied ratio; must be finite and positive.
    pub fn new(pixels_per_mm: f64) -> Result<Self, TriageError> {
        if pixels_per_mm.is_finite() && pixels_per_mm > 0.0 {
            Ok(Self(pixels_per_mm))
        } else {
            Err(TriageError::InvalidScale(pixels_per_mm))
        }
    }

    /// Ratio implied by a coin of the given pixel radius.
    pub fn from_coin_radius(radius_px: u32) -> Self {
        Self((radius_px.max(1) * 2) as f64 / COIN_DIAMETER_MM)
    }

    /// Ratio assumed when no reference object is visible.
    pub fn fallback_for_width(image_width_px: u32) -> Self {
        Self(image_width_px.max(1) as f64 / FALLBACK_FIELD_WIDTH_MM)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// A circle found by the detector, in integer pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectedCircle {
    pub center_x: i64,
    pub center_y: i64,
    pub radius: u32,
    pub votes: u32,
}

/// The accepted reference coin and the ratio it implies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    pub ratio: ScaleRatio,
    pub coin: DetectedCircle,
    pub interior_std_dev: f64,
}

/// Finds the reference coin, if any. Pure function of the image.
pub fn detect_coin_reference(gray: &GrayImage) -> Option<Calibration> {
    let (width, height) = (gray.width() as i64, gray.height() as i64);

    let best = detect_circles(gray)
        .into_iter()
        .filter(|c| {
            let r = c.radius as i64;
            c.center_x - r >= 0 && c.center_y - r >= 0 && c.center_x + r < width && c.center_y + r < height
        })
        .filter_map(|c| {
            let std_dev = interior_stats(gray, &c).std_dev;
            debug!("circle at ({}, {}) r={} interior std {:.1}", c.center_x, c.center_y, c.radius, std_dev);
            (std_dev < MAX_INTERIOR_STD_DEV).then_some((c, std_dev))
        })
        .max_by_key(|(c, _)| c.radius)?;

    let (coin, interior_std_dev) = best;
    Some(Calibration { ratio: ScaleRatio::from_coin_radius(coin.radius), coin, interior_std_dev })
}

/// Resolves the ratio to measure with: caller-supplied, else coin, else fallback.
pub fn resolve_scale(
    supplied: Option<ScaleRatio>,
    calibration: Option<&Calibration>,
    image_width_px: u32,
) -> ScaleRatio {
    supplied
        .or_else(|| calibration.map(|c| c.ratio))
        .unwrap_or_else(|| ScaleRatio::fallback_for_width(image_width_px))
}

fn interior_stats(gray: &GrayImage, circle: &DetectedCircle) -> SampleStats {
    let r = circle.radius as i64;
    let r2 = r * r;
    let mut samples = Vec::new();
    for y in (circle.center_y - r).max(0)..=(circle.center_y + r).min(gray.height() as i64 - 1) {
        for x in (circle.center_x - r).max(0)..=(circle.center_x + r).min(gray.width() as i64 - 1) {
            let (dx, dy) = (x - circle.center_x, y - circle.center_y);
            if dx * dx + dy * dy <= r2 {
                samples.push(gray.get_pixel(x as u32, y as u32)[0]);
            }
        }
    }
    SampleStats::from_samples(samples.into_iter())
}

/// Gradient Hough circle detection over the radius window.
pub fn detect_circles(gray: &GrayImage) -> Vec<DetectedCircle> {
    let (width, height) = (gray.width() as i64, gray.height() as i64);
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let blurred = filters::median_blur(gray, MEDIAN_KERNEL);
    let edges = filters::canny_edges(&blurred, CANNY_LOW, CANNY_HIGH);
    let (gx, gy) = filters::sobel(&blurred);
    let edge_points: Vec<(i64, i64)> = edges.iter_set().map(|(x, y)| (x as i64, y as i64)).collect();
    debug!("circle search over {} edge pixels", edge_points.len());

    // --- 1. Centre voting ---
    let mut accumulator = vec![0u32; (width * height) as usize];
    for &(x, y) in &edge_points {
        let dx = gx.get_pixel(x as u32, y as u32)[0] as f64;
        let dy = gy.get_pixel(x as u32, y as u32)[0] as f64;
        let magnitude = dx.hypot(dy);
        if magnitude < 1e-6 {
            continue;
        }
        let (ux, uy) = (dx / magnitude, dy / magnitude);
        for sign in [1.0, -1.0] {
            for r in MIN_RADIUS..=MAX_RADIUS {
                let cx = (x as f64 + sign * ux * r as f64).round() as i64;
                let cy = (y as f64 + sign * uy * r as f64).round() as i64;
                if cx < 0 || cy < 0 || cx >= width || cy >= height {
                    break;
                }
                accumulator[(cy * width + cx) as usize] += 1;
            }
        }
    }

    // --- 2. Centre candidates: 4-neighbour local maxima above threshold ---
    let mut centers: Vec<(i64, i64, u32)> = Vec::new();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let i = (y * width + x) as usize;
            let votes = accumulator[i];
            if votes > ACCUMULATOR_THRESHOLD
                && votes > accumulator[i - 1]
                && votes >= accumulator[i + 1]
                && votes > accumulator[i - width as usize]
                && votes >= accumulator[i + width as usize]
            {
                centers.push((x, y, votes));
            }
        }
    }
    centers.sort_by(|a, b| b.2.cmp(&a.2));

    // --- 3. Minimum centre spacing, then radius per centre ---
    let mut accepted: Vec<DetectedCircle> = Vec::new();
    for (cx, cy, votes) in centers {
        if accepted.len() >= MAX_CENTER_CANDIDATES {
            break;
        }
        let too_close = accepted.iter().any(|c| {
            (((c.center_x - cx).pow(2) + (c.center_y - cy).pow(2)) as f64).sqrt() < MIN_CENTER_DISTANCE
        });
        if too_close {
            continue;
        }
        if let Some(radius) = estimate_radius(&edge_points, cx, cy) {
            let radius = refine_radius(gray, cx, cy, radius);
            accepted.push(DetectedCircle { center_x: cx, center_y: cy, radius, votes });
        }
    }
    accepted
}

/// Best-supported edge distance from the centre, inside the radius window.
fn estimate_radius(edge_points: &[(i64, i64)], cx: i64, cy: i64) -> Option<u32> {
    let mut histogram = vec![0u32; MAX_RADIUS as usize + 2];
    for &(x, y) in edge_points {
        let distance = (((x - cx).pow(2) + (y - cy).pow(2)) as f64).sqrt().round() as u32;
        if (MIN_RADIUS..=MAX_RADIUS).contains(&distance) {
            histogram[distance as usize] += 1;
        }
    }
    (MIN_RADIUS..=MAX_RADIUS)
        .map(|r| {
            let support = histogram[r as usize - 1] + histogram[r as usize] + histogram[r as usize + 1];
            (r, support)
        })
        .filter(|&(_, support)| support >= ACCUMULATOR_THRESHOLD)
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(r, _)| r)
}

/// Radius of the disc of interior-like pixels around the centre.
///
/// The threshold splits the median inside half the radius from the median of a thin
/// ring just outside it; the qualifying pixel count within `radius + 3` gives the
/// radius of the equal-area disc. Falls back to the edge estimate without contrast.
fn refine_radius(gray: &GrayImage, cx: i64, cy: i64, radius: u32) -> u32 {
    let r = radius as f64;
    let mut inner = Vec::new();
    let mut ring = Vec::new();
    let mut window = Vec::new();
    let reach = (r + 4.0).ceil() as i64;
    for y in (cy - reach).max(0)..=(cy + reach).min(gray.height() as i64 - 1) {
        for x in (cx - reach).max(0)..=(cx + reach).min(gray.width() as i64 - 1) {
            let d = (((x - cx).pow(2) + (y - cy).pow(2)) as f64).sqrt();
            let v = gray.get_pixel(x as u32, y as u32)[0];
            if d <= r * 0.5 {
                inner.push(v);
            }
            if d > r + 2.0 && d <= r + 4.0 {
                ring.push(v);
            }
            if d <= r + 3.0 {
                window.push(v);
            }
        }
    }
    let (Some(inside), Some(outside)) = (median(&mut inner), median(&mut ring)) else {
        return radius;
    };
    if inside == outside {
        return radius;
    }
    let threshold = (inside as f64 + outside as f64) / 2.0;
    let count = window
        .iter()
        .filter(|&&v| if inside > outside { v as f64 > threshold } else { (v as f64) < threshold })
        .count();
    let refined = (count as f64 / std::f64::consts::PI).sqrt().round() as u32;
    // The refinement only corrects localisation jitter, never the order of magnitude.
    if refined.abs_diff(radius) <= 3 { refined } else { radius }
}

fn median(values: &mut [u8]) -> Option<u8> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    Some(values[values.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn coin_image(size: u32, cx: i64, cy: i64, radius: i64) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let (dx, dy) = (x as i64 - cx, y as i64 - cy);
            if dx * dx + dy * dy <= radius * radius {
                // Alternating rows of 140/160: interior std dev of 10.
                Luma([if y % 2 == 0 { 140 } else { 160 }])
            } else {
                Luma([40])
            }
        })
    }

    #[test]
    fn coin_of_radius_46_gives_ratio_4() {
        let gray = coin_image(300, 150, 150, 46);
        let calibration = detect_coin_reference(&gray).expect("coin should be found");
        assert_eq!(calibration.coin.radius, 46);
        assert!(calibration.interior_std_dev < MAX_INTERIOR_STD_DEV);
        assert_eq!(calibration.ratio.value(), 92.0 / 23.0);
        assert_eq!(calibration.ratio.value(), 4.0);
    }

    #[test]
    fn blank_frame_has_no_coin() {
        let gray = GrayImage::from_pixel(200, 200, Luma([120]));
        assert!(detect_coin_reference(&gray).is_none());
    }

    #[test]
    fn coin_crossing_the_frame_is_rejected() {
        let gray = coin_image(200, 20, 100, 40);
        assert!(detect_coin_reference(&gray).is_none());
    }

    #[test]
    fn textured_disc_is_not_a_coin() {
        let gray = GrayImage::from_fn(300, 300, |x, y| {
            let (dx, dy) = (x as i64 - 150, y as i64 - 150);
            if dx * dx + dy * dy <= 50 * 50 {
                // Rows alternating 20/240 with 8-pixel period: std dev 110.
                Luma([if (y / 8) % 2 == 0 { 20 } else { 240 }])
            } else {
                Luma([130])
            }
        });
        let calibration = detect_coin_reference(&gray);
        assert!(calibration.is_none());
        assert_eq!(resolve_scale(None, calibration.as_ref(), 300).value(), 2.0);
    }

    #[test]
    fn fallback_ratio_is_width_over_150() {
        assert_eq!(ScaleRatio::fallback_for_width(300).value(), 2.0);
        let resolved = resolve_scale(None, None, 300);
        assert_eq!(resolved.value(), 2.0);
    }

    #[test]
    fn supplied_ratio_wins_over_coin() {
        let supplied = ScaleRatio::new(7.5).expect("valid ratio");
        let resolved = resolve_scale(Some(supplied), None, 300);
        assert_eq!(resolved.value(), 7.5);
    }

    #[test]
    fn invalid_ratios_are_rejected() {
        assert!(ScaleRatio::new(0.0).is_err());
        assert!(ScaleRatio::new(-2.0).is_err());
        assert!(ScaleRatio::new(f64::NAN).is_err());
    }
}
