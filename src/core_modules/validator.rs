// THEORY:
// The `validator` is the gate between "something was segmented" and "something is
// wrong". It does not classify; it only asks whether independent evidence agrees that
// the candidate is real.
//
// Three buckets, each scored by threshold tier, summed into 0..=8:
// - contrast of the interior against its annulus: >20 -> 3, >10 -> 2, >5 -> 1
// - the dominant colour ratio (red, dark or bruise share of the interior):
//   >0.4 -> 3, >0.25 -> 2, >0.15 -> 1
// - raw Canny edge density inside the candidate: >0.3 -> 2, >0.15 -> 1
//
// A total below 3 means the candidate is skin that happens to pass the colour bands,
// and the image is reported as normal without ever reaching the classifier. Every
// threshold is strict, so a value sitting exactly on a tier edge scores the lower tier.

use log::debug;
use serde::Serialize;

use crate::core_modules::mask::Mask;
use crate::core_modules::segmentation::ColorBands;

pub const MIN_PASSING_SCORE: u8 = 3;
pub const MAX_SCORE: u8 = 8;

/// Pixel counts of each colour band inside a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorCounts {
    pub red: usize,
    pub dark: usize,
    pub bruise: usize,
    pub total: usize,
}

impl ColorCounts {
    pub fn within(bands: &ColorBands, region_mask: &Mask) -> Self {
        Self {
            red: bands.red.overlap(region_mask),
            dark: bands.dark.overlap(region_mask),
            bruise: bands.bruise.overlap(region_mask),
            total: region_mask.count(),
        }
    }

    fn ratio(&self, count: usize) -> f64 {
        if self.total == 0 { 0.0 } else { count as f64 / self.total as f64 }
    }

    pub fn red_ratio(&self) -> f64 {
        self.ratio(self.red)
    }

    pub fn dark_ratio(&self) -> f64 {
        self.ratio(self.dark)
    }

    pub fn bruise_ratio(&self) -> f64 {
        self.ratio(self.bruise)
    }

    pub fn dominant_ratio(&self) -> f64 {
        self.red_ratio().max(self.dark_ratio()).max(self.bruise_ratio())
    }
}

/// The raw evidence the score is computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationSignals {
    pub contrast: f64,
    pub dominant_color_ratio: f64,
    pub edge_density: f64,
}

impl ValidationSignals {
    pub fn measure(contrast: f64, colors: &ColorCounts, edges: &Mask, region_mask: &Mask) -> Self {
        let total = region_mask.count();
        let edge_density = if total == 0 { 0.0 } else { edges.overlap(region_mask) as f64 / total as f64 };
        Self { contrast, dominant_color_ratio: colors.dominant_ratio(), edge_density }
    }
}

/// Points per bucket. `total()` is always within `0..=MAX_SCORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationScore {
    pub contrast: u8,
    pub color: u8,
    pub edges: u8,
}

impl ValidationScore {
    pub fn total(&self) -> u8 {
        self.contrast + self.color + self.edges
    }

    pub fn passes(&self) -> bool {
        self.total() >= MIN_PASSING_SCORE
    }
}

pub fn contrast_points(contrast: f64) -> u8 {
    match contrast {
        c if c > 20.0 => 3,
        c if c > 10.0 => 2,
        c if c > 5.0 => 1,
        _ => 0,
    }
}

pub fn color_points(dominant_ratio: f64) -> u8 {
    match dominant_ratio {
        r if r > 0.4 => 3,
        r if r > 0.25 => 2,
        r if r > 0.15 => 1,
        _ => 0,
    }
}

pub fn edge_points(edge_density: f64) -> u8 {
    match edge_density {
        d if d > 0.3 => 2,
        d if d > 0.15 => 1,
        _ => 0,
    }
}

pub fn score(signals: &ValidationSignals) -> ValidationScore {
    let score = ValidationScore {
        contrast: contrast_points(signals.contrast),
        color: color_points(signals.dominant_color_ratio),
        edges: edge_points(signals.edge_density),
    };
    debug!("validation {:?} -> {}/{}", signals, score.total(), MAX_SCORE);
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(contrast: f64, color: f64, edges: f64) -> ValidationSignals {
        ValidationSignals { contrast, dominant_color_ratio: color, edge_density: edges }
    }

    #[test]
    fn contrast_tier_edges_are_strict() {
        assert_eq!(contrast_points(21.0), 3);
        assert_eq!(contrast_points(20.0), 2);
        assert_eq!(contrast_points(10.0), 1);
        assert_eq!(contrast_points(5.0), 0);
        assert_eq!(contrast_points(5.0001), 1);
    }

    #[test]
    fn color_and_edge_tier_edges() {
        assert_eq!(color_points(0.41), 3);
        assert_eq!(color_points(0.4), 2);
        assert_eq!(color_points(0.25), 1);
        assert_eq!(color_points(0.15), 0);
        assert_eq!(edge_points(0.3), 1);
        assert_eq!(edge_points(0.31), 2);
        assert_eq!(edge_points(0.15), 0);
    }

    #[test]
    fn score_is_bounded() {
        assert_eq!(score(&signals(255.0, 1.0, 1.0)).total(), MAX_SCORE);
        assert_eq!(score(&signals(0.0, 0.0, 0.0)).total(), 0);
        for contrast in [0.0, 5.0, 6.0, 10.0, 11.0, 20.0, 21.0, 200.0] {
            for color in [0.0, 0.15, 0.2, 0.25, 0.3, 0.4, 0.5] {
                for edges in [0.0, 0.15, 0.2, 0.3, 0.4] {
                    assert!(score(&signals(contrast, color, edges)).total() <= MAX_SCORE);
                }
            }
        }
    }

    #[test]
    fn gate_at_three_points() {
        // 2 + 0 + 0: rejected
        assert!(!score(&signals(20.0, 0.0, 0.0)).passes());
        // 3 + 0 + 0: accepted
        assert!(score(&signals(21.0, 0.0, 0.0)).passes());
        // 1 + 1 + 1: accepted
        assert!(score(&signals(6.0, 0.2, 0.2)).passes());
        // 0 + 2 + 0: rejected
        assert!(!score(&signals(0.0, 0.3, 0.0)).passes());
        // 0 + 2 + 1: accepted
        assert!(score(&signals(0.0, 0.3, 0.3)).passes());
    }

    #[test]
    fn counts_and_density_within_region() {
        let region = Mask::from_fn(10, 10, |x, _| x < 5);
        let bands = ColorBands {
            red: Mask::from_fn(10, 10, |x, y| x < 5 && y < 5),
            dark: Mask::from_fn(10, 10, |x, _| x == 9),
            bruise: Mask::new(10, 10),
        };
        let counts = ColorCounts::within(&bands, &region);
        assert_eq!(counts, ColorCounts { red: 25, dark: 0, bruise: 0, total: 50 });
        assert_eq!(counts.dominant_ratio(), 0.5);

        let edges = Mask::from_fn(10, 10, |x, _| x == 0);
        let s = ValidationSignals::measure(12.0, &counts, &edges, &region);
        assert!((s.edge_density - 0.2).abs() < 1e-12);
        assert_eq!(score(&s), ValidationScore { contrast: 2, color: 3, edges: 1 });
    }

    #[test]
    fn red_share_of_exactly_four_tenths_scores_the_lower_tier() {
        let region = Mask::from_fn(10, 10, |_, _| true);
        let bands_with_red_rows = |rows: u32| ColorBands {
            red: Mask::from_fn(10, 10, |_, y| y < rows),
            dark: Mask::from_fn(10, 10, |_, y| y == 9),
            bruise: Mask::new(10, 10),
        };

        let at_edge = ColorCounts::within(&bands_with_red_rows(4), &region);
        assert_eq!(at_edge.red_ratio(), 0.4);
        assert_eq!(color_points(at_edge.dominant_ratio()), 2);

        let above = ColorCounts::within(&bands_with_red_rows(5), &region);
        assert_eq!(above.red_ratio(), 0.5);
        assert_eq!(color_points(above.dominant_ratio()), 3);
    }
}
