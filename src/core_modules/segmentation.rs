// THEORY:
// The `segmentation` module is the first analytical layer: it decides WHERE to look.
// It produces two things from a raw RGB frame: the tissue region (the skin the
// photo is about) and, inside it, the single anomaly candidate worth measuring.
//
// Key architectural principles:
// 1.  **Tissue First**: Skin is a fixed HSV band, closed (5x5 ellipse, 2 passes) and
//     opened (1 pass). Only the largest filled region survives; a second hand or a
//     skin-toned background object is discarded.
// 2.  **Two Independent Witnesses**: A candidate pixel must look abnormal in colour
//     (red, dark or bruise band) AND lie inside a region enclosed by texture edges.
//     Either witness alone fires on shadows, freckles or hair.
// 3.  **Graceful Fallback**: When the two witnesses never agree, the colour witness is
//     trusted alone, but only for components smaller than 30% of the tissue.
// 4.  **Size Ceiling**: A candidate covering 40% of the tissue or more is a systematic
//     failure (lighting, skin tone) and is reported as such, never measured.
// 5.  **Explicit Outcomes**: Every exit is a `Segmentation` variant, so no stage
//     downstream needs to guess why a candidate is missing.

use image::{GrayImage, RgbImage};
use log::{debug, warn};

use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::filters;
use crate::core_modules::mask::{Mask, StructuringElement};
use crate::core_modules::pixel::pixel::{HsvRange, Pixel};
use crate::core_modules::region::Region;

pub const SKIN_BAND: HsvRange = HsvRange::new([0, 20, 70], [20, 150, 255]);
pub const RED_LOW_BAND: HsvRange = HsvRange::new([0, 40, 40], [10, 255, 255]);
pub const RED_HIGH_BAND: HsvRange = HsvRange::new([160, 40, 40], [180, 255, 255]);
pub const BRUISE_BAND: HsvRange = HsvRange::new([100, 40, 40], [140, 255, 200]);
/// Gray level at or below which a pixel counts as dark.
pub const DARK_MAX_GRAY: u8 = 80;

pub const EDGE_BLUR_KERNEL: u32 = 5;
pub const CANNY_LOW: f32 = 30.0;
pub const CANNY_HIGH: f32 = 100.0;
/// Edge-enclosed regions must be strictly larger than this to count as texture.
pub const MIN_EDGE_REGION_AREA: usize = 50;
/// Colour-only fallback components must be smaller than this share of the tissue.
pub const FALLBACK_MAX_TISSUE_SHARE: f64 = 0.3;
/// Any candidate at or above this share of the tissue is a segmentation failure.
pub const CANDIDATE_MAX_TISSUE_SHARE: f64 = 0.4;

/// The three colour-anomaly bands, each a full-frame mask.
#[derive(Debug, Clone)]
pub struct ColorBands {
    pub red: Mask,
    pub dark: Mask,
    pub bruise: Mask,
}

impl ColorBands {
    /// Union of all three bands.
    pub fn anomaly(&self) -> Mask {
        self.red.union(&self.dark).union(&self.bruise)
    }
}

/// Texture evidence: the raw Canny map and the filled regions it encloses.
#[derive(Debug, Clone)]
pub struct EdgeMap {
    pub raw: Mask,
    pub regions: Mask,
}

/// Which witness produced the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    ColorAndTexture,
    ColorOnly,
}

/// The tissue region and its mask.
#[derive(Debug, Clone)]
pub struct Tissue {
    pub region: Region,
    pub mask: Mask,
}

/// Everything the measurement stages need about the chosen candidate.
#[derive(Debug, Clone)]
pub struct SegmentedCandidate {
    pub tissue: Tissue,
    pub lesion: Region,
    pub lesion_mask: Mask,
    pub bands: ColorBands,
    pub edges: EdgeMap,
    pub gray: GrayImage,
    pub source: CandidateSource,
}

#[derive(Debug, Clone)]
pub enum Segmentation {
    /// No skin-coloured region at all.
    NoTissue,
    /// Tissue found, nothing abnormal inside it.
    NoCandidate { tissue: Tissue },
    /// Every candidate reached the size ceiling.
    TooLarge { tissue: Tissue, largest_area: usize },
    Candidate(Box<SegmentedCandidate>),
}

fn band_mask(image: &RgbImage, test: impl Fn(&Pixel) -> bool) -> Mask {
    Mask::from_fn(image.width(), image.height(), |x, y| test(&Pixel::from(image.get_pixel(x, y))))
}

/// Cleaned skin-band mask of the whole frame.
pub fn skin_mask(image: &RgbImage) -> Mask {
    let ellipse = StructuringElement::ellipse(5, 5);
    band_mask(image, |p| SKIN_BAND.contains(p.hsv()))
        .close(&ellipse, 2)
        .open(&ellipse, 1)
}

/// Largest filled skin region, if any.
pub fn find_tissue(image: &RgbImage) -> Option<Tissue> {
    let region = blob_detector::largest_region(&skin_mask(image))?;
    let mask = region.to_mask(image.width(), image.height());
    Some(Tissue { region, mask })
}

pub fn color_bands(image: &RgbImage) -> ColorBands {
    ColorBands {
        red: band_mask(image, |p| {
            let hsv = p.hsv();
            RED_LOW_BAND.contains(hsv) || RED_HIGH_BAND.contains(hsv)
        }),
        dark: band_mask(image, |p| p.gray() <= DARK_MAX_GRAY),
        bruise: band_mask(image, |p| BRUISE_BAND.contains(p.hsv())),
    }
}

/// Canny over the blurred tissue-only gray image, dilated and filled.
pub fn edge_map(gray: &GrayImage, tissue_mask: &Mask) -> EdgeMap {
    let masked = filters::apply_mask(gray, tissue_mask);
    let blurred = filters::gaussian_blur(&masked, EDGE_BLUR_KERNEL);
    let raw = filters::canny_edges(&blurred, CANNY_LOW, CANNY_HIGH);
    let dilated = raw.dilate(&StructuringElement::ellipse(3, 3), 2);
    let regions = blob_detector::fill_regions_above(&dilated, MIN_EDGE_REGION_AREA);
    EdgeMap { raw, regions }
}

/// What `choose_candidate` settled on.
#[derive(Debug, Clone)]
pub enum CandidateChoice {
    Nothing,
    /// Area of the largest candidate, all of them at or above the ceiling.
    TooLarge(usize),
    Lesion(Region, CandidateSource),
}

/// Picks the lesion from the corroborated mask, falling back to the colour-only
/// mask (anomaly inside tissue) when nothing was corroborated.
pub fn choose_candidate(corroborated: &Mask, anomaly_in_tissue: &Mask, tissue_area: usize) -> CandidateChoice {
    let tissue_area = tissue_area as f64;
    let mut source = CandidateSource::ColorAndTexture;
    let mut candidates = blob_detector::find_regions(corroborated);

    // --- 2. Colour-only fallback ---
    if candidates.is_empty() {
        source = CandidateSource::ColorOnly;
        candidates = blob_detector::find_regions(anomaly_in_tissue)
            .into_iter()
            .filter(|r| (r.area() as f64) < tissue_area * FALLBACK_MAX_TISSUE_SHARE)
            .collect();
        if candidates.is_empty() {
            return CandidateChoice::Nothing;
        }
    }
    debug!("{} candidate(s) from {:?}", candidates.len(), source);

    // --- 3. Size ceiling ---
    let largest_area = candidates.iter().map(Region::area).max().unwrap_or(0);
    match candidates
        .into_iter()
        .filter(|r| (r.area() as f64) < tissue_area * CANDIDATE_MAX_TISSUE_SHARE)
        .max_by_key(Region::area)
    {
        Some(lesion) => CandidateChoice::Lesion(lesion, source),
        None => CandidateChoice::TooLarge(largest_area),
    }
}

/// Runs the full tissue-then-candidate segmentation.
pub fn segment(image: &RgbImage) -> Segmentation {
    let Some(tissue) = find_tissue(image) else {
        warn!("no skin-coloured region found");
        return Segmentation::NoTissue;
    };
    debug!("tissue region: {} px", tissue.region.area());

    let gray = filters::to_gray(image);
    let bands = color_bands(image);
    let anomaly = bands.anomaly();
    let edges = edge_map(&gray, &tissue.mask);

    // --- 1. Both witnesses ---
    let ellipse = StructuringElement::ellipse(5, 5);
    let corroborated = anomaly
        .intersection(&edges.regions)
        .intersection(&tissue.mask)
        .close(&ellipse, 2)
        .open(&ellipse, 1);

    let in_tissue = anomaly.intersection(&tissue.mask);

    let (lesion, source) = match choose_candidate(&corroborated, &in_tissue, tissue.region.area()) {
        CandidateChoice::Nothing => {
            debug!("no colour anomaly inside tissue");
            return Segmentation::NoCandidate { tissue };
        }
        CandidateChoice::TooLarge(largest_area) => {
            warn!("candidate of {largest_area} px exceeds the tissue share ceiling");
            return Segmentation::TooLarge { tissue, largest_area };
        }
        CandidateChoice::Lesion(lesion, source) => (lesion, source),
    };

    let lesion_mask = lesion.to_mask(image.width(), image.height());
    Segmentation::Candidate(Box::new(SegmentedCandidate {
        tissue,
        lesion,
        lesion_mask,
        bands,
        edges,
        gray,
        source,
    }))
}
