// THEORY:
// The `classifier` names what was found. It consumes numbers only (ratios, intensity
// statistics, positions, counts) and maps them to a closed set of categories through
// ordered `RuleChain`s.
//
// Three trees share the same shape:
// - Lesion type: bruise, then cut, then the burn sub-tree (which splits by darkness,
//   texture and spread), then mild inflammation.
// - Brain region: the scan is cut into thirds vertically, the middle third into halves.
// - Surgical phase: tools and hands together split by blood share; either alone, or
//   neither, name the phase directly.

use serde::Serialize;

use crate::core_modules::rules::{Fired, Rule, RuleChain};

// --- Lesion type ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LesionType {
    Bruise,
    Cut,
    ThirdDegreeBurn,
    SecondDegreeBurn,
    SecondDegreeBurnBlisters,
    SecondDegreeBurnSuspected,
    FirstDegreeBurn,
    FirstDegreeBurnSuspected,
    MildInflammation,
}

impl LesionType {
    pub fn label(&self) -> &'static str {
        match self {
            LesionType::Bruise => "Bruise",
            LesionType::Cut => "Cut",
            LesionType::ThirdDegreeBurn => "3rd Degree Burn",
            LesionType::SecondDegreeBurn => "2nd Degree Burn",
            LesionType::SecondDegreeBurnBlisters => "2nd Degree Burn (Blisters)",
            LesionType::SecondDegreeBurnSuspected => "2nd Degree Burn (Suspected)",
            LesionType::FirstDegreeBurn => "1st Degree Burn",
            LesionType::FirstDegreeBurnSuspected => "1st Degree Burn (Suspected)",
            LesionType::MildInflammation => "Mild Inflammation",
        }
    }

    pub fn is_second_degree(&self) -> bool {
        matches!(
            self,
            LesionType::SecondDegreeBurn | LesionType::SecondDegreeBurnBlisters | LesionType::SecondDegreeBurnSuspected
        )
    }

    pub fn is_first_degree(&self) -> bool {
        matches!(self, LesionType::FirstDegreeBurn | LesionType::FirstDegreeBurnSuspected)
    }
}

/// Everything the lesion tree looks at.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LesionFeatures {
    pub red_count: usize,
    pub dark_count: usize,
    pub bruise_count: usize,
    pub red_ratio: f64,
    pub dark_ratio: f64,
    pub aspect_ratio: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub intensity_range: u8,
    pub laplacian_variance: f64,
    pub very_dark_fraction: f64,
    pub area_cm2: f64,
}

pub fn lesion_chain() -> RuleChain<LesionFeatures, LesionType> {
    RuleChain::new(
        vec![
            Rule::new(
                "bruise-dominant",
                |f: &LesionFeatures| f.bruise_count > f.red_count.max(f.dark_count),
                |_: &LesionFeatures| LesionType::Bruise,
            ),
            Rule::new(
                "narrow-red",
                |f: &LesionFeatures| f.aspect_ratio < 0.35 && f.red_ratio > 0.3,
                |_: &LesionFeatures| LesionType::Cut,
            ),
            Rule::new(
                "burn",
                |f: &LesionFeatures| f.red_ratio > 0.2 || f.dark_ratio > 0.2,
                |f: &LesionFeatures| burn_chain().evaluate(f).outcome,
            ),
        ],
        "inflammation",
        |_: &LesionFeatures| LesionType::MildInflammation,
    )
}

/// Burn degree, reached only through the `burn` rule of the lesion chain.
pub fn burn_chain() -> RuleChain<LesionFeatures, LesionType> {
    RuleChain::new(
        vec![
            Rule::new(
                "charred",
                |f: &LesionFeatures| f.very_dark_fraction > 0.3 || (f.mean < 70.0 && f.laplacian_variance > 400.0),
                |_: &LesionFeatures| LesionType::ThirdDegreeBurn,
            ),
            Rule::new(
                "uneven",
                |f: &LesionFeatures| f.std_dev > 25.0 || (f.std_dev > 20.0 && f.area_cm2 > 0.5),
                |f: &LesionFeatures| {
                    if f.intensity_range > 80 || f.laplacian_variance > 200.0 {
                        LesionType::SecondDegreeBurnBlisters
                    } else {
                        LesionType::SecondDegreeBurn
                    }
                },
            ),
            Rule::new(
                "even-bright",
                |f: &LesionFeatures| f.std_dev < 25.0 && f.mean > 70.0,
                |_: &LesionFeatures| LesionType::FirstDegreeBurn,
            ),
        ],
        "suspected",
        |f: &LesionFeatures| {
            if f.mean < 80.0 {
                LesionType::SecondDegreeBurnSuspected
            } else {
                LesionType::FirstDegreeBurnSuspected
            }
        },
    )
}

pub fn classify_lesion(features: &LesionFeatures) -> Fired<LesionType> {
    lesion_chain().evaluate(features)
}

// --- Brain region ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BrainRegion {
    FrontalLobe,
    OccipitalLobe,
    LeftHemisphere,
    RightHemisphere,
}

impl BrainRegion {
    pub fn label(&self) -> &'static str {
        match self {
            BrainRegion::FrontalLobe => "Frontal Lobe",
            BrainRegion::OccipitalLobe => "Occipital Lobe",
            BrainRegion::LeftHemisphere => "Left Hemisphere",
            BrainRegion::RightHemisphere => "Right Hemisphere",
        }
    }

    /// Lobes where a lesion weighs more in the risk score.
    pub fn is_critical(&self) -> bool {
        matches!(self, BrainRegion::FrontalLobe | BrainRegion::OccipitalLobe)
    }
}

/// A point in a scan frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanPosition {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

pub fn brain_region_chain() -> RuleChain<ScanPosition, BrainRegion> {
    RuleChain::new(
        vec![
            Rule::new(
                "upper-third",
                |p: &ScanPosition| p.y < p.height / 3.0,
                |_: &ScanPosition| BrainRegion::FrontalLobe,
            ),
            Rule::new(
                "lower-third",
                |p: &ScanPosition| p.y > 2.0 * p.height / 3.0,
                |_: &ScanPosition| BrainRegion::OccipitalLobe,
            ),
            Rule::new(
                "left-half",
                |p: &ScanPosition| p.x < p.width / 2.0,
                |_: &ScanPosition| BrainRegion::LeftHemisphere,
            ),
        ],
        "right-half",
        |_: &ScanPosition| BrainRegion::RightHemisphere,
    )
}

pub fn classify_brain_region(position: &ScanPosition) -> Fired<BrainRegion> {
    brain_region_chain().evaluate(position)
}

// --- Surgical phase ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SurgicalPhase {
    Preparation,
    Incision,
    Hemostasis,
    ToolsReady,
    ManualManipulation,
    ClearField,
}

impl SurgicalPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SurgicalPhase::Preparation => "PREPARATION",
            SurgicalPhase::Incision => "INCISION",
            SurgicalPhase::Hemostasis => "HEMOSTASIS",
            SurgicalPhase::ToolsReady => "TOOLS READY",
            SurgicalPhase::ManualManipulation => "MANUAL MANIPULATION",
            SurgicalPhase::ClearField => "CLEAR FIELD",
        }
    }
}

/// What is visible in an operative field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldObservation {
    pub tools: u32,
    pub hands: u32,
    pub blood_percent: f64,
    pub sharpness: f64,
}

pub fn surgical_phase_chain() -> RuleChain<FieldObservation, SurgicalPhase> {
    RuleChain::new(
        vec![
            Rule::new(
                "tools-and-hands",
                |o: &FieldObservation| o.tools > 0 && o.hands > 0,
                |o: &FieldObservation| match o.blood_percent {
                    b if b < 5.0 => SurgicalPhase::Preparation,
                    b if b < 15.0 => SurgicalPhase::Incision,
                    _ => SurgicalPhase::Hemostasis,
                },
            ),
            Rule::new("tools-only", |o: &FieldObservation| o.tools > 0, |_: &FieldObservation| SurgicalPhase::ToolsReady),
            Rule::new(
                "hands-only",
                |o: &FieldObservation| o.hands > 0,
                |_: &FieldObservation| SurgicalPhase::ManualManipulation,
            ),
        ],
        "empty-field",
        |_: &FieldObservation| SurgicalPhase::ClearField,
    )
}

pub fn classify_surgical_phase(observation: &FieldObservation) -> Fired<SurgicalPhase> {
    surgical_phase_chain().evaluate(observation)
}
