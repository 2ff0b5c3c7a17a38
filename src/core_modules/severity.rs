// THEORY:
// The `severity` engine is the last stage: it turns a category plus measurements into
// what the user acts on. Three domains, three shapes of the same idea.
//
// - Skin: a table keyed by lesion type, with one numeric override per type (cut length,
//   burn area, bruise area). Expressed as one `RuleChain`, so the table order is the
//   evaluation order.
// - Brain: an additive risk score. Four independent factors (volume, classifier
//   confidence, location, margin), each a first-match tier list, summed, clamped to
//   100 and bucketed. Every factor that scores leaves a human-readable reason.
// - Surgery: a status chain over blood share, visibility and activity, plus the
//   per-frame monitor status and the alert colour derived from priority.

use serde::Serialize;

use crate::core_modules::classifier::{BrainRegion, FieldObservation, LesionType};
use crate::core_modules::rules::{Fired, Rule, RuleChain};

// --- Skin ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkinSeverityLevel {
    Low,
    Moderate,
    High,
    Critical,
    Severe,
    Superficial,
    SignificantHematoma,
    Benign,
    Minor,
}

impl SkinSeverityLevel {
    pub fn label(&self) -> &'static str {
        match self {
            SkinSeverityLevel::Low => "LOW",
            SkinSeverityLevel::Moderate => "MODERATE",
            SkinSeverityLevel::High => "HIGH",
            SkinSeverityLevel::Critical => "CRITICAL",
            SkinSeverityLevel::Severe => "SEVERE",
            SkinSeverityLevel::Superficial => "SUPERFICIAL",
            SkinSeverityLevel::SignificantHematoma => "Significant Hematoma",
            SkinSeverityLevel::Benign => "Benign",
            SkinSeverityLevel::Minor => "MINOR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkinSeverity {
    pub level: SkinSeverityLevel,
    pub advice: &'static str,
    pub urgent: bool,
}

/// A classified lesion with the measurements its severity depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredLesion {
    pub lesion: LesionType,
    pub length_mm: f64,
    pub area_cm2: f64,
}

const fn severity(level: SkinSeverityLevel, advice: &'static str, urgent: bool) -> SkinSeverity {
    SkinSeverity { level, advice, urgent }
}

pub fn skin_severity_chain() -> RuleChain<MeasuredLesion, SkinSeverity> {
    use SkinSeverityLevel::*;
    RuleChain::new(
        vec![
            Rule::new(
                "long-cut",
                |m: &MeasuredLesion| m.lesion == LesionType::Cut && m.length_mm > 30.0,
                |_: &MeasuredLesion| severity(High, "Deep wound (>3cm). Stitches likely.", true),
            ),
            Rule::new(
                "medium-cut",
                |m: &MeasuredLesion| m.lesion == LesionType::Cut && m.length_mm > 10.0,
                |_: &MeasuredLesion| severity(Moderate, "Use adhesive strips.", false),
            ),
            Rule::new(
                "short-cut",
                |m: &MeasuredLesion| m.lesion == LesionType::Cut,
                |_: &MeasuredLesion| severity(Low, "Clean with soap and water.", false),
            ),
            Rule::new(
                "third-degree",
                |m: &MeasuredLesion| m.lesion == LesionType::ThirdDegreeBurn,
                |_: &MeasuredLesion| severity(Critical, "Deep burn. EMERGENCY. Do not cool.", true),
            ),
            Rule::new(
                "large-second-degree",
                |m: &MeasuredLesion| m.lesion.is_second_degree() && m.area_cm2 > 10.0,
                |_: &MeasuredLesion| severity(Severe, "Large area. Hospital advised.", true),
            ),
            Rule::new(
                "second-degree",
                |m: &MeasuredLesion| m.lesion.is_second_degree(),
                |_: &MeasuredLesion| severity(Moderate, "Cool for 15 min. Do not pop blisters.", false),
            ),
            Rule::new(
                "first-degree",
                |m: &MeasuredLesion| m.lesion.is_first_degree(),
                |_: &MeasuredLesion| severity(Superficial, "Cool, apply soothing cream.", false),
            ),
            Rule::new(
                "large-bruise",
                |m: &MeasuredLesion| m.lesion == LesionType::Bruise && m.area_cm2 > 25.0,
                |_: &MeasuredLesion| severity(SignificantHematoma, "Ice 20min/h.", false),
            ),
            Rule::new(
                "bruise",
                |m: &MeasuredLesion| m.lesion == LesionType::Bruise,
                |_: &MeasuredLesion| severity(Benign, "Rest, ice.", false),
            ),
        ],
        "inflammation",
        |_: &MeasuredLesion| severity(Minor, "Mild irritation.", false),
    )
}

pub fn assess_skin(lesion: &MeasuredLesion) -> Fired<SkinSeverity> {
    skin_severity_chain().evaluate(lesion)
}

// --- Brain ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn priority(&self) -> &'static str {
        match self {
            RiskLevel::High => "URGENT",
            RiskLevel::Moderate => "PLAN SOON",
            RiskLevel::Low => "MONITOR",
        }
    }
}

/// The measurements and classifier output the risk score reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInput {
    pub volume_cm3: f64,
    pub diameter_mm: f64,
    /// Classifier confidence, percent.
    pub confidence: f64,
    pub distance_to_center_mm: f64,
    pub area_px: usize,
    pub region: BrainRegion,
    pub min_margin_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub level: RiskLevel,
    pub priority: String,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub action: String,
    pub timeframe: String,
    pub reason: String,
}

impl Recommendation {
    fn new(action: &str, timeframe: &str, reason: &str) -> Self {
        Self { action: action.to_string(), timeframe: timeframe.to_string(), reason: reason.to_string() }
    }
}

pub const MAX_RISK_SCORE: u32 = 100;

fn volume_factor(input: &RiskInput) -> Option<(u32, String)> {
    if input.volume_cm3 > 50.0 {
        Some((40, format!("Very large volume ({:.1}cm³)", input.volume_cm3)))
    } else if input.volume_cm3 > 20.0 {
        Some((25, format!("Large volume ({:.1}cm³)", input.volume_cm3)))
    } else if input.diameter_mm > 30.0 {
        Some((15, format!("Significant diameter ({:.1}mm)", input.diameter_mm)))
    } else {
        None
    }
}

fn confidence_factor(input: &RiskInput) -> Option<(u32, String)> {
    if input.confidence > 95.0 {
        Some((25, format!("High AI confidence ({:.1}%)", input.confidence)))
    } else if input.confidence > 85.0 {
        Some((15, format!("Clear AI signature ({:.1}%)", input.confidence)))
    } else {
        None
    }
}

fn location_factor(input: &RiskInput) -> Option<(u32, String)> {
    if input.distance_to_center_mm < 30.0 && input.area_px > 100 {
        Some((30, "Deep/central location".to_string()))
    } else if input.region.is_critical() {
        Some((20, format!("Critical location: {}", input.region.label())))
    } else {
        None
    }
}

fn margin_factor(input: &RiskInput) -> Option<(u32, String)> {
    if input.min_margin_mm < 5.0 {
        Some((20, format!("Very close to margins ({:.1}mm)", input.min_margin_mm)))
    } else if input.min_margin_mm < 10.0 {
        Some((10, format!("Close to margins ({:.1}mm)", input.min_margin_mm)))
    } else {
        None
    }
}

fn risk_level_chain() -> RuleChain<u32, RiskLevel> {
    RuleChain::new(
        vec![
            Rule::new("high", |s: &u32| *s >= 70, |_: &u32| RiskLevel::High),
            Rule::new("moderate", |s: &u32| *s >= 40, |_: &u32| RiskLevel::Moderate),
        ],
        "low",
        |_: &u32| RiskLevel::Low,
    )
}

pub fn assess_risk(input: &RiskInput) -> RiskAssessment {
    let mut score = 0;
    let mut factors = Vec::new();
    for factor in [volume_factor, confidence_factor, location_factor, margin_factor] {
        if let Some((points, reason)) = factor(input) {
            score += points;
            factors.push(reason);
        }
    }
    let score = score.min(MAX_RISK_SCORE);
    let level = risk_level_chain().evaluate(&score).outcome;
    RiskAssessment { score: score as u8, level, priority: level.priority().to_string(), factors }
}

pub fn recommendations(level: RiskLevel, volume_cm3: f64) -> Vec<Recommendation> {
    match level {
        RiskLevel::High => {
            let mut list = vec![
                Recommendation::new("Urgent Neurosurgery Consult", "Within 48h", "High risk score"),
                Recommendation::new("Contrast MRI", "Immediate", "Precise characterization needed"),
            ];
            if volume_cm3 > 30.0 {
                list.push(Recommendation::new("Consider surgical resection", "Plan", "Large volume"));
            }
            list
        }
        RiskLevel::Moderate => vec![
            Recommendation::new("Oncology Consult", "Within 2 weeks", "In-depth evaluation"),
            Recommendation::new("Guided Biopsy", "Plan", "Histological confirmation"),
            Recommendation::new("Follow-up MRI", "3 months", "Monitor evolution"),
        ],
        RiskLevel::Low => vec![
            Recommendation::new("Follow-up MRI", "6 months", "Regular monitoring"),
            Recommendation::new("Neurology Consult", "1 month", "Clinical evaluation"),
        ],
    }
}

// --- Surgery ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BloodLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl BloodLevel {
    pub fn from_percent(blood_percent: f64) -> Self {
        match blood_percent {
            b if b > 20.0 => BloodLevel::Critical,
            b if b > 10.0 => BloodLevel::High,
            b if b > 5.0 => BloodLevel::Moderate,
            _ => BloodLevel::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityStatus {
    Critical,
    Reduced,
    Good,
    Excellent,
}

impl VisibilityStatus {
    pub fn from_sharpness(sharpness: f64) -> Self {
        match sharpness {
            s if s < 50.0 => VisibilityStatus::Critical,
            s if s < 100.0 => VisibilityStatus::Reduced,
            s if s < 500.0 => VisibilityStatus::Good,
            _ => VisibilityStatus::Excellent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Green,
    Orange,
    Red,
    Gray,
}

impl AlertLevel {
    /// Single-image alert: red for critical/high priority, orange for medium or smoke.
    pub fn from_priority(priority: Priority, smoke_or_blur: bool) -> Self {
        match priority {
            Priority::Critical | Priority::High => AlertLevel::Red,
            Priority::Medium => AlertLevel::Orange,
            Priority::Low if smoke_or_blur => AlertLevel::Orange,
            Priority::Low => AlertLevel::Green,
        }
    }

    /// Whether the alert warrants the user's attention.
    pub fn threshold_met(&self) -> bool {
        matches!(self, AlertLevel::Red | AlertLevel::Orange)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurgicalStatus {
    pub status: &'static str,
    pub priority: Priority,
    pub suggestion: &'static str,
}

const fn status(status: &'static str, priority: Priority, suggestion: &'static str) -> SurgicalStatus {
    SurgicalStatus { status, priority, suggestion }
}

fn is_active(o: &FieldObservation) -> bool {
    o.tools > 0 || o.hands > 0
}

pub fn surgical_status_chain() -> RuleChain<FieldObservation, SurgicalStatus> {
    use Priority::*;
    type O = FieldObservation;
    RuleChain::new(
        vec![
            Rule::new(
                "massive-hemorrhage",
                |o: &O| o.blood_percent > 25.0 && o.tools == 0,
                |_: &O| status("EMERGENCY", Critical, "MASSIVE HEMORRHAGE! Immediate intervention required."),
            ),
            Rule::new(
                "hemorrhage-under-control",
                |o: &O| o.blood_percent > 25.0,
                |_: &O| status("EMERGENCY", Critical, "Active hemorrhage. Maintain pressure."),
            ),
            Rule::new(
                "unattended-bleeding",
                |o: &O| o.blood_percent > 15.0 && !is_active(o),
                |_: &O| status("CRITICAL", High, "Significant hemorrhage. Action required."),
            ),
            Rule::new(
                "active-bleeding",
                |o: &O| o.blood_percent > 15.0,
                |_: &O| status("CRITICAL", High, "Active bleeding. Control source."),
            ),
            Rule::new(
                "residual-bleeding",
                |o: &O| o.blood_percent > 8.0 && o.tools == 0,
                |_: &O| status("WARNING", Medium, "Residual bleeding. Check hemostasis."),
            ),
            Rule::new(
                "blind-field",
                |o: &O| o.sharpness < 50.0,
                |_: &O| status("WARNING", Medium, "Critical visibility. Clean lens or clear smoke."),
            ),
            Rule::new(
                "hazy-field",
                |o: &O| o.sharpness < 100.0,
                |_: &O| status("ALERT", Low, "Reduced visibility. Check lighting."),
            ),
            Rule::new(
                "cluttered-field",
                |o: &O| o.tools > 2,
                |_: &O| status("ALERT", Low, "Cluttered field. Remove unnecessary tools."),
            ),
            Rule::new(
                "clean-activity",
                |o: &O| is_active(o) && o.blood_percent < 3.0,
                |_: &O| status("ACTIVE", Low, "Surgery in progress. Good visibility."),
            ),
            Rule::new("activity", is_active, |_: &O| status("ACTIVE", Low, "Minor bleeding normal. Monitor.")),
        ],
        "standby",
        |_: &O| status("STANDBY", Low, "No activity detected."),
    )
}

pub fn assess_surgical_status(observation: &FieldObservation) -> Fired<SurgicalStatus> {
    surgical_status_chain().evaluate(observation)
}

/// Per-frame signals of a monitored video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSignals {
    pub hemorrhage: bool,
    pub blood_percent: f64,
    pub smoke_or_blur: bool,
    pub tools: u32,
    pub hands: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStatus {
    pub status: &'static str,
    pub message: String,
    pub level: AlertLevel,
}

pub fn frame_status_chain() -> RuleChain<FrameSignals, FrameStatus> {
    type S = FrameSignals;
    RuleChain::new(
        vec![
            Rule::new(
                "hemorrhage",
                |s: &S| s.hemorrhage,
                |s: &S| FrameStatus {
                    status: "CRITICAL",
                    message: format!("HEMORRHAGE ({:.1}%)", s.blood_percent),
                    level: AlertLevel::Red,
                },
            ),
            Rule::new(
                "smoke",
                |s: &S| s.smoke_or_blur,
                |_: &S| FrameStatus { status: "WARNING", message: "Reduced visibility".to_string(), level: AlertLevel::Orange },
            ),
            Rule::new(
                "inactive",
                |s: &S| s.tools == 0 && s.hands == 0,
                |_: &S| FrameStatus { status: "INACTIVE", message: "No activity".to_string(), level: AlertLevel::Gray },
            ),
        ],
        "stable",
        |_: &S| FrameStatus { status: "STABLE", message: "Operation in progress".to_string(), level: AlertLevel::Green },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesion(lesion: LesionType, length_mm: f64, area_cm2: f64) -> MeasuredLesion {
        MeasuredLesion { lesion, length_mm, area_cm2 }
    }

    #[test]
    fn cut_severity_by_length() {
        let long = assess_skin(&lesion(LesionType::Cut, 35.0, 2.0)).outcome;
        assert_eq!((long.level.label(), long.urgent), ("HIGH", true));
        let edge = assess_skin(&lesion(LesionType::Cut, 30.0, 2.0)).outcome;
        assert_eq!(edge.level, SkinSeverityLevel::Moderate);
        assert_eq!(assess_skin(&lesion(LesionType::Cut, 10.0, 2.0)).outcome.level, SkinSeverityLevel::Low);
    }

    #[test]
    fn every_second_degree_variant_shares_the_area_rule() {
        for variant in [
            LesionType::SecondDegreeBurn,
            LesionType::SecondDegreeBurnBlisters,
            LesionType::SecondDegreeBurnSuspected,
        ] {
            let large = assess_skin(&lesion(variant, 0.0, 10.5)).outcome;
            assert_eq!((large.level, large.urgent), (SkinSeverityLevel::Severe, true));
            let small = assess_skin(&lesion(variant, 0.0, 10.0)).outcome;
            assert_eq!(small.advice, "Cool for 15 min. Do not pop blisters.");
        }
    }

    #[test]
    fn remaining_table_rows() {
        let third = assess_skin(&lesion(LesionType::ThirdDegreeBurn, 0.0, 0.1)).outcome;
        assert_eq!((third.level.label(), third.urgent), ("CRITICAL", true));
        let first = assess_skin(&lesion(LesionType::FirstDegreeBurnSuspected, 0.0, 50.0)).outcome;
        assert_eq!(first.level.label(), "SUPERFICIAL");
        assert_eq!(assess_skin(&lesion(LesionType::Bruise, 0.0, 26.0)).outcome.advice, "Ice 20min/h.");
        assert_eq!(assess_skin(&lesion(LesionType::Bruise, 0.0, 25.0)).outcome.level.label(), "Benign");
        let mild = assess_skin(&lesion(LesionType::MildInflammation, 0.0, 1.0));
        assert_eq!((mild.rule, mild.outcome.level.label()), ("inflammation", "MINOR"));
    }

    fn risk_input() -> RiskInput {
        RiskInput {
            volume_cm3: 60.0,
            diameter_mm: 48.6,
            confidence: 97.0,
            distance_to_center_mm: 40.0,
            area_px: 5000,
            region: BrainRegion::FrontalLobe,
            min_margin_mm: 3.0,
        }
    }

    #[test]
    fn large_confident_frontal_tumor_is_urgent() {
        let risk = assess_risk(&risk_input());
        assert_eq!(risk.score, 100);
        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.priority, "URGENT");
        assert_eq!(
            risk.factors,
            vec![
                "Very large volume (60.0cm³)",
                "High AI confidence (97.0%)",
                "Critical location: Frontal Lobe",
                "Very close to margins (3.0mm)",
            ]
        );
        let recs = recommendations(risk.level, 60.0);
        assert!(recs.iter().any(|r| r.timeframe == "Within 48h"));
        assert_eq!(recs.len(), 3);
    }

    #[test]
    fn central_location_outranks_lobe() {
        let input = RiskInput { distance_to_center_mm: 10.0, ..risk_input() };
        assert!(assess_risk(&input).factors.contains(&"Deep/central location".to_string()));
        let tiny = RiskInput { distance_to_center_mm: 10.0, area_px: 100, ..risk_input() };
        assert!(assess_risk(&tiny).factors.contains(&"Critical location: Frontal Lobe".to_string()));
    }

    #[test]
    fn risk_level_boundaries() {
        // 25 (volume) + 15 (confidence) = 40
        let moderate = RiskInput {
            volume_cm3: 25.0,
            confidence: 90.0,
            region: BrainRegion::LeftHemisphere,
            min_margin_mm: 20.0,
            ..risk_input()
        };
        let risk = assess_risk(&moderate);
        assert_eq!((risk.score, risk.level), (40, RiskLevel::Moderate));
        assert_eq!(recommendations(risk.level, 25.0).len(), 3);

        let low = RiskInput { confidence: 80.0, ..moderate };
        let risk = assess_risk(&low);
        assert_eq!((risk.score, risk.level, risk.priority.as_str()), (25, RiskLevel::Low, "MONITOR"));
        assert_eq!(recommendations(risk.level, 25.0)[0].timeframe, "6 months");
    }

    #[test]
    fn high_risk_small_volume_skips_resection() {
        let recs = recommendations(RiskLevel::High, 30.0);
        assert_eq!(recs.len(), 2);
    }

    fn field(tools: u32, hands: u32, blood_percent: f64, sharpness: f64) -> FieldObservation {
        FieldObservation { tools, hands, blood_percent, sharpness }
    }

    #[test]
    fn surgical_status_chain_order() {
        let s = assess_surgical_status(&field(0, 0, 30.0, 300.0));
        assert_eq!((s.rule, s.outcome.status, s.outcome.priority), ("massive-hemorrhage", "EMERGENCY", Priority::Critical));
        assert_eq!(assess_surgical_status(&field(1, 0, 30.0, 300.0)).rule, "hemorrhage-under-control");
        assert_eq!(assess_surgical_status(&field(0, 0, 20.0, 300.0)).rule, "unattended-bleeding");
        assert_eq!(assess_surgical_status(&field(0, 1, 20.0, 300.0)).rule, "active-bleeding");
        assert_eq!(assess_surgical_status(&field(0, 1, 9.0, 300.0)).rule, "residual-bleeding");
        assert_eq!(assess_surgical_status(&field(1, 1, 9.0, 40.0)).rule, "blind-field");
        assert_eq!(assess_surgical_status(&field(1, 1, 1.0, 80.0)).rule, "hazy-field");
        assert_eq!(assess_surgical_status(&field(3, 0, 1.0, 300.0)).rule, "cluttered-field");
        assert_eq!(assess_surgical_status(&field(1, 1, 1.0, 300.0)).outcome.suggestion, "Surgery in progress. Good visibility.");
        assert_eq!(assess_surgical_status(&field(1, 1, 4.0, 300.0)).rule, "activity");
        assert_eq!(assess_surgical_status(&field(0, 0, 0.0, 300.0)).outcome.status, "STANDBY");
    }

    #[test]
    fn tiers_and_alerts() {
        assert_eq!(BloodLevel::from_percent(20.5), BloodLevel::Critical);
        assert_eq!(BloodLevel::from_percent(5.0), BloodLevel::Low);
        assert_eq!(VisibilityStatus::from_sharpness(499.0), VisibilityStatus::Good);
        assert_eq!(VisibilityStatus::from_sharpness(500.0), VisibilityStatus::Excellent);
        assert_eq!(AlertLevel::from_priority(Priority::High, false), AlertLevel::Red);
        assert_eq!(AlertLevel::from_priority(Priority::Low, true), AlertLevel::Orange);
        assert_eq!(AlertLevel::from_priority(Priority::Low, false), AlertLevel::Green);
        assert!(!AlertLevel::Green.threshold_met());
        assert_eq!(serde_json::to_string(&AlertLevel::Orange).ok().as_deref(), Some("\"orange\""));
    }

    #[test]
    fn frame_status_prefers_hemorrhage() {
        let signals = FrameSignals { hemorrhage: true, blood_percent: 17.26, smoke_or_blur: true, tools: 0, hands: 0 };
        let fired = frame_status_chain().evaluate(&signals);
        assert_eq!(fired.outcome.message, "HEMORRHAGE (17.3%)");
        assert_eq!(fired.outcome.level, AlertLevel::Red);
        let idle = FrameSignals { hemorrhage: false, smoke_or_blur: false, ..signals };
        assert_eq!(frame_status_chain().evaluate(&idle).outcome.level, AlertLevel::Gray);
    }
}
