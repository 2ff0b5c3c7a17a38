// THEORY:
// A zero-shot labeller describes a skin photo in words. This module turns its best
// label into the same kind of answer the measuring pipeline gives: a diagnosis, one
// line of advice, a gravity and an alert colour.
//
// 1.  **Substring Rules**: Labels are free text, so the rules match keywords, in order.
//     "burn" alone is checked after the three burn degrees it would otherwise shadow.
// 2.  **Trauma Is Visible**: Cuts, burns, bruises, stitches and bites are judged from the
//     label alone. Anything else with a weak label score is handed to the malignancy
//     model, and a confident malignancy verdict overrides the label.

use log::info;
use serde::Serialize;

use crate::collaborators::LabelScore;
use crate::core_modules::geometry::round_to;
use crate::core_modules::rules::{Rule, RuleChain};
use crate::core_modules::severity::AlertLevel;

pub const CANDIDATE_LABELS: [&str; 12] = [
    "healthy skin",
    "a deep cut or laceration",
    "a bruise or hematoma",
    "a first degree burn with redness",
    "a second degree burn with blisters",
    "a third degree burn with white or charred skin",
    "skin cancer or melanoma",
    "skin rash or eczema",
    "surgical stitches",
    "acne or pimples",
    "insect bite",
    "psoriasis",
];

pub const TRAUMATIC_KEYWORDS: [&str; 7] = ["burn", "cut", "laceration", "bruise", "hematoma", "stitches", "insect"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gravity {
    None,
    Low,
    Medium,
    #[serde(rename = "EMERGENCY")]
    Emergency,
    #[serde(rename = "URGENT")]
    Urgent,
}

impl Gravity {
    pub fn warrants_attention(&self) -> bool {
        matches!(self, Gravity::Medium | Gravity::Emergency | Gravity::Urgent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelInterpretation {
    pub diagnosis: &'static str,
    pub advice: &'static str,
    pub gravity: Gravity,
    pub alert: AlertLevel,
}

const fn meaning(diagnosis: &'static str, advice: &'static str, gravity: Gravity, alert: AlertLevel) -> LabelInterpretation {
    LabelInterpretation { diagnosis, advice, gravity, alert }
}

fn has(label: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| label.contains(k))
}

pub fn label_chain() -> RuleChain<String, LabelInterpretation> {
    use AlertLevel::{Green, Orange, Red};
    type L = String;
    RuleChain::new(
        vec![
            Rule::new("cut", |l: &L| has(l, &["cut", "laceration"]), |_: &L| {
                meaning("Cut / Laceration", "Disinfect. If deep, consult.", Gravity::Medium, Orange)
            }),
            Rule::new("bruise", |l: &L| has(l, &["bruise", "hematoma"]), |_: &L| {
                meaning("Bruise", "Apply ice. Monitor.", Gravity::Low, Green)
            }),
            Rule::new("first-degree", |l: &L| l.contains("first degree"), |_: &L| {
                meaning("1st Degree Burn", "Cool with water. Soothing cream.", Gravity::Low, Green)
            }),
            Rule::new("second-degree", |l: &L| l.contains("second degree"), |_: &L| {
                meaning("2nd Degree Burn", "Cool with water. Do not pop blisters.", Gravity::Medium, Orange)
            }),
            Rule::new("third-degree", |l: &L| l.contains("third degree"), |_: &L| {
                meaning("3rd Degree Burn", "EMERGENCY. Call ambulance.", Gravity::Emergency, Red)
            }),
            Rule::new("burn", |l: &L| l.contains("burn"), |_: &L| {
                meaning("Burn", "Cool with water. Consult if severe.", Gravity::Medium, Orange)
            }),
            Rule::new("malignant", |l: &L| has(l, &["cancer", "melanoma"]), |_: &L| {
                meaning("Suspicious Lesion", "Consult dermatologist immediately.", Gravity::Urgent, Red)
            }),
            Rule::new("eczema", |l: &L| has(l, &["eczema", "rash"]), |_: &L| {
                meaning("Eczema / Rash", "Moisturize. Avoid scratching.", Gravity::Low, Green)
            }),
            Rule::new("stitches", |l: &L| l.contains("stitches"), |_: &L| {
                meaning("Stitches", "Keep clean and dry.", Gravity::Low, Green)
            }),
            Rule::new("acne", |l: &L| has(l, &["acne", "pimples"]), |_: &L| {
                meaning("Acne", "Gentle cleansing.", Gravity::Low, Green)
            }),
            Rule::new("insect", |l: &L| l.contains("insect"), |_: &L| {
                meaning("Insect Bite", "Disinfect. Apply ice.", Gravity::Low, Green)
            }),
            Rule::new("psoriasis", |l: &L| l.contains("psoriasis"), |_: &L| {
                meaning("Psoriasis", "Consult dermatologist.", Gravity::Medium, Orange)
            }),
            Rule::new("healthy", |l: &L| l.contains("healthy"), |_: &L| {
                meaning("Healthy Skin", "Skin appears healthy.", Gravity::None, Green)
            }),
        ],
        "unrecognised",
        |_: &L| meaning("Skin condition detected", "Consult a doctor.", Gravity::Low, Green),
    )
}

pub fn is_traumatic(label: &str) -> bool {
    let label = label.to_lowercase();
    TRAUMATIC_KEYWORDS.iter().any(|k| label.contains(k))
}

/// The reported reading of a skin photo by the external models.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkinLabelAssessment {
    pub label: String,
    pub diagnosis: String,
    /// Percent, one decimal.
    pub confidence: f64,
    pub advice: String,
    pub gravity: Gravity,
    pub alert: AlertLevel,
    pub method: String,
    pub threshold_met: bool,
    pub top_3: Vec<LabelScore>,
}

/// Interprets a ranked label list. `None` when the labeller returned nothing.
pub fn interpret(ranked: &[LabelScore]) -> Option<SkinLabelAssessment> {
    let top = ranked.first()?;
    let meaning = label_chain().evaluate(&top.label.to_lowercase()).outcome;
    Some(SkinLabelAssessment {
        label: top.label.clone(),
        diagnosis: meaning.diagnosis.to_string(),
        confidence: round_to(top.score * 100.0, 1),
        advice: meaning.advice.to_string(),
        gravity: meaning.gravity,
        alert: meaning.alert,
        method: "Zero-shot label classifier".to_string(),
        threshold_met: meaning.gravity.warrants_attention(),
        top_3: ranked.iter().take(3).cloned().collect(),
    })
}

/// Whether the malignancy model should be asked about this reading.
pub fn needs_malignancy_check(assessment: &SkinLabelAssessment, top_score: f64, label_confidence_gate: f64) -> bool {
    !is_traumatic(&assessment.label) && top_score < label_confidence_gate
}

/// Replaces the reading with a suspicious-lesion verdict when the probability is high.
pub fn apply_malignancy_override(assessment: &mut SkinLabelAssessment, probability: f64, probability_gate: f64) -> bool {
    if probability <= probability_gate {
        return false;
    }
    info!("malignancy override: p={probability:.3} for label '{}'", assessment.label);
    assessment.diagnosis = "Suspicious Lesion".to_string();
    assessment.confidence = round_to(probability * 100.0, 1);
    assessment.advice = "Consult dermatologist immediately.".to_string();
    assessment.gravity = Gravity::Urgent;
    assessment.alert = AlertLevel::Red;
    assessment.method = "Malignancy model".to_string();
    assessment.threshold_met = true;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(label: &str, score: f64) -> Vec<LabelScore> {
        vec![
            LabelScore::new(label, score),
            LabelScore::new("healthy skin", 0.1),
            LabelScore::new("psoriasis", 0.05),
            LabelScore::new("acne or pimples", 0.01),
        ]
    }

    #[test]
    fn every_candidate_label_has_a_specific_rule() {
        for label in CANDIDATE_LABELS {
            assert_ne!(label_chain().evaluate(&label.to_string()).rule, "unrecognised", "{label}");
        }
    }

    #[test]
    fn burn_degrees_are_not_shadowed_by_burn() {
        let third = label_chain().evaluate(&"a third degree burn with white or charred skin".to_string());
        assert_eq!(third.rule, "third-degree");
        assert_eq!(third.outcome.gravity, Gravity::Emergency);
        assert_eq!(label_chain().evaluate(&"sunburn".to_string()).rule, "burn");
    }

    #[test]
    fn interpretation_of_top_label() {
        let assessment = interpret(&ranked("a deep cut or laceration", 0.9134)).expect("non-empty");
        assert_eq!(assessment.diagnosis, "Cut / Laceration");
        assert_eq!(assessment.confidence, 91.3);
        assert_eq!(assessment.alert, AlertLevel::Orange);
        assert!(assessment.threshold_met);
        assert_eq!(assessment.top_3.len(), 3);
        assert!(interpret(&[]).is_none());
    }

    #[test]
    fn traumatic_keywords() {
        assert!(is_traumatic("A Bruise or hematoma"));
        assert!(is_traumatic("insect bite"));
        assert!(!is_traumatic("skin rash or eczema"));
    }

    #[test]
    fn malignancy_override_for_weak_non_traumatic_label() {
        let mut assessment = interpret(&ranked("skin rash or eczema", 0.55)).expect("non-empty");
        assert!(needs_malignancy_check(&assessment, 0.55, 0.80));
        assert!(!apply_malignancy_override(&mut assessment, 0.65, 0.65));
        assert_eq!(assessment.diagnosis, "Eczema / Rash");
        assert!(apply_malignancy_override(&mut assessment, 0.72, 0.65));
        assert_eq!(assessment.diagnosis, "Suspicious Lesion");
        assert_eq!(assessment.confidence, 72.0);
        assert_eq!(assessment.gravity, Gravity::Urgent);
        assert!(assessment.threshold_met);
    }

    #[test]
    fn confident_or_traumatic_labels_skip_the_check() {
        let cut = interpret(&ranked("a deep cut or laceration", 0.3)).expect("non-empty");
        assert!(!needs_malignancy_check(&cut, 0.3, 0.80));
        let rash = interpret(&ranked("skin rash or eczema", 0.8)).expect("non-empty");
        assert!(!needs_malignancy_check(&rash, 0.8, 0.80));
    }
}
