// THEORY:
// Runtime knobs that belong to the deployment, not to the heuristics. Clinical
// thresholds inside the stages are literal constants and deliberately absent here;
// only gates on external model output, scan sizing and pool sizing can be tuned.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Blood share of the frame, in percent, above which a frame is a hemorrhage.
    pub hemorrhage_threshold_percent: f64,
    /// Tumour confidence, in percent, required before morphometry runs.
    pub tumor_confidence_gate: f64,
    /// Malignancy probability above which a non-traumatic skin label is overridden.
    pub malignancy_probability_gate: f64,
    /// Skin-label confidence below which the malignancy model is consulted.
    pub label_confidence_gate: f64,
    /// Side of the square neurology scans are resized to.
    pub scan_size: u32,
    pub worker_count: usize,
    /// Frames per second sampled from a video timeline.
    pub target_fps: u32,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            hemorrhage_threshold_percent: 15.0,
            tumor_confidence_gate: 70.0,
            malignancy_probability_gate: 0.65,
            label_confidence_gate: 0.80,
            scan_size: 224,
            worker_count: num_cpus::get(),
            target_fps: 10,
        }
    }
}

impl TriageConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
