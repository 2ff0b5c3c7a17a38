// THEORY:
// Only malformed input and broken plumbing are errors. "No tissue", "too large",
// "empty region" and "below the validation gate" are ordinary assessments and never
// appear here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("scale ratio must be a positive finite number, got {0}")]
    InvalidScale(f64),

    #[error("confidence must be within 0-100, got {0}")]
    InvalidConfidence(f64),

    #[error("external model failed: {0}")]
    Collaborator(String),

    #[error("worker pool unavailable: {0}")]
    WorkerPool(&'static str),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;
