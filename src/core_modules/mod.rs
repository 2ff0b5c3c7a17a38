// Primitives
pub mod pixel;
pub mod mask;
pub mod region;
pub mod blob_detector;
pub mod shape;
pub mod filters;
pub mod rules;

// Stages
pub mod calibration;
pub mod segmentation;
pub mod geometry;
pub mod validator;
pub mod classifier;
pub mod severity;
pub mod skin_labels;

// Domains
pub mod dermatology;
pub mod neurology;
pub mod surgery;

pub mod utils;
