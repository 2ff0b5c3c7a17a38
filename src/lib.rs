// THEORY:
// This file is the main entry point for the `triage_vision` library crate.
// It exposes `TriagePipeline` (one image in, one assessment out) and
// `ParallelPipeline` (many independent frames in, one ordered timeline out) as the
// high-level interface of the engine.
//
// The stages themselves live in `core_modules` and are public so each can be tested
// and reused on its own: calibration, segmentation, geometry, validation,
// classification and severity, plus the three domain orchestrators that chain them.
// External models never live here; they are injected through `collaborators`.

pub mod collaborators;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
