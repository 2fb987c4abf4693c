// THEORY:
// This file is the main entry point for the `posture_engine` library crate.
// It defines the public API exposed to front ends such as `posture_tester`.
//
// The primary goal is to export the two sessions (`CalibrationSession`,
// `MonitorSession`) and their reports as the high-level interface of the
// engine, alongside the configuration and baseline persistence they need. The
// per-stage building blocks stay reachable under `core_modules` for callers
// that want to drive a single stage, but nothing requires it.

pub mod baseline;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod source;

pub use baseline::{Baseline, BaselineStore, JsonFileStore, MemoryStore};
pub use config::EngineConfig;
pub use core_modules::posture_angles::{AngleTriple, Axis};
pub use core_modules::slouch_timer::Alert;
pub use error::{EngineError, Result};
pub use pipeline::{
    CalibrationSession, FrameReport, MonitorSession, MonitorSummary, PostureReport, SkipReason,
    run_calibration, run_monitor,
};
pub use source::{JsonLinesSource, PoseFrame, PoseSource, VecSource};
