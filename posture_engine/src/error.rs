// THEORY:
// The `error` module collects every failure the engine can report. Per-frame
// problems (occlusion, degenerate geometry) are transient and local to one
// frame; session-level problems (missing baseline, failed calibration, bad
// configuration) are surfaced to the operator. Insufficient visibility is *not*
// an error here: it is a normal, tagged outcome of extraction (see `landmarks`).

use std::path::PathBuf;
use thiserror::Error;

/// Raised by the angle calculator when a ray has zero length.
/// A 0° angle is a legitimate "perfectly aligned" result, so an unmeasurable
/// angle is never folded into it.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeometryError {
    #[error("degenerate geometry: a ray from the vertex has zero length")]
    Degenerate,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("calibration was aborted before a stable pose was found")]
    Aborted,
    #[error("insufficient stable data: collected {collected} of {required} stable frames")]
    InsufficientStableData { collected: usize, required: usize },
}

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("baseline file {0} not found; run calibration first")]
    NotFound(PathBuf),
    #[error("baseline io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("baseline file {path} is not a valid angle map: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("baseline for {path} could not be encoded: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} could not be parsed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum FrameSourceError {
    #[error("frame source io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Crate-level error for callers that drive whole sessions.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Baseline(#[from] BaselineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    FrameSource(#[from] FrameSourceError),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
