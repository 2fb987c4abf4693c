// THEORY:
// The `baseline` module owns the user's personal "good posture" reference and
// its persistence. The baseline is the only state that outlives a session: it is
// written once by calibration, read at the start of monitoring, and overwritten
// in place by adaptive updates. It is never deleted.
//
// On disk it is a flat JSON object of axis name to degrees:
//     {"torso_recline": 94.3, "neck_protraction": 83.1, "back_curve": 171.2}
// An axis missing from the file is simply "not tracked" for that user.

use crate::core_modules::posture_angles::{AngleTriple, Axis};
use crate::error::BaselineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Calibrated reference angles, one per tracked axis, in degrees.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct Baseline {
    angles: BTreeMap<Axis, f64>,
}

impl From<BTreeMap<String, f64>> for Baseline {
    fn from(raw: BTreeMap<String, f64>) -> Self {
        let mut angles = BTreeMap::new();
        for (name, degrees) in raw {
            match name.parse::<Axis>() {
                Ok(axis) => {
                    angles.insert(axis, degrees);
                }
                Err(()) => warn!(key = %name, "ignoring unknown axis in baseline"),
            }
        }
        Self { angles }
    }
}

impl From<Baseline> for BTreeMap<String, f64> {
    fn from(baseline: Baseline) -> Self {
        baseline
            .angles
            .into_iter()
            .map(|(axis, degrees)| (axis.as_str().to_string(), degrees))
            .collect()
    }
}

impl From<AngleTriple> for Baseline {
    fn from(angles: AngleTriple) -> Self {
        Self {
            angles: angles.iter().collect(),
        }
    }
}

impl FromIterator<(Axis, f64)> for Baseline {
    fn from_iter<I: IntoIterator<Item = (Axis, f64)>>(iter: I) -> Self {
        Self {
            angles: iter.into_iter().collect(),
        }
    }
}

impl Baseline {
    pub fn get(&self, axis: Axis) -> Option<f64> {
        self.angles.get(&axis).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, f64)> + '_ {
        self.angles.iter().map(|(axis, degrees)| (*axis, *degrees))
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    /// Exponentially smooths every tracked axis toward `current`:
    /// `b = b * (1 - alpha) + current * alpha`.
    pub fn adapt_toward(&mut self, current: &AngleTriple, alpha: f64) {
        for (axis, degrees) in self.angles.iter_mut() {
            *degrees = *degrees * (1.0 - alpha) + current.get(*axis) * alpha;
        }
    }
}

/// Where baselines live between sessions.
pub trait BaselineStore {
    fn load(&self) -> Result<Baseline, BaselineError>;
    fn save(&mut self, baseline: &Baseline) -> Result<(), BaselineError>;
}

/// Stores the baseline as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }

    fn io_error(&self, source: std::io::Error) -> BaselineError {
        BaselineError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl BaselineStore for JsonFileStore {
    fn load(&self) -> Result<Baseline, BaselineError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BaselineError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_str(&content).map_err(|source| BaselineError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&mut self, baseline: &Baseline) -> Result<(), BaselineError> {
        let content = serde_json::to_string_pretty(baseline).map_err(|source| BaselineError::Encode {
            path: self.path.clone(),
            source,
        })?;

        // Write beside the target and swap it in, so a crash never leaves half a file.
        let staging = self.staging_path();
        fs::write(&staging, content).map_err(|e| self.io_error(e))?;
        if let Err(e) = fs::rename(&staging, &self.path) {
            if let Err(cleanup) = fs::remove_file(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "could not remove staged baseline");
            }
            return Err(self.io_error(e));
        }
        Ok(())
    }
}

/// Keeps the baseline in memory; every save is recorded.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    current: Option<Baseline>,
    pub saves: usize,
}

impl MemoryStore {
    pub fn with_baseline(baseline: Baseline) -> Self {
        Self {
            current: Some(baseline),
            saves: 0,
        }
    }

    pub fn current(&self) -> Option<&Baseline> {
        self.current.as_ref()
    }
}

impl BaselineStore for MemoryStore {
    fn load(&self) -> Result<Baseline, BaselineError> {
        self.current
            .clone()
            .ok_or_else(|| BaselineError::NotFound(PathBuf::from("<memory>")))
    }

    fn save(&mut self, baseline: &Baseline) -> Result<(), BaselineError> {
        self.current = Some(baseline.clone());
        self.saves += 1;
        Ok(())
    }
}
