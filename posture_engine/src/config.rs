// THEORY:
// The `config` module gathers every tunable of the engine into one
// serde-backed `EngineConfig`. Each component takes its own section at
// construction time and never reads configuration again. A config file only
// needs the values it overrides; everything else falls back to `Default`.

use crate::core_modules::geometry::Point3;
use crate::core_modules::posture_angles::Axis;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How the extractor chooses which body side to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideSelection {
    /// Use whichever shoulder the model is more confident about.
    #[default]
    MostVisibleShoulder,
    /// Use the left side if all of it is visible, otherwise the right side.
    LeftThenRight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// A landmark must be strictly more visible than this to be used.
    pub visibility_threshold: f64,
    pub side_selection: SideSelection,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.5,
            side_selection: SideSelection::default(),
        }
    }
}

/// A rectangle in normalized image space that the user must sit inside
/// during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for CaptureRegion {
    fn default() -> Self {
        Self {
            x_min: 0.0,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 1.0,
        }
    }
}

impl CaptureRegion {
    pub fn contains(&self, point: &Point3) -> bool {
        (self.x_min..=self.x_max).contains(&point.x) && (self.y_min..=self.y_max).contains(&point.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Frames held in each axis's rolling window.
    pub window_capacity: usize,
    /// Every axis's rolling standard deviation must stay below this.
    pub jitter_threshold_deg: f64,
    /// Consecutive low-jitter frames needed to accept the pose.
    pub stable_frames_required: usize,
    pub capture_region: CaptureRegion,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_capacity: 30,
            jitter_threshold_deg: 1.5,
            stable_frames_required: 90,
            capture_region: CaptureRegion::default(),
        }
    }
}

/// Which direction of deviation from the baseline counts against an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Any deviation, either way, is penalized.
    Absolute,
    /// Only falling below the baseline is penalized.
    LowerIsWorse,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisScoring {
    /// Deviation (degrees) at which the axis score reaches 0.
    pub zero_score_threshold: f64,
    /// Deviation (degrees) beyond which the frame counts as slouching.
    pub alert_threshold: f64,
    /// Weight of this axis in the aggregate score.
    pub weight: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub torso_recline: AxisScoring,
    pub neck_protraction: AxisScoring,
    pub back_curve: AxisScoring,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            torso_recline: AxisScoring {
                zero_score_threshold: 15.0,
                alert_threshold: 15.0,
                weight: 1.0,
                direction: Direction::Absolute,
            },
            neck_protraction: AxisScoring {
                zero_score_threshold: 15.0,
                alert_threshold: 15.0,
                weight: 1.0,
                direction: Direction::Absolute,
            },
            back_curve: AxisScoring {
                zero_score_threshold: 20.0,
                alert_threshold: 15.0,
                weight: 1.0,
                direction: Direction::LowerIsWorse,
            },
        }
    }
}

impl ScoringConfig {
    pub fn axis(&self, axis: Axis) -> &AxisScoring {
        match axis {
            Axis::TorsoRecline => &self.torso_recline,
            Axis::NeckProtraction => &self.neck_protraction,
            Axis::BackCurve => &self.back_curve,
        }
    }

    pub fn axis_mut(&mut self, axis: Axis) -> &mut AxisScoring {
        match axis {
            Axis::TorsoRecline => &mut self.torso_recline,
            Axis::NeckProtraction => &mut self.neck_protraction,
            Axis::BackCurve => &mut self.back_curve,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Seconds of continuous slouching before the alert is raised (T1).
    pub initial_deviation_secs: f64,
    /// Seconds of continuous slouching before the alert escalates (T2).
    pub sustained_alert_secs: f64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            initial_deviation_secs: 5.0,
            sustained_alert_secs: 15.0,
        }
    }
}

impl TimerConfig {
    pub fn initial_deviation(&self) -> Duration {
        Duration::try_from_secs_f64(self.initial_deviation_secs).unwrap_or_default()
    }

    pub fn sustained_alert(&self) -> Duration {
        Duration::try_from_secs_f64(self.sustained_alert_secs).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    pub enabled: bool,
    /// Consecutive good frames before the baseline is nudged.
    pub good_frames_required: u32,
    /// Exponential smoothing factor toward the current angles.
    pub alpha: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            good_frames_required: 300,
            alpha: 0.08,
        }
    }
}

/// Configuration for the whole engine, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub extraction: ExtractionConfig,
    pub calibration: CalibrationConfig,
    pub scoring: ScoringConfig,
    pub timer: TimerConfig,
    pub adaptation: AdaptationConfig,
}

impl EngineConfig {
    /// Tighter thresholds and a longer hold for calibration.
    pub fn strict() -> Self {
        let mut config = Self::default();
        config.calibration.jitter_threshold_deg = 1.0;
        config.calibration.stable_frames_required = 150;
        config.timer.initial_deviation_secs = 3.0;
        config.timer.sustained_alert_secs = 10.0;
        for axis in Axis::ALL {
            config.scoring.axis_mut(axis).alert_threshold = 10.0;
        }
        config
    }

    /// Looser thresholds suited to noisy cameras.
    pub fn lenient() -> Self {
        let mut config = Self::default();
        config.calibration.jitter_threshold_deg = 2.5;
        config.calibration.stable_frames_required = 75;
        config.timer.initial_deviation_secs = 8.0;
        config.timer.sustained_alert_secs = 30.0;
        for axis in Axis::ALL {
            config.scoring.axis_mut(axis).alert_threshold = 20.0;
        }
        config
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(0.0..=1.0).contains(&self.extraction.visibility_threshold) {
            return invalid(format!(
                "visibility_threshold must be within [0, 1], got {}",
                self.extraction.visibility_threshold
            ));
        }

        let calibration = &self.calibration;
        if calibration.window_capacity < 2 {
            return invalid(format!(
                "window_capacity must be at least 2 to measure jitter, got {}",
                calibration.window_capacity
            ));
        }
        if calibration.stable_frames_required == 0 {
            return invalid("stable_frames_required must be positive".to_string());
        }
        if !(calibration.jitter_threshold_deg > 0.0) {
            return invalid(format!(
                "jitter_threshold_deg must be positive, got {}",
                calibration.jitter_threshold_deg
            ));
        }
        let region = &calibration.capture_region;
        if !(region.x_min < region.x_max && region.y_min < region.y_max) {
            return invalid(format!("capture_region is empty: {region:?}"));
        }

        for axis in Axis::ALL {
            let scoring = self.scoring.axis(axis);
            if !(scoring.zero_score_threshold > 0.0) {
                return invalid(format!("{axis}: zero_score_threshold must be positive"));
            }
            if !(scoring.alert_threshold >= 0.0) {
                return invalid(format!("{axis}: alert_threshold must not be negative"));
            }
            if !(scoring.weight >= 0.0) {
                return invalid(format!("{axis}: weight must not be negative"));
            }
        }

        let timer = &self.timer;
        if !(timer.initial_deviation_secs >= 0.0) {
            return invalid("initial_deviation_secs must not be negative".to_string());
        }
        if !(timer.sustained_alert_secs > timer.initial_deviation_secs) {
            return invalid(format!(
                "sustained_alert_secs ({}) must exceed initial_deviation_secs ({})",
                timer.sustained_alert_secs, timer.initial_deviation_secs
            ));
        }

        let adaptation = &self.adaptation;
        if adaptation.enabled {
            if !(adaptation.alpha > 0.0 && adaptation.alpha <= 1.0) {
                return invalid(format!("alpha must be within (0, 1], got {}", adaptation.alpha));
            }
            if adaptation.good_frames_required == 0 {
                return invalid("good_frames_required must be positive".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_presets_are_valid() {
        EngineConfig::default().validate().unwrap();
        EngineConfig::strict().validate().unwrap();
        EngineConfig::lenient().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [calibration]
            stable_frames_required = 120

            [timer]
            sustained_alert_secs = 20.0
            "#,
        )
        .unwrap();

        assert_eq!(config.calibration.stable_frames_required, 120);
        assert_eq!(config.calibration.window_capacity, 30);
        assert_eq!(config.timer.sustained_alert_secs, 20.0);
        assert_eq!(config.timer.initial_deviation_secs, 5.0);
        assert_eq!(config.scoring, ScoringConfig::default());
    }

    #[test]
    fn sustained_must_exceed_initial() {
        let mut config = EngineConfig::default();
        config.timer.sustained_alert_secs = config.timer.initial_deviation_secs;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_capture_region_is_rejected() {
        let mut config = EngineConfig::default();
        config.calibration.capture_region.x_min = 0.8;
        config.calibration.capture_region.x_max = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let config = EngineConfig::strict();
        fs::write(&path, config.to_toml().unwrap()).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn region_bounds_are_inclusive() {
        let region = CaptureRegion {
            x_min: 0.2,
            x_max: 0.8,
            y_min: 0.1,
            y_max: 0.9,
        };
        assert!(region.contains(&Point3::planar(0.2, 0.9)));
        assert!(!region.contains(&Point3::planar(0.19, 0.5)));
    }
}
