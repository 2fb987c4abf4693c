// THEORY:
// The `stabilizer` is the calibration layer. It watches a live stream of posture
// angles and decides when the user has held one pose still enough, for long
// enough, that the pose can serve as their personal baseline.
//
// Key architectural principles:
// 1.  **Rolling Jitter**: Each axis keeps a bounded `StabilityWindow` of recent
//     angles. Jitter is the sample standard deviation of that window; the pose
//     is "steady" for a frame only when every axis's jitter is under threshold.
// 2.  **Unbroken Runs**: Steady frames are counted consecutively. Any unsteady,
//     occluded, or out-of-frame observation breaks the run and throws away what
//     was accumulated. The baseline is the mean of the *final unbroken run* only,
//     never of everything seen.
// 3.  **Terminal Outcomes**: `StableEnough` and `Aborted` are terminal. Once
//     reached, further frames are ignored.

use crate::baseline::Baseline;
use crate::config::CalibrationConfig;
use crate::core_modules::posture_angles::{AngleTriple, Axis};
use crate::error::CalibrationError;
use std::collections::VecDeque;
use tracing::{debug, info};

/// A bounded, order-preserving history of one axis's recent angles.
#[derive(Debug, Clone)]
pub struct StabilityWindow {
    history: VecDeque<f64>,
    capacity: usize,
}

impl StabilityWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Appends a value, evicting the oldest once capacity is exceeded.
    pub fn push(&mut self, value: f64) {
        self.history.push_back(value);
        if self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.history.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Sample (n - 1) standard deviation, or `None` with fewer than two values.
    pub fn std_dev(&self) -> Option<f64> {
        let count = self.history.len();
        if count < 2 {
            return None;
        }
        let mean = self.history.iter().sum::<f64>() / count as f64;
        let variance = self
            .history
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (count - 1) as f64;
        Some(variance.sqrt())
    }
}

/// Where calibration stands.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationState {
    Searching,
    StableEnough(Baseline),
    Aborted,
}

/// A per-frame snapshot for progress reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationProgress {
    /// Frames currently held in the (shared-length) stability windows.
    pub window_fill: usize,
    pub window_capacity: usize,
    /// Length of the current unbroken steady run.
    pub stable_frames: usize,
    pub stable_frames_required: usize,
    /// Per-axis jitter for this frame, once the windows are full.
    pub jitter: Option<AngleTriple>,
    pub is_complete: bool,
    pub is_aborted: bool,
}

impl CalibrationProgress {
    /// Fraction of the required steady run achieved, in [0, 1].
    pub fn fraction(&self) -> f64 {
        (self.stable_frames as f64 / self.stable_frames_required as f64).min(1.0)
    }
}

/// Detects a held, low-jitter pose and emits its mean as a baseline.
#[derive(Debug, Clone)]
pub struct CalibrationStabilizer {
    windows: [StabilityWindow; 3],
    accumulated: Vec<AngleTriple>,
    jitter_threshold: f64,
    stable_frames_required: usize,
    state: CalibrationState,
    last_jitter: Option<AngleTriple>,
}

impl CalibrationStabilizer {
    pub fn new(config: &CalibrationConfig) -> Self {
        let window = StabilityWindow::new(config.window_capacity);
        Self {
            windows: [window.clone(), window.clone(), window],
            accumulated: Vec::with_capacity(config.stable_frames_required),
            jitter_threshold: config.jitter_threshold_deg,
            stable_frames_required: config.stable_frames_required,
            state: CalibrationState::Searching,
            last_jitter: None,
        }
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        match &self.state {
            CalibrationState::StableEnough(baseline) => Some(baseline),
            _ => None,
        }
    }

    /// Feeds one frame's observation. `None` means no usable pose this frame
    /// (occluded, degenerate, or outside the capture region).
    pub fn update(&mut self, angles: Option<&AngleTriple>) -> CalibrationProgress {
        if matches!(self.state, CalibrationState::Searching) {
            match angles {
                Some(angles) => self.observe(angles),
                None => {
                    if self.window_fill() > 0 {
                        debug!(
                            stable_frames = self.accumulated.len(),
                            "no usable pose; resetting stability windows"
                        );
                    }
                    self.reset();
                }
            }
        }
        self.progress()
    }

    /// Cancels calibration. Has no effect once a baseline has been found.
    pub fn abort(&mut self) {
        if matches!(self.state, CalibrationState::Searching) {
            info!(stable_frames = self.accumulated.len(), "calibration aborted");
            self.state = CalibrationState::Aborted;
        }
    }

    /// Consumes the stabilizer at end of stream, yielding the baseline if one
    /// was found.
    pub fn finish(self) -> Result<Baseline, CalibrationError> {
        match self.state {
            CalibrationState::StableEnough(baseline) => Ok(baseline),
            CalibrationState::Aborted => Err(CalibrationError::Aborted),
            CalibrationState::Searching => Err(CalibrationError::InsufficientStableData {
                collected: self.accumulated.len(),
                required: self.stable_frames_required,
            }),
        }
    }

    pub fn progress(&self) -> CalibrationProgress {
        CalibrationProgress {
            window_fill: self.window_fill(),
            window_capacity: self.windows[0].capacity,
            stable_frames: self.accumulated.len(),
            stable_frames_required: self.stable_frames_required,
            jitter: self.last_jitter,
            is_complete: matches!(self.state, CalibrationState::StableEnough(_)),
            is_aborted: matches!(self.state, CalibrationState::Aborted),
        }
    }

    fn observe(&mut self, angles: &AngleTriple) {
        for (window, axis) in self.windows.iter_mut().zip(Axis::ALL) {
            window.push(angles.get(axis));
        }

        if !self.windows.iter().all(StabilityWindow::is_full) {
            self.last_jitter = None;
            return;
        }

        let jitter = self.jitter();
        self.last_jitter = Some(jitter);

        let steady = jitter.iter().all(|(_, deviation)| deviation < self.jitter_threshold);
        if steady {
            self.accumulated.push(*angles);
        } else {
            if !self.accumulated.is_empty() {
                debug!(
                    run = self.accumulated.len(),
                    ?jitter,
                    "jitter above threshold; steady run broken"
                );
            }
            self.accumulated.clear();
        }

        if self.accumulated.len() >= self.stable_frames_required {
            let baseline = self.mean_of_run();
            info!(?baseline, "calibration pose held steady; baseline captured");
            self.state = CalibrationState::StableEnough(baseline);
        }
    }

    fn jitter(&self) -> AngleTriple {
        let [torso, neck, back] = &self.windows;
        AngleTriple::new(
            torso.std_dev().unwrap_or(0.0),
            neck.std_dev().unwrap_or(0.0),
            back.std_dev().unwrap_or(0.0),
        )
    }

    fn mean_of_run(&self) -> Baseline {
        let count = self.accumulated.len() as f64;
        Axis::ALL
            .into_iter()
            .map(|axis| {
                let sum: f64 = self.accumulated.iter().map(|a| a.get(axis)).sum();
                (axis, sum / count)
            })
            .collect()
    }

    fn window_fill(&self) -> usize {
        self.windows[0].len()
    }

    fn reset(&mut self) {
        for window in self.windows.iter_mut() {
            window.clear();
        }
        self.accumulated.clear();
        self.last_jitter = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window: usize, required: usize) -> CalibrationConfig {
        CalibrationConfig {
            window_capacity: window,
            jitter_threshold_deg: 1.0,
            stable_frames_required: required,
            ..CalibrationConfig::default()
        }
    }

    #[test]
    fn window_evicts_oldest() {
        let mut window = StabilityWindow::new(3);
        for v in [1.0, 2.0, 3.0, 10.0] {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert!(window.is_full());
        // Remaining values are 2, 3, 10.
        let expected = (((2.0f64 - 5.0).powi(2) + (3.0f64 - 5.0).powi(2) + 25.0) / 2.0).sqrt();
        assert!((window.std_dev().unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn constant_stream_completes_exactly_on_schedule() {
        let (window, required) = (5, 8);
        let mut stabilizer = CalibrationStabilizer::new(&config(window, required));
        let pose = AngleTriple::new(4.0, 12.0, 171.0);

        let frames_needed = window - 1 + required;
        for frame in 1..frames_needed {
            let progress = stabilizer.update(Some(&pose));
            assert!(!progress.is_complete, "completed early at frame {frame}");
        }
        let progress = stabilizer.update(Some(&pose));
        assert!(progress.is_complete);
        assert_eq!(stabilizer.finish().unwrap(), Baseline::from(pose));
    }

    #[test]
    fn occlusion_resets_the_run() {
        let mut stabilizer = CalibrationStabilizer::new(&config(3, 4));
        let pose = AngleTriple::new(1.0, 2.0, 170.0);

        for _ in 0..5 {
            stabilizer.update(Some(&pose));
        }
        assert_eq!(stabilizer.progress().stable_frames, 3);

        let progress = stabilizer.update(None);
        assert_eq!(progress.stable_frames, 0);
        assert_eq!(progress.window_fill, 0);

        // The windows must refill before counting resumes.
        stabilizer.update(Some(&pose));
        stabilizer.update(Some(&pose));
        assert_eq!(stabilizer.progress().stable_frames, 0);
        assert_eq!(stabilizer.update(Some(&pose)).stable_frames, 1);
    }

    #[test]
    fn baseline_is_mean_of_final_run_only() {
        let mut stabilizer = CalibrationStabilizer::new(&config(3, 3));
        let early = AngleTriple::new(30.0, 30.0, 120.0);
        let settled = AngleTriple::new(5.0, 10.0, 172.0);

        stabilizer.update(Some(&early));
        stabilizer.update(Some(&early));
        stabilizer.update(None);
        for _ in 0..5 {
            stabilizer.update(Some(&settled));
        }
        assert_eq!(stabilizer.finish().unwrap(), Baseline::from(settled));
    }

    #[test]
    fn early_end_of_stream_is_insufficient() {
        let mut stabilizer = CalibrationStabilizer::new(&config(3, 10));
        for _ in 0..6 {
            stabilizer.update(Some(&AngleTriple::new(1.0, 1.0, 179.0)));
        }
        assert_eq!(
            stabilizer.finish(),
            Err(CalibrationError::InsufficientStableData {
                collected: 4,
                required: 10
            })
        );
    }

    #[test]
    fn abort_is_terminal() {
        let mut stabilizer = CalibrationStabilizer::new(&config(2, 2));
        stabilizer.update(Some(&AngleTriple::default()));
        stabilizer.abort();
        for _ in 0..10 {
            assert!(stabilizer.update(Some(&AngleTriple::default())).is_aborted);
        }
        assert_eq!(stabilizer.finish(), Err(CalibrationError::Aborted));
    }
}
