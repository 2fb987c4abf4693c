// THEORY:
// The `pipeline` module is the top-level API of the posture engine. It wires the
// per-frame stages into the two sessions a user actually runs:
//
//     Calibration: landmarks -> extract -> frame check -> angles -> stabilizer -> baseline
//     Monitoring:  landmarks -> extract -> angles -> scorer -> slouch timer -> report
//
// Key architectural principles:
// 1.  **Frames Never Fail the Session**: Occlusion, missing landmarks and
//     degenerate geometry are reported per frame and the session carries on.
//     During monitoring such frames leave the slouch timer untouched.
// 2.  **Baseline First**: Monitoring cannot start without a stored baseline. The
//     missing baseline is surfaced immediately, never papered over with defaults.
// 3.  **Injected Time**: Sessions take the frame's `Instant` from the caller, so
//     recordings replay with their own timing and tests need no real clock.

use crate::baseline::{Baseline, BaselineStore};
use crate::config::{CaptureRegion, EngineConfig};
use crate::core_modules::geometry::Point3;
use crate::core_modules::landmarks::{Extraction, InsufficientVisibility, LandmarkExtractor, LandmarkFrame};
use crate::core_modules::posture_angles::{AngleTriple, derive_angles};
use crate::core_modules::scorer::{PostureScore, PostureScorer};
use crate::core_modules::slouch_timer::{Alert, SlouchPhase, SlouchTimer, TimerUpdate};
use crate::core_modules::stabilizer::{CalibrationProgress, CalibrationStabilizer};
use crate::error::{BaselineError, CalibrationError, EngineError, FrameSourceError};
use crate::source::{PoseFrame, PoseSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why a frame produced no posture evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    /// The pose model saw nobody.
    NoPerson,
    Insufficient(InsufficientVisibility),
    /// Landmarks coincided, so an angle was unmeasurable.
    Degenerate,
    /// The body left the configured capture region (calibration only).
    OutOfFrame,
}

/// Turns raw landmarks into angles, or says why it could not.
fn observe(
    extractor: &LandmarkExtractor,
    landmarks: Option<&LandmarkFrame>,
) -> Result<(AngleTriple, [Point3; 3]), SkipReason> {
    let frame = landmarks.ok_or(SkipReason::NoPerson)?;
    let sample = match extractor.extract(frame) {
        Extraction::Extracted(sample) => sample,
        Extraction::Insufficient(why) => {
            debug!(%why, "landmarks not visible enough");
            return Err(SkipReason::Insufficient(why));
        }
    };
    let angles = derive_angles(&sample).map_err(|e| {
        warn!(error = %e, side = ?sample.side, "skipping frame with unmeasurable angles");
        SkipReason::Degenerate
    })?;
    Ok((angles, sample.points()))
}

/// Drives the stabilizer from raw landmark frames.
pub struct CalibrationSession {
    extractor: LandmarkExtractor,
    region: CaptureRegion,
    stabilizer: CalibrationStabilizer,
}

impl CalibrationSession {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            extractor: LandmarkExtractor::new(&config.extraction),
            region: config.calibration.capture_region,
            stabilizer: CalibrationStabilizer::new(&config.calibration),
        }
    }

    /// Feeds one frame. Any skipped frame breaks the current steady run.
    pub fn process_frame(&mut self, landmarks: Option<&LandmarkFrame>) -> (CalibrationProgress, Option<SkipReason>) {
        let observation = observe(&self.extractor, landmarks).and_then(|(angles, points)| {
            if points.iter().all(|p| self.region.contains(p)) {
                Ok(angles)
            } else {
                Err(SkipReason::OutOfFrame)
            }
        });

        match observation {
            Ok(angles) => (self.stabilizer.update(Some(&angles)), None),
            Err(reason) => {
                debug!(?reason, "calibration frame unusable");
                (self.stabilizer.update(None), Some(reason))
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stabilizer.baseline().is_some()
    }

    pub fn progress(&self) -> CalibrationProgress {
        self.stabilizer.progress()
    }

    pub fn abort(&mut self) {
        self.stabilizer.abort();
    }

    pub fn finish(self) -> Result<Baseline, CalibrationError> {
        self.stabilizer.finish()
    }
}

/// The evaluation of one monitored frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PostureReport {
    pub angles: AngleTriple,
    pub score: PostureScore,
    pub timer: TimerUpdate,
    /// The adapted baseline could not be written back; monitoring continues.
    pub persist_failed: bool,
}

/// The per-frame output of monitoring.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameReport {
    Skipped(SkipReason),
    Evaluated(PostureReport),
}

impl FrameReport {
    pub fn alert(&self) -> Option<Alert> {
        match self {
            FrameReport::Skipped(_) => None,
            FrameReport::Evaluated(report) => Some(report.timer.alert),
        }
    }
}

/// Scores frames against a stored baseline and times sustained slouching.
pub struct MonitorSession<S> {
    extractor: LandmarkExtractor,
    scorer: PostureScorer,
    timer: SlouchTimer,
    baseline: Baseline,
    store: S,
}

impl<S: BaselineStore> MonitorSession<S> {
    /// Loads the baseline from `store`. A missing baseline is an error.
    pub fn start(config: &EngineConfig, store: S) -> Result<Self, BaselineError> {
        let baseline = store.load()?;
        if baseline.is_empty() {
            warn!("baseline tracks no axes; every frame will score as unscored");
        }
        info!(?baseline, "monitoring against stored baseline");
        Ok(Self {
            extractor: LandmarkExtractor::new(&config.extraction),
            scorer: PostureScorer::new(&config.scoring),
            timer: SlouchTimer::new(&config.timer, &config.adaptation),
            baseline,
            store,
        })
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn timer(&self) -> &SlouchTimer {
        &self.timer
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn process_frame(&mut self, landmarks: Option<&LandmarkFrame>, now: Instant) -> FrameReport {
        let angles = match observe(&self.extractor, landmarks) {
            Ok((angles, _)) => angles,
            Err(reason) => {
                debug!(?reason, "monitoring frame skipped");
                return FrameReport::Skipped(reason);
            }
        };

        let score = self.scorer.evaluate(&angles, &self.baseline);
        let timer = self
            .timer
            .update(score.is_slouching(), &angles, &mut self.baseline, now);

        let mut persist_failed = false;
        if timer.baseline_adapted {
            if let Err(e) = self.store.save(&self.baseline) {
                warn!(error = %e, "failed to persist adapted baseline");
                persist_failed = true;
            }
        }

        FrameReport::Evaluated(PostureReport {
            angles,
            score,
            timer,
            persist_failed,
        })
    }
}

/// Counters for a finished monitoring run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub frames: u64,
    pub skipped: u64,
    pub malformed: u64,
    pub alerts: u64,
    pub escalations: u64,
    pub adaptations: u64,
}

/// Pulls the next frame, stepping over malformed lines. I/O failures end the run.
fn next_usable_frame<P: PoseSource>(source: &mut P, malformed: &mut u64) -> Result<Option<PoseFrame>, FrameSourceError> {
    loop {
        match source.next_frame() {
            Err(FrameSourceError::Malformed { line, source }) => {
                warn!(line, error = %source, "skipping malformed frame");
                *malformed += 1;
            }
            other => return other,
        }
    }
}

/// Runs calibration over `source` until a baseline is found, the stream ends,
/// or `stop` is raised. On success the baseline is saved to `store`.
pub fn run_calibration<P, S, F>(
    source: &mut P,
    config: &EngineConfig,
    store: &mut S,
    stop: &AtomicBool,
    mut on_progress: F,
) -> Result<Baseline, EngineError>
where
    P: PoseSource,
    S: BaselineStore,
    F: FnMut(&CalibrationProgress),
{
    let mut session = CalibrationSession::new(config);
    let mut malformed = 0;

    while !session.is_complete() {
        if stop.load(Ordering::Relaxed) {
            session.abort();
            break;
        }
        let Some(frame) = next_usable_frame(source, &mut malformed)? else {
            break;
        };
        let (progress, _) = session.process_frame(frame.landmarks.as_ref());
        on_progress(&progress);
    }

    let baseline = session.finish()?;
    store.save(&baseline)?;
    info!(?baseline, malformed, "calibration complete; baseline saved");
    Ok(baseline)
}

/// Monitors every frame of `source` until it ends or `stop` is raised. Frame
/// timestamps are laid out relative to `origin`.
pub fn run_monitor<P, S, F>(
    source: &mut P,
    session: &mut MonitorSession<S>,
    origin: Instant,
    stop: &AtomicBool,
    mut on_report: F,
) -> Result<MonitorSummary, EngineError>
where
    P: PoseSource,
    S: BaselineStore,
    F: FnMut(&PoseFrame, &FrameReport),
{
    let mut summary = MonitorSummary::default();

    while !stop.load(Ordering::Relaxed) {
        let Some(frame) = next_usable_frame(source, &mut summary.malformed)? else {
            break;
        };
        let report = session.process_frame(frame.landmarks.as_ref(), origin + frame.elapsed());

        summary.frames += 1;
        match &report {
            FrameReport::Skipped(_) => summary.skipped += 1,
            FrameReport::Evaluated(posture) => {
                let timer = &posture.timer;
                // One sparse frame may enter the alert already escalated.
                if timer.transitioned && timer.state.phase() == SlouchPhase::SustainedAlert {
                    summary.alerts += 1;
                }
                if timer.newly_escalated {
                    summary.escalations += 1;
                }
                if timer.baseline_adapted {
                    summary.adaptations += 1;
                }
            }
        }
        on_report(&frame, &report);
    }

    info!(?summary, "monitoring finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MemoryStore;
    use crate::core_modules::landmarks::{LandmarkName, LandmarkPoint};
    use crate::core_modules::posture_angles::Axis;
    use crate::source::VecSource;
    use std::time::Duration;

    fn point(x: f64, y: f64) -> LandmarkPoint {
        LandmarkPoint {
            x,
            y,
            z: 0.0,
            visibility: 0.99,
        }
    }

    /// Left side, hip at (0.5, 0.8), shoulder straight above, ear offset by `lean`.
    fn seated(lean: f64) -> LandmarkFrame {
        [
            (LandmarkName::LeftHip, point(0.5, 0.8)),
            (LandmarkName::LeftShoulder, point(0.5, 0.5)),
            (LandmarkName::LeftEar, point(0.5 + lean, 0.3)),
            (LandmarkName::RightShoulder, LandmarkPoint { visibility: 0.1, ..point(0.5, 0.5) }),
        ]
        .into_iter()
        .collect()
    }

    fn small_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.calibration.window_capacity = 3;
        config.calibration.stable_frames_required = 4;
        config
    }

    #[test]
    fn calibration_skips_out_of_frame_bodies() {
        let mut config = small_config();
        config.calibration.capture_region.x_max = 0.4;
        let mut session = CalibrationSession::new(&config);

        let (progress, skipped) = session.process_frame(Some(&seated(0.0)));
        assert_eq!(skipped, Some(SkipReason::OutOfFrame));
        assert_eq!(progress.window_fill, 0);
    }

    #[test]
    fn calibration_saves_baseline_to_store() {
        let config = small_config();
        let frames = (0..10).map(|i| PoseFrame {
            timestamp_ms: i * 33,
            landmarks: Some(seated(0.0)),
        });
        let mut store = MemoryStore::default();
        let stop = AtomicBool::new(false);

        let mut reports = 0;
        let baseline = run_calibration(&mut VecSource::new(frames), &config, &mut store, &stop, |_| reports += 1).unwrap();

        // Completion lands on frame window - 1 + required.
        assert_eq!(reports, 6);
        assert_eq!(store.current(), Some(&baseline));
        assert!((baseline.get(Axis::BackCurve).unwrap() - 180.0).abs() < 1e-5);
    }

    fn upright_frames(count: u64) -> VecSource {
        VecSource::new((0..count).map(|i| PoseFrame {
            timestamp_ms: i * 33,
            landmarks: Some(seated(0.0)),
        }))
    }

    #[test]
    fn raised_stop_aborts_calibration_without_saving() {
        let config = small_config();
        let stop = AtomicBool::new(true);
        let mut store = MemoryStore::default();
        let result = run_calibration(&mut upright_frames(10), &config, &mut store, &stop, |_| {});

        assert!(matches!(result, Err(EngineError::Calibration(CalibrationError::Aborted))));
        assert_eq!(store.saves, 0);
        assert!(store.current().is_none());
    }

    #[test]
    fn stream_ending_early_saves_nothing() {
        let config = small_config();
        let stop = AtomicBool::new(false);
        let mut store = MemoryStore::default();
        // Five frames: the window fills on the third, so only three are steady.
        let result = run_calibration(&mut upright_frames(5), &config, &mut store, &stop, |_| {});

        assert!(matches!(
            result,
            Err(EngineError::Calibration(CalibrationError::InsufficientStableData {
                collected: 3,
                required: 4
            }))
        ));
        assert_eq!(store.saves, 0);
        assert!(store.current().is_none());
    }

    #[test]
    fn monitoring_requires_a_baseline() {
        let result = MonitorSession::start(&EngineConfig::default(), MemoryStore::default());
        assert!(matches!(result, Err(BaselineError::NotFound(_))));
    }

    #[test]
    fn skipped_frames_leave_the_timer_alone() {
        let baseline = Baseline::from(AngleTriple::new(0.0, 0.0, 180.0));
        let mut session = MonitorSession::start(&EngineConfig::default(), MemoryStore::with_baseline(baseline)).unwrap();
        let t0 = Instant::now();

        let report = session.process_frame(Some(&seated(0.2)), t0);
        assert_eq!(report.alert(), Some(Alert::Adjusting));

        assert_eq!(session.process_frame(None, t0 + Duration::from_secs(1)), FrameReport::Skipped(SkipReason::NoPerson));
        assert_eq!(session.timer().state().phase(), SlouchPhase::InitialDeviation);
    }

    #[test]
    fn coincident_landmarks_are_skipped_as_degenerate() {
        let baseline = Baseline::from(AngleTriple::new(0.0, 0.0, 180.0));
        let mut session = MonitorSession::start(&EngineConfig::default(), MemoryStore::with_baseline(baseline)).unwrap();
        let t0 = Instant::now();
        session.process_frame(Some(&seated(0.2)), t0);

        let mut collapsed = seated(0.0);
        collapsed.insert(LandmarkName::LeftEar, point(0.5, 0.5));
        let report = session.process_frame(Some(&collapsed), t0 + Duration::from_secs(1));

        assert_eq!(report, FrameReport::Skipped(SkipReason::Degenerate));
        assert_eq!(session.timer().state().phase(), SlouchPhase::InitialDeviation);
        assert_eq!(session.timer().state().deviation_start(), Some(t0));
    }

    #[test]
    fn sparse_frame_past_both_thresholds_counts_as_an_alert() {
        let baseline = Baseline::from(AngleTriple::new(0.0, 0.0, 180.0));
        let mut session = MonitorSession::start(&EngineConfig::default(), MemoryStore::with_baseline(baseline)).unwrap();
        let stop = AtomicBool::new(false);
        let frames = [0, 20_000].map(|timestamp_ms| PoseFrame {
            timestamp_ms,
            landmarks: Some(seated(0.2)),
        });

        let summary = run_monitor(&mut VecSource::new(frames), &mut session, Instant::now(), &stop, |_, _| {}).unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.alerts, 1);
        assert_eq!(summary.escalations, 1);
    }

    #[test]
    fn adapted_baseline_is_persisted() {
        let mut config = EngineConfig::default();
        config.adaptation.good_frames_required = 2;
        let baseline = Baseline::from(AngleTriple::new(0.0, 0.0, 175.0));
        let mut session = MonitorSession::start(&config, MemoryStore::with_baseline(baseline)).unwrap();
        let t0 = Instant::now();

        session.process_frame(Some(&seated(0.0)), t0);
        let report = session.process_frame(Some(&seated(0.0)), t0);
        let FrameReport::Evaluated(posture) = report else {
            panic!("frame should have been evaluated");
        };
        assert!(posture.timer.baseline_adapted);
        assert!(!posture.persist_failed);

        let store = session.into_store();
        assert_eq!(store.saves, 1);
        assert!(store.current().unwrap().get(Axis::BackCurve).unwrap() > 175.0);
    }
}
