// THEORY:
// The `slouch_timer` is the behavioral layer of the engine. A single bad frame
// means nothing: people shift, reach, glance down. Only a deviation that
// *persists* is worth an alert. The timer turns the per-frame `is_slouching`
// flag into a time-based hysteresis:
//
//     Ideal --slouching--> InitialDeviation --(> T1)--> SustainedAlert --(> T2)--> escalated
//       ^                        |                             |
//       +------ not slouching ---+-------- not slouching ------+
//
// Key architectural principles:
// 1.  **Free-Running**: No state is terminal. The machine runs for the whole
//     monitoring session and returns to `Ideal` the instant posture recovers.
// 2.  **Strict Boundaries**: The alert changes only once the elapsed time is
//     *strictly greater* than T1 or T2, never at or before.
// 3.  **Adaptation Only When Good**: During a long run of good frames the
//     baseline is nudged toward the user's current angles, so a slightly too
//     strict calibration does not nag forever. This never happens while a
//     deviation is being timed.

use crate::baseline::Baseline;
use crate::config::{AdaptationConfig, TimerConfig};
use crate::core_modules::posture_angles::AngleTriple;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlouchState {
    Ideal,
    InitialDeviation { since: Instant },
    SustainedAlert { since: Instant, escalated: bool },
}

/// `SlouchState` without its timestamps, for reporting and comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlouchPhase {
    Ideal,
    InitialDeviation,
    SustainedAlert,
}

impl SlouchState {
    pub fn phase(&self) -> SlouchPhase {
        match self {
            SlouchState::Ideal => SlouchPhase::Ideal,
            SlouchState::InitialDeviation { .. } => SlouchPhase::InitialDeviation,
            SlouchState::SustainedAlert { .. } => SlouchPhase::SustainedAlert,
        }
    }

    /// When the current non-ideal run began.
    pub fn deviation_start(&self) -> Option<Instant> {
        match self {
            SlouchState::Ideal => None,
            SlouchState::InitialDeviation { since } | SlouchState::SustainedAlert { since, .. } => {
                Some(*since)
            }
        }
    }

    pub fn alert(&self) -> Alert {
        match self {
            SlouchState::Ideal => Alert::GoodPosture,
            SlouchState::InitialDeviation { .. } => Alert::Adjusting,
            SlouchState::SustainedAlert { escalated: false, .. } => Alert::BadPosture,
            SlouchState::SustainedAlert { escalated: true, .. } => Alert::Escalated,
        }
    }
}

/// What the operator is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Alert {
    GoodPosture,
    Adjusting,
    BadPosture,
    Escalated,
}

impl Alert {
    pub fn message(&self) -> &'static str {
        match self {
            Alert::GoodPosture => "Good Posture",
            Alert::Adjusting => "Adjusting...",
            Alert::BadPosture => "Bad Posture Detected!",
            Alert::Escalated => "Sustained Bad Posture - Take a Break!",
        }
    }
}

/// The outcome of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerUpdate {
    pub state: SlouchState,
    pub alert: Alert,
    /// The phase differs from the previous frame's.
    pub transitioned: bool,
    /// True only on the frame the escalation threshold was first crossed.
    pub newly_escalated: bool,
    /// Time spent in the current non-ideal run.
    pub deviation_elapsed: Option<Duration>,
    /// The baseline was nudged toward the current angles this frame.
    pub baseline_adapted: bool,
}

#[derive(Debug, Clone)]
pub struct SlouchTimer {
    state: SlouchState,
    initial_deviation: Duration,
    sustained_alert: Duration,
    adaptation: AdaptationConfig,
    good_frames: u32,
}

impl SlouchTimer {
    pub fn new(timer: &TimerConfig, adaptation: &AdaptationConfig) -> Self {
        Self {
            state: SlouchState::Ideal,
            initial_deviation: timer.initial_deviation(),
            sustained_alert: timer.sustained_alert(),
            adaptation: adaptation.clone(),
            good_frames: 0,
        }
    }

    pub fn state(&self) -> SlouchState {
        self.state
    }

    pub fn good_frames(&self) -> u32 {
        self.good_frames
    }

    /// Advances the state machine and, when due, adapts `baseline` toward `current`.
    pub fn update(
        &mut self,
        is_slouching: bool,
        current: &AngleTriple,
        baseline: &mut Baseline,
        now: Instant,
    ) -> TimerUpdate {
        let mut update = self.step(is_slouching, now);

        if !self.adaptation.enabled {
            return update;
        }
        if is_slouching || update.state != SlouchState::Ideal {
            self.good_frames = 0;
            return update;
        }

        self.good_frames += 1;
        if self.good_frames >= self.adaptation.good_frames_required {
            baseline.adapt_toward(current, self.adaptation.alpha);
            self.good_frames = 0;
            update.baseline_adapted = true;
            info!(?baseline, alpha = self.adaptation.alpha, "baseline adapted toward sustained good posture");
        }
        update
    }

    /// Advances the state machine only.
    pub fn step(&mut self, is_slouching: bool, now: Instant) -> TimerUpdate {
        let previous = self.state;
        let mut newly_escalated = false;

        self.state = match (self.state, is_slouching) {
            (_, false) => SlouchState::Ideal,
            (SlouchState::Ideal, true) => SlouchState::InitialDeviation { since: now },
            (SlouchState::InitialDeviation { since }, true) => {
                if now.saturating_duration_since(since) > self.initial_deviation {
                    SlouchState::SustainedAlert {
                        since,
                        escalated: false,
                    }
                } else {
                    SlouchState::InitialDeviation { since }
                }
            }
            (state @ SlouchState::SustainedAlert { .. }, true) => state,
        };

        if let SlouchState::SustainedAlert { since, escalated } = &mut self.state {
            if !*escalated && now.saturating_duration_since(*since) > self.sustained_alert {
                *escalated = true;
                newly_escalated = true;
            }
        }

        let transitioned = previous.phase() != self.state.phase();
        if transitioned {
            info!(from = ?previous.phase(), to = ?self.state.phase(), "slouch state changed");
        }
        if newly_escalated {
            warn!(
                held_secs = self.sustained_alert.as_secs_f64(),
                "bad posture sustained beyond escalation threshold"
            );
        }

        TimerUpdate {
            state: self.state,
            alert: self.state.alert(),
            transitioned,
            newly_escalated,
            deviation_elapsed: self
                .state
                .deviation_start()
                .map(|since| now.saturating_duration_since(since)),
            baseline_adapted: false,
        }
    }
}
