// THEORY:
// The `scorer` compares the current posture angles with the user's baseline.
// Each axis gets a 0–100 score that falls linearly from 100 (on baseline) to 0
// (at the axis's zero-score threshold). The per-axis results are folded into a
// weighted aggregate, and the same deviations decide whether the frame counts as
// slouching for the slouch timer.
//
// Deviation is directional where the anatomy demands it: a back that is
// *straighter* than baseline (larger back-curve angle) is never penalized.

use crate::baseline::Baseline;
use crate::config::{Direction, ScoringConfig};
use crate::core_modules::posture_angles::{AngleTriple, Axis};

/// Degrees of deviation from baseline that count against an axis.
pub fn deviation(current: f64, baseline: f64, direction: Direction) -> f64 {
    match direction {
        Direction::Absolute => (current - baseline).abs(),
        Direction::LowerIsWorse => (baseline - current).max(0.0),
    }
}

/// Maps a deviation onto [0, 100]. The score is truncated, never rounded up.
pub fn score_deviation(deviation: f64, zero_score_threshold: f64) -> u8 {
    if zero_score_threshold <= 0.0 {
        return if deviation <= 0.0 { 100 } else { 0 };
    }
    let raw = 100.0 * (1.0 - deviation / zero_score_threshold);
    raw.clamp(0.0, 100.0).floor() as u8
}

pub fn score(current: f64, baseline: f64, zero_score_threshold: f64, direction: Direction) -> u8 {
    score_deviation(deviation(current, baseline, direction), zero_score_threshold)
}

/// The result for one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScore {
    pub axis: Axis,
    pub current: f64,
    pub baseline: f64,
    pub deviation: f64,
    pub score: u8,
    /// The deviation exceeded this axis's alert threshold.
    pub slouching: bool,
}

/// The scored posture for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PostureScore {
    /// Only axes present in the baseline are scored.
    pub axes: Vec<AxisScore>,
    /// Weighted mean of the axis scores, `None` when nothing could be scored.
    pub aggregate: Option<u8>,
}

impl PostureScore {
    pub fn axis(&self, axis: Axis) -> Option<&AxisScore> {
        self.axes.iter().find(|s| s.axis == axis)
    }

    pub fn is_slouching(&self) -> bool {
        self.axes.iter().any(|s| s.slouching)
    }

    /// Axes currently beyond their alert thresholds.
    pub fn offending_axes(&self) -> impl Iterator<Item = Axis> + '_ {
        self.axes.iter().filter(|s| s.slouching).map(|s| s.axis)
    }
}

#[derive(Debug, Clone)]
pub struct PostureScorer {
    config: ScoringConfig,
}

impl PostureScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn evaluate(&self, current: &AngleTriple, baseline: &Baseline) -> PostureScore {
        let axes: Vec<AxisScore> = Axis::ALL
            .into_iter()
            .filter_map(|axis| {
                let reference = baseline.get(axis)?;
                let scoring = self.config.axis(axis);
                let measured = current.get(axis);
                let deviation = deviation(measured, reference, scoring.direction);
                Some(AxisScore {
                    axis,
                    current: measured,
                    baseline: reference,
                    deviation,
                    score: score_deviation(deviation, scoring.zero_score_threshold),
                    slouching: deviation > scoring.alert_threshold,
                })
            })
            .collect();

        let aggregate = self.aggregate(&axes);
        PostureScore { axes, aggregate }
    }

    fn aggregate(&self, axes: &[AxisScore]) -> Option<u8> {
        let (weighted_sum, total_weight) = axes
            .iter()
            .map(|s| (s, self.config.axis(s.axis).weight))
            .filter(|(_, weight)| *weight > 0.0)
            .fold((0.0, 0.0), |(sum, total), (s, weight)| {
                (sum + weight * f64::from(s.score), total + weight)
            });

        if total_weight <= 0.0 {
            return None;
        }
        Some((weighted_sum / total_weight).clamp(0.0, 100.0).floor() as u8)
    }
}
