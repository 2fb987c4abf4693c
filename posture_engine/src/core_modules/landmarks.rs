// THEORY:
// The `landmarks` module is the engine's boundary with the external pose model.
// The model hands over a per-frame map of named body parts; this module turns
// that map into a `BodySample`: the hip, shoulder, and ear of exactly one side
// of the body.
//
// Key architectural principles:
// 1.  **One Side Only**: A sample is always drawn from a single side. Mixing a
//     left shoulder with a right ear would inject a spurious asymmetry into every
//     angle computed downstream.
// 2.  **All or Nothing**: If any of the three chosen points is not confidently
//     visible, the whole frame is rejected with `Extraction::Insufficient`. A
//     `BodySample` is never assembled from partial data.
// 3.  **Tagged Outcome**: Occlusion is an expected, per-frame condition, so it is
//     a variant of the result rather than an error or a sentinel `None`.

use crate::config::{ExtractionConfig, SideSelection};
use crate::core_modules::geometry::Point3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// The anatomical points the engine reads from the pose model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkName {
    Nose,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
}

impl LandmarkName {
    pub const ALL: [LandmarkName; 7] = [
        LandmarkName::Nose,
        LandmarkName::LeftEar,
        LandmarkName::RightEar,
        LandmarkName::LeftShoulder,
        LandmarkName::RightShoulder,
        LandmarkName::LeftHip,
        LandmarkName::RightHip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LandmarkName::Nose => "nose",
            LandmarkName::LeftEar => "left_ear",
            LandmarkName::RightEar => "right_ear",
            LandmarkName::LeftShoulder => "left_shoulder",
            LandmarkName::RightShoulder => "right_shoulder",
            LandmarkName::LeftHip => "left_hip",
            LandmarkName::RightHip => "right_hip",
        }
    }
}

impl fmt::Display for LandmarkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LandmarkName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LandmarkName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or(())
    }
}

/// A single landmark estimate as reported by the pose model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// The model's confidence in [0, 1] that the point is actually observed.
    pub visibility: f64,
}

impl LandmarkPoint {
    pub fn position(&self) -> Point3 {
        Point3::new(self.x, self.y, self.z)
    }
}

/// All landmarks reported for one frame.
///
/// Models usually report many more points than the engine needs (a full-body
/// model emits 33); names the engine does not track are dropped on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, LandmarkPoint>",
    into = "BTreeMap<String, LandmarkPoint>"
)]
pub struct LandmarkFrame {
    points: HashMap<LandmarkName, LandmarkPoint>,
}

impl From<BTreeMap<String, LandmarkPoint>> for LandmarkFrame {
    fn from(raw: BTreeMap<String, LandmarkPoint>) -> Self {
        let points = raw
            .into_iter()
            .filter_map(|(name, point)| name.parse().ok().map(|name| (name, point)))
            .collect();
        Self { points }
    }
}

impl From<LandmarkFrame> for BTreeMap<String, LandmarkPoint> {
    fn from(frame: LandmarkFrame) -> Self {
        frame
            .points
            .into_iter()
            .map(|(name, point)| (name.as_str().to_string(), point))
            .collect()
    }
}

impl FromIterator<(LandmarkName, LandmarkPoint)> for LandmarkFrame {
    fn from_iter<I: IntoIterator<Item = (LandmarkName, LandmarkPoint)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl LandmarkFrame {
    pub fn insert(&mut self, name: LandmarkName, point: LandmarkPoint) {
        self.points.insert(name, point);
    }

    pub fn get(&self, name: LandmarkName) -> Option<&LandmarkPoint> {
        self.points.get(&name)
    }

    /// Visibility of a landmark, or 0 when the model did not report it.
    pub fn visibility(&self, name: LandmarkName) -> f64 {
        self.get(name).map_or(0.0, |p| p.visibility)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The (hip, shoulder, ear) landmark names belonging to this side.
    pub fn landmarks(self) -> [LandmarkName; 3] {
        match self {
            Side::Left => [
                LandmarkName::LeftHip,
                LandmarkName::LeftShoulder,
                LandmarkName::LeftEar,
            ],
            Side::Right => [
                LandmarkName::RightHip,
                LandmarkName::RightShoulder,
                LandmarkName::RightEar,
            ],
        }
    }
}

/// The chosen-side anatomical triple for one frame.
/// Every point's visibility passed the extractor's threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySample {
    pub side: Side,
    pub hip: Point3,
    pub shoulder: Point3,
    pub ear: Point3,
}

impl BodySample {
    pub fn points(&self) -> [Point3; 3] {
        [self.hip, self.shoulder, self.ear]
    }
}

/// Why a frame could not produce a `BodySample`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsufficientVisibility {
    pub side: Side,
    /// The first landmark on the chosen side that failed the gate.
    pub landmark: LandmarkName,
    /// Its reported visibility, or `None` if the model omitted it.
    pub visibility: Option<f64>,
}

impl fmt::Display for InsufficientVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.visibility {
            Some(v) => write!(f, "{} visibility {:.2} below threshold", self.landmark, v),
            None => write!(f, "{} not reported", self.landmark),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extraction {
    Extracted(BodySample),
    Insufficient(InsufficientVisibility),
}

impl Extraction {
    pub fn sample(&self) -> Option<&BodySample> {
        match self {
            Extraction::Extracted(sample) => Some(sample),
            Extraction::Insufficient(_) => None,
        }
    }
}

/// Selects a body side and gates it on visibility.
#[derive(Debug, Clone)]
pub struct LandmarkExtractor {
    visibility_threshold: f64,
    side_selection: SideSelection,
}

impl LandmarkExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            visibility_threshold: config.visibility_threshold,
            side_selection: config.side_selection,
        }
    }

    pub fn extract(&self, frame: &LandmarkFrame) -> Extraction {
        match self.side_selection {
            SideSelection::MostVisibleShoulder => {
                let side = if frame.visibility(LandmarkName::LeftShoulder)
                    > frame.visibility(LandmarkName::RightShoulder)
                {
                    Side::Left
                } else {
                    Side::Right
                };
                self.extract_side(frame, side)
            }
            SideSelection::LeftThenRight => match self.extract_side(frame, Side::Left) {
                extracted @ Extraction::Extracted(_) => extracted,
                Extraction::Insufficient(_) => self.extract_side(frame, Side::Right),
            },
        }
    }

    fn extract_side(&self, frame: &LandmarkFrame, side: Side) -> Extraction {
        let mut positions = [Point3::default(); 3];
        for (slot, name) in positions.iter_mut().zip(side.landmarks()) {
            match frame.get(name) {
                Some(point) if point.visibility > self.visibility_threshold => {
                    *slot = point.position();
                }
                other => {
                    return Extraction::Insufficient(InsufficientVisibility {
                        side,
                        landmark: name,
                        visibility: other.map(|p| p.visibility),
                    });
                }
            }
        }

        let [hip, shoulder, ear] = positions;
        Extraction::Extracted(BodySample {
            side,
            hip,
            shoulder,
            ear,
        })
    }
}
