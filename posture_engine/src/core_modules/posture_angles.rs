// THEORY:
// The `posture_angles` module turns a `BodySample` into the three numbers the
// rest of the engine reasons about. Two of them are measured against the image's
// vertical axis (torso recline and neck protraction); the third is the bend at
// the shoulder between the torso and the neck (back curve).
//
// Image space grows *downward* in y, so a point "above" another has a smaller y.
// The vertical references are built by moving one unit up from the hip and the
// shoulder along y only.

use crate::core_modules::geometry;
use crate::core_modules::landmarks::BodySample;
use crate::error::GeometryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The distance (in normalized units) between a joint and its vertical reference.
const VERTICAL_REFERENCE_OFFSET: f64 = 1.0;

/// One tracked posture angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Angle between vertical and the hip→shoulder vector. 0° is upright.
    TorsoRecline,
    /// Angle between vertical and the shoulder→ear vector. 0° is head over shoulder.
    NeckProtraction,
    /// Angle at the shoulder between hip and ear. 180° is a straight line.
    BackCurve,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::TorsoRecline, Axis::NeckProtraction, Axis::BackCurve];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::TorsoRecline => "torso_recline",
            Axis::NeckProtraction => "neck_protraction",
            Axis::BackCurve => "back_curve",
        }
    }
}

impl FromStr for Axis {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Axis::ALL
            .into_iter()
            .find(|axis| axis.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three posture angles for one frame, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngleTriple {
    pub torso_recline: f64,
    pub neck_protraction: f64,
    pub back_curve: f64,
}

impl AngleTriple {
    pub const fn new(torso_recline: f64, neck_protraction: f64, back_curve: f64) -> Self {
        Self {
            torso_recline,
            neck_protraction,
            back_curve,
        }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::TorsoRecline => self.torso_recline,
            Axis::NeckProtraction => self.neck_protraction,
            Axis::BackCurve => self.back_curve,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, f64)> + '_ {
        Axis::ALL.into_iter().map(|axis| (axis, self.get(axis)))
    }
}

/// Derives the posture angles for one sample.
pub fn derive_angles(sample: &BodySample) -> Result<AngleTriple, GeometryError> {
    let hip_vertical = sample.hip.offset_y(-VERTICAL_REFERENCE_OFFSET);
    let shoulder_vertical = sample.shoulder.offset_y(-VERTICAL_REFERENCE_OFFSET);

    Ok(AngleTriple {
        torso_recline: geometry::angle(hip_vertical, sample.hip, sample.shoulder)?,
        neck_protraction: geometry::angle(shoulder_vertical, sample.shoulder, sample.ear)?,
        back_curve: geometry::angle(sample.hip, sample.shoulder, sample.ear)?,
    })
}
