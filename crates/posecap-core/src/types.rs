use serde::{Deserialize, Serialize};

use crate::landmarks::LandmarkSet;

/// A 2-D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Center of the box.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Single-face detection outcome for one frame.
///
/// When `detected` is false the optional fields are absent and confidence
/// is 0; "no face" is a normal outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detected: bool,
    pub landmarks: Option<LandmarkSet>,
    pub bounding_box: Option<BoundingBox>,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
}

impl DetectionResult {
    /// The no-face outcome.
    pub fn none() -> Self {
        Self {
            detected: false,
            landmarks: None,
            bounding_box: None,
            confidence: 0.0,
        }
    }

    pub fn face(landmarks: LandmarkSet, bounding_box: BoundingBox, confidence: f32) -> Self {
        Self {
            detected: true,
            landmarks: Some(landmarks),
            bounding_box: Some(bounding_box),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Normalized head-pose estimate derived from landmark ratios.
///
/// Not calibrated degrees: yaw and pitch are ratios of non-negative pixel
/// distances and roll is an arctangent divided by pi, so each component is
/// bounded to roughly [-1, 1] by construction. Negative yaw means the face
/// is turned left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// The three head poses a capture flow demands, in required order.
///
/// A closed set: a target pose outside it is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pose {
    Front,
    Left,
    Right,
}

impl Pose {
    /// The fixed capture order.
    pub const SEQUENCE: [Pose; 3] = [Pose::Front, Pose::Left, Pose::Right];

    /// The pose captured after this one, if any.
    pub fn next(self) -> Option<Pose> {
        match self {
            Pose::Front => Some(Pose::Left),
            Pose::Left => Some(Pose::Right),
            Pose::Right => None,
        }
    }

    /// Position of this pose in [`Pose::SEQUENCE`].
    pub fn index(self) -> usize {
        match self {
            Pose::Front => 0,
            Pose::Left => 1,
            Pose::Right => 2,
        }
    }

    /// Host-facing prompt for this pose.
    pub fn instruction(self) -> &'static str {
        match self {
            Pose::Front => "Look straight at the camera",
            Pose::Left => "Turn your head slightly to the left",
            Pose::Right => "Turn your head slightly to the right",
        }
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pose::Front => write!(f, "front"),
            Pose::Left => write!(f, "left"),
            Pose::Right => write!(f, "right"),
        }
    }
}
