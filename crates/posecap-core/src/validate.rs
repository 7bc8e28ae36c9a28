//! Pose compliance check: accept or reject an orientation against a target.

use serde::{Deserialize, Serialize};

use crate::types::{Orientation, Pose};

/// Maximum |pitch| and |roll| accepted for any target pose.
pub const MAX_TILT: f32 = 0.5;
/// Maximum |yaw| accepted for a front-facing capture.
pub const FRONT_MAX_YAW: f32 = 0.35;
/// Minimum |yaw| for a turned (left/right) capture.
pub const TURN_MIN_YAW: f32 = 0.15;
/// Maximum |yaw| for a turned capture; beyond this the face edge landmarks
/// stop being reliable.
pub const TURN_MAX_YAW: f32 = 0.8;

/// Acceptance thresholds for pose validation.
///
/// The defaults are empirically tuned for casual phone-camera use and
/// deliberately forgiving; they are configuration, not derived quantities,
/// and recalibrating them must not require touching the check itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseThresholds {
    pub max_tilt: f32,
    pub front_max_yaw: f32,
    pub turn_min_yaw: f32,
    pub turn_max_yaw: f32,
}

impl Default for PoseThresholds {
    fn default() -> Self {
        Self {
            max_tilt: MAX_TILT,
            front_max_yaw: FRONT_MAX_YAW,
            turn_min_yaw: TURN_MIN_YAW,
            turn_max_yaw: TURN_MAX_YAW,
        }
    }
}

impl PoseThresholds {
    /// True iff `orientation` satisfies `target`.
    ///
    /// The tilt gate applies to every target: a heavily pitched or rolled
    /// head is rejected before yaw is even considered.
    pub fn validates(&self, orientation: &Orientation, target: Pose) -> bool {
        if orientation.pitch.abs() > self.max_tilt || orientation.roll.abs() > self.max_tilt {
            return false;
        }

        let yaw = orientation.yaw;
        match target {
            Pose::Front => yaw.abs() < self.front_max_yaw,
            Pose::Left => yaw < -self.turn_min_yaw && yaw > -self.turn_max_yaw,
            Pose::Right => yaw > self.turn_min_yaw && yaw < self.turn_max_yaw,
        }
    }
}

/// [`PoseThresholds::validates`] with the default thresholds.
pub fn validate_pose(orientation: &Orientation, target: Pose) -> bool {
    PoseThresholds::default().validates(orientation, target)
}
