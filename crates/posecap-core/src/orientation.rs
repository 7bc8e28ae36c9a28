//! Head-pose estimation from pure landmark geometry.
//!
//! No depth sensor and no pose-regression head: yaw, pitch and roll are
//! derived from ratios between a handful of the 68 landmarks. The outputs are
//! normalized, unitless proxies (roughly [-1, 1]), good enough to decide
//! "front / turned left / turned right" but not calibrated angles.

use crate::landmarks::{idx, LandmarkSet};
use crate::types::Orientation;

/// Estimate head orientation from a 68-point landmark set.
///
/// Always returns a value; each component degenerates to 0 when its input
/// geometry collapses (coincident points).
pub fn estimate(landmarks: &LandmarkSet) -> Orientation {
    let left_eye = landmarks.point(idx::LEFT_EYE_OUTER);
    let right_eye = landmarks.point(idx::RIGHT_EYE_OUTER);
    let nose = landmarks.point(idx::NOSE_TIP);
    let chin = landmarks.point(idx::CHIN);
    let left_edge = landmarks.point(idx::LEFT_FACE_EDGE);
    let right_edge = landmarks.point(idx::RIGHT_FACE_EDGE);

    // Yaw: where the nose tip sits between the face outline edges.
    // Negative = turned left, positive = turned right.
    let nose_to_left = (nose.x - left_edge.x).abs();
    let nose_to_right = (right_edge.x - nose.x).abs();
    let total_width = nose_to_left + nose_to_right;
    let yaw = if total_width > 0.0 {
        (nose_to_right - nose_to_left) / total_width
    } else {
        0.0
    };

    // Pitch: nose-to-eyes distance against nose-to-chin distance.
    let eyes_center_y = (left_eye.y + right_eye.y) / 2.0;
    let nose_to_eyes = nose.y - eyes_center_y;
    let nose_to_chin = chin.y - nose.y;
    let total_height = nose_to_eyes.abs() + nose_to_chin.abs();
    let pitch = if total_height > 0.0 {
        (nose_to_eyes - nose_to_chin) / total_height
    } else {
        0.0
    };

    // Roll: tilt of the eye line, normalized by pi.
    let dy = right_eye.y - left_eye.y;
    let dx = right_eye.x - left_eye.x;
    let roll = if dx != 0.0 {
        dy.atan2(dx) / std::f32::consts::PI
    } else {
        0.0
    };

    Orientation { yaw, pitch, roll }
}
