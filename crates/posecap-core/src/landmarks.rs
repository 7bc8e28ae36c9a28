//! The fixed 68-point facial landmark scheme.
//!
//! Index positions come from the dlib-style 68-point annotation used by the
//! landmark model; they are stable across detections and never reordered.

use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Number of landmarks in the scheme.
pub const NUM_LANDMARKS: usize = 68;

/// Named indices into a [`LandmarkSet`].
///
/// The single place the anatomical mapping is documented; everything that
/// reads landmark geometry goes through these.
pub mod idx {
    /// Outer face outline, viewer-left edge.
    pub const LEFT_FACE_EDGE: usize = 0;
    /// Outer face outline, viewer-right edge.
    pub const RIGHT_FACE_EDGE: usize = 16;
    /// Chin center.
    pub const CHIN: usize = 8;
    /// Nose tip.
    pub const NOSE_TIP: usize = 30;
    /// Left eye outer corner.
    pub const LEFT_EYE_OUTER: usize = 36;
    /// Right eye outer corner.
    pub const RIGHT_EYE_OUTER: usize = 45;
    /// Left mouth corner.
    pub const LEFT_MOUTH_CORNER: usize = 48;
    /// Right mouth corner.
    pub const RIGHT_MOUTH_CORNER: usize = 54;
}

/// Exactly 68 ordered landmark points in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    /// Build from exactly 68 points; `None` for any other count.
    pub fn from_points(points: Vec<Point>) -> Option<Self> {
        (points.len() == NUM_LANDMARKS).then_some(Self { points })
    }

    /// All 68 points at the same position. Test fixtures and degenerate
    /// geometry only.
    pub fn splat(point: Point) -> Self {
        Self {
            points: vec![point; NUM_LANDMARKS],
        }
    }

    pub fn point(&self, index: usize) -> Point {
        self.points[index]
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The landmark set a detector would produce for the horizontally
    /// mirrored face: every point reflected about `x = center_x`, with the
    /// anatomical left/right indices swapped so index 0 is still the
    /// viewer-left face edge, index 36 the left eye, and so on.
    pub fn mirrored_x(&self, center_x: f32) -> Self {
        let mut points: Vec<Point> = self
            .points
            .iter()
            .map(|p| Point::new(2.0 * center_x - p.x, p.y))
            .collect();
        for &(a, b) in &FLIP_PAIRS {
            points.swap(a, b);
        }
        Self { points }
    }
}

/// Left/right index pairs of the 68-point scheme under horizontal flip.
/// Unlisted indices (nose bridge, chin, midline mouth points) map to
/// themselves.
const FLIP_PAIRS: [(usize, usize); 29] = [
    // Jaw outline
    (0, 16), (1, 15), (2, 14), (3, 13), (4, 12), (5, 11), (6, 10), (7, 9),
    // Eyebrows
    (17, 26), (18, 25), (19, 24), (20, 23), (21, 22),
    // Nostrils
    (31, 35), (32, 34),
    // Eyes
    (36, 45), (37, 44), (38, 43), (39, 42), (40, 47), (41, 46),
    // Outer lip
    (48, 54), (49, 53), (50, 52), (55, 59), (56, 58),
    // Inner lip
    (60, 64), (61, 63), (65, 67),
];

impl TryFrom<Vec<Point>> for LandmarkSet {
    type Error = String;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        let n = points.len();
        Self::from_points(points).ok_or_else(|| format!("expected {NUM_LANDMARKS} landmarks, got {n}"))
    }
}

impl From<LandmarkSet> for Vec<Point> {
    fn from(set: LandmarkSet) -> Self {
        set.points
    }
}
