//! posecap-core: face pose capture pipeline.
//!
//! Detects a face and its 68 landmarks, derives a normalized head-pose
//! estimate from landmark geometry, validates it against a target pose
//! (front/left/right), and normalizes accepted frames into face-centered
//! square stills, driven frame-by-frame through a three-pose capture
//! session.

pub mod config;
pub mod crop;
pub mod detector;
pub mod landmarks;
pub mod lifecycle;
pub mod orientation;
pub mod session;
pub mod types;
pub mod validate;

pub use config::DetectorConfig;
pub use detector::{DetectorError, FaceFinder, LandmarkDetector};
pub use landmarks::LandmarkSet;
pub use lifecycle::{DetectorCell, LoadState, ModelLifecycle};
pub use session::{CaptureSession, CapturedSet, FrameVerdict, SessionState};
pub use types::{BoundingBox, DetectionResult, Orientation, Point, Pose};
pub use validate::{validate_pose, PoseThresholds};
