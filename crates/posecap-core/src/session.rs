//! Three-pose capture session.
//!
//! Cycles front -> left -> right, running detect -> orient -> validate on
//! every frame the host feeds and storing one normalized square still per
//! accepted pose. The session never does network I/O: the completed triple is
//! handed back to the host, which owns upload and persistence.

use image::DynamicImage;
use thiserror::Error;

use crate::crop;
use crate::detector::{DetectorError, FaceFinder};
use crate::orientation;
use crate::types::{Orientation, Pose};
use crate::validate::PoseThresholds;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("still encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for an accepted frame for this pose.
    AwaitingPose(Pose),
    /// All three stills captured.
    Complete,
    /// The host aborted; partial captures are discarded.
    Cancelled,
}

/// Outcome of feeding one frame to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameVerdict {
    /// No face in the frame; state unchanged, try the next frame.
    NoFace,
    /// A face was found but its orientation missed the target pose;
    /// state unchanged, the host should prompt the user to adjust.
    PoseRejected { orientation: Orientation },
    /// Frame accepted for `pose`; the session advanced to `state`.
    Accepted { pose: Pose, state: SessionState },
    /// The session is already terminal; the frame was ignored.
    Finished,
}

/// The completed capture: one JPEG still per pose, in capture order.
#[derive(Debug, Clone)]
pub struct CapturedSet {
    pub front: Vec<u8>,
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

impl CapturedSet {
    /// The stills in the fixed `[front, left, right]` order.
    pub fn in_order(&self) -> [(Pose, &[u8]); 3] {
        [
            (Pose::Front, self.front.as_slice()),
            (Pose::Left, self.left.as_slice()),
            (Pose::Right, self.right.as_slice()),
        ]
    }
}

/// Stateful orchestrator for the three-pose capture flow.
pub struct CaptureSession {
    state: SessionState,
    thresholds: PoseThresholds,
    padding: f32,
    stills: [Option<Vec<u8>>; 3],
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    /// Start a session at `AwaitingPose(Front)` with default thresholds.
    pub fn new() -> Self {
        Self::with_thresholds(PoseThresholds::default())
    }

    pub fn with_thresholds(thresholds: PoseThresholds) -> Self {
        Self {
            state: SessionState::AwaitingPose(Pose::Front),
            thresholds,
            padding: crop::DEFAULT_PADDING,
            stills: [None, None, None],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The pose the session is waiting for, if any.
    pub fn target(&self) -> Option<Pose> {
        match self.state {
            SessionState::AwaitingPose(pose) => Some(pose),
            _ => None,
        }
    }

    /// Number of stills captured so far (0..=3).
    pub fn progress(&self) -> usize {
        self.stills.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// Run one frame through the pipeline against the current target pose.
    ///
    /// Rejections leave the state unchanged; the host may retry indefinitely.
    /// A detector failure (model load) propagates and also leaves the state
    /// unchanged.
    pub fn process_frame(
        &mut self,
        finder: &mut dyn FaceFinder,
        frame: &DynamicImage,
    ) -> Result<FrameVerdict, SessionError> {
        let SessionState::AwaitingPose(target) = self.state else {
            return Ok(FrameVerdict::Finished);
        };

        let detection = finder.detect(frame)?;
        let (Some(landmarks), Some(bbox)) = (&detection.landmarks, &detection.bounding_box) else {
            return Ok(FrameVerdict::NoFace);
        };

        let estimate = orientation::estimate(landmarks);
        if !self.thresholds.validates(&estimate, target) {
            tracing::trace!(
                target = %target,
                yaw = estimate.yaw,
                pitch = estimate.pitch,
                roll = estimate.roll,
                "pose rejected"
            );
            return Ok(FrameVerdict::PoseRejected { orientation: estimate });
        }

        let still = crop::crop_to_square(frame, bbox, self.padding);
        let jpeg = crop::encode_jpeg(&still)?;
        self.stills[target.index()] = Some(jpeg);

        self.state = match target.next() {
            Some(next) => SessionState::AwaitingPose(next),
            None => SessionState::Complete,
        };
        tracing::debug!(pose = %target, progress = self.progress(), "pose captured");

        Ok(FrameVerdict::Accepted {
            pose: target,
            state: self.state,
        })
    }

    /// Abort the session and discard all partial captures.
    pub fn cancel(&mut self) {
        tracing::debug!(progress = self.progress(), "session cancelled");
        self.stills = [None, None, None];
        self.state = SessionState::Cancelled;
    }

    /// Discard everything and start over from the front pose.
    pub fn retake(&mut self) {
        self.stills = [None, None, None];
        self.state = SessionState::AwaitingPose(Pose::Front);
    }

    /// The ordered triple, available once the session is complete.
    pub fn into_captures(self) -> Option<CapturedSet> {
        if self.state != SessionState::Complete {
            return None;
        }
        let [front, left, right] = self.stills;
        Some(CapturedSet {
            front: front?,
            left: left?,
            right: right?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{idx, LandmarkSet, NUM_LANDMARKS};
    use crate::types::{BoundingBox, DetectionResult, Point};
    use std::collections::VecDeque;

    /// Scripted detector: pops one pre-baked result per frame.
    struct FakeFinder {
        script: VecDeque<Result<DetectionResult, DetectorError>>,
        calls: usize,
    }

    impl FakeFinder {
        fn new(script: Vec<Result<DetectionResult, DetectorError>>) -> Self {
            Self {
                script: script.into(),
                calls: 0,
            }
        }
    }

    impl FaceFinder for FakeFinder {
        fn detect(&mut self, _frame: &DynamicImage) -> Result<DetectionResult, DetectorError> {
            self.calls += 1;
            self.script
                .pop_front()
                .unwrap_or_else(|| Ok(DetectionResult::none()))
        }
    }

    fn frame() -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(200, 200, image::Rgb([90, 90, 90])))
    }

    /// Level face with the nose placed so that yaw comes out as requested.
    fn face_with_yaw(yaw: f32) -> DetectionResult {
        // Face edges at x = 50 and x = 150 (width 100): yaw = (100 - 2*d) / 100
        // where d = nose.x - 50, so nose.x = 100 - 50 * yaw.
        let nose_x = 100.0 - 50.0 * yaw;
        let nose = Point::new(nose_x, 100.0);
        let mut points = vec![nose; NUM_LANDMARKS];
        points[idx::LEFT_FACE_EDGE] = Point::new(50.0, 95.0);
        points[idx::RIGHT_FACE_EDGE] = Point::new(150.0, 95.0);
        points[idx::CHIN] = Point::new(nose_x, 120.0);
        points[idx::LEFT_EYE_OUTER] = Point::new(80.0, 80.0);
        points[idx::RIGHT_EYE_OUTER] = Point::new(120.0, 80.0);

        DetectionResult::face(
            LandmarkSet::from_points(points).unwrap(),
            BoundingBox { x: 60.0, y: 70.0, width: 80.0, height: 80.0 },
            0.95,
        )
    }

    #[test]
    fn test_starts_awaiting_front() {
        let session = CaptureSession::new();
        assert_eq!(session.state(), SessionState::AwaitingPose(Pose::Front));
        assert_eq!(session.target(), Some(Pose::Front));
        assert_eq!(session.progress(), 0);
    }

    #[test]
    fn test_no_face_keeps_state() {
        let mut session = CaptureSession::new();
        let mut finder = FakeFinder::new(vec![Ok(DetectionResult::none())]);
        let verdict = session.process_frame(&mut finder, &frame()).unwrap();
        assert_eq!(verdict, FrameVerdict::NoFace);
        assert_eq!(session.state(), SessionState::AwaitingPose(Pose::Front));
    }

    #[test]
    fn test_repeated_rejections_then_accept_for_front() {
        // Ten frames turned too far for a front capture, then one straight on.
        let mut script: Vec<_> = (0..10)
            .map(|i| Ok(face_with_yaw(0.4 + 0.02 * i as f32)))
            .collect();
        script.push(Ok(face_with_yaw(0.0)));
        let mut finder = FakeFinder::new(script);

        let mut session = CaptureSession::new();
        for _ in 0..10 {
            let verdict = session.process_frame(&mut finder, &frame()).unwrap();
            assert!(matches!(verdict, FrameVerdict::PoseRejected { .. }));
            assert_eq!(session.state(), SessionState::AwaitingPose(Pose::Front));
            assert_eq!(session.progress(), 0);
        }

        let verdict = session.process_frame(&mut finder, &frame()).unwrap();
        assert_eq!(
            verdict,
            FrameVerdict::Accepted {
                pose: Pose::Front,
                state: SessionState::AwaitingPose(Pose::Left),
            }
        );
        assert_eq!(session.progress(), 1);
    }

    #[test]
    fn test_full_session_reaches_complete_in_order() {
        let mut finder = FakeFinder::new(vec![
            Ok(face_with_yaw(0.0)),
            Ok(face_with_yaw(-0.4)),
            Ok(face_with_yaw(0.4)),
        ]);
        let mut session = CaptureSession::new();

        for expected in Pose::SEQUENCE {
            let verdict = session.process_frame(&mut finder, &frame()).unwrap();
            match verdict {
                FrameVerdict::Accepted { pose, .. } => assert_eq!(pose, expected),
                other => panic!("expected acceptance for {expected}, got {other:?}"),
            }
        }

        assert!(session.is_complete());
        assert_eq!(session.progress(), 3);

        let captures = session.into_captures().unwrap();
        let ordered = captures.in_order();
        assert_eq!(ordered[0].0, Pose::Front);
        assert_eq!(ordered[1].0, Pose::Left);
        assert_eq!(ordered[2].0, Pose::Right);
        for (_, jpeg) in ordered {
            assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        }
    }

    #[test]
    fn test_wrong_direction_rejected_for_left() {
        let mut finder = FakeFinder::new(vec![Ok(face_with_yaw(0.0)), Ok(face_with_yaw(0.4))]);
        let mut session = CaptureSession::new();

        session.process_frame(&mut finder, &frame()).unwrap();
        // Turned right while the target is left.
        let verdict = session.process_frame(&mut finder, &frame()).unwrap();
        assert!(matches!(verdict, FrameVerdict::PoseRejected { .. }));
        assert_eq!(session.state(), SessionState::AwaitingPose(Pose::Left));
    }

    #[test]
    fn test_frames_after_complete_are_ignored() {
        let mut finder = FakeFinder::new(vec![
            Ok(face_with_yaw(0.0)),
            Ok(face_with_yaw(-0.4)),
            Ok(face_with_yaw(0.4)),
            Ok(face_with_yaw(0.0)),
        ]);
        let mut session = CaptureSession::new();
        for _ in 0..3 {
            session.process_frame(&mut finder, &frame()).unwrap();
        }

        let calls_before = finder.calls;
        let verdict = session.process_frame(&mut finder, &frame()).unwrap();
        assert_eq!(verdict, FrameVerdict::Finished);
        // No detector work on terminal sessions.
        assert_eq!(finder.calls, calls_before);
    }

    #[test]
    fn test_cancel_discards_partial_captures() {
        let mut finder = FakeFinder::new(vec![Ok(face_with_yaw(0.0))]);
        let mut session = CaptureSession::new();
        session.process_frame(&mut finder, &frame()).unwrap();
        assert_eq!(session.progress(), 1);

        session.cancel();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(session.progress(), 0);
        assert!(session.into_captures().is_none());
    }

    #[test]
    fn test_retake_restarts_from_front() {
        let mut finder = FakeFinder::new(vec![Ok(face_with_yaw(0.0)), Ok(face_with_yaw(-0.4))]);
        let mut session = CaptureSession::new();
        session.process_frame(&mut finder, &frame()).unwrap();
        session.process_frame(&mut finder, &frame()).unwrap();
        assert_eq!(session.progress(), 2);

        session.retake();
        assert_eq!(session.state(), SessionState::AwaitingPose(Pose::Front));
        assert_eq!(session.progress(), 0);
    }

    #[test]
    fn test_incomplete_session_yields_no_captures() {
        let session = CaptureSession::new();
        assert!(session.into_captures().is_none());
    }

    #[test]
    fn test_detector_error_propagates_and_state_holds() {
        let mut finder = FakeFinder::new(vec![
            Err(DetectorError::ModelNotFound("det_10g.onnx".into())),
            Ok(face_with_yaw(0.0)),
        ]);
        let mut session = CaptureSession::new();

        let err = session.process_frame(&mut finder, &frame()).unwrap_err();
        assert!(matches!(err, SessionError::Detector(_)));
        assert_eq!(session.state(), SessionState::AwaitingPose(Pose::Front));

        // Recovers on the next good frame.
        let verdict = session.process_frame(&mut finder, &frame()).unwrap();
        assert!(matches!(verdict, FrameVerdict::Accepted { .. }));
    }

    #[test]
    fn test_tilted_face_rejected_even_with_good_yaw() {
        let mut base = face_with_yaw(0.0);
        // Drop the chin far below: noseToEyes=20, noseToChin large -> pitch
        // past the tilt gate.
        let landmarks = base.landmarks.take().unwrap();
        let mut points: Vec<Point> = landmarks.points().to_vec();
        points[idx::CHIN] = Point::new(100.0, 400.0);
        base.landmarks = Some(LandmarkSet::from_points(points).unwrap());

        let mut finder = FakeFinder::new(vec![Ok(base)]);
        let mut session = CaptureSession::new();
        let verdict = session.process_frame(&mut finder, &frame()).unwrap();
        assert!(matches!(verdict, FrameVerdict::PoseRejected { .. }));
    }
}
