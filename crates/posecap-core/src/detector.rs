//! Face and landmark detection via ONNX Runtime.
//!
//! Two-stage pipeline: an SCRFD-style anchor-free face detector (3-stride
//! decode + NMS) picks the single most prominent face, then a 68-point
//! landmark model runs on the padded face crop. Detection is the most
//! expensive per-frame operation; cadence is the host's concern.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

use crate::config::DetectorConfig;
use crate::landmarks::{LandmarkSet, NUM_LANDMARKS};
use crate::types::{BoundingBox, DetectionResult, Point};

// Detection model input distribution and decode layout.
const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_NMS_THRESHOLD: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

/// Face crop passed to the landmark model is this much larger than the
/// detected box, so chin and face outline points stay inside it.
const FACE_CROP_SCALE: f32 = 1.25;
/// Flat landmark output: 68 (x, y) pairs normalized to the crop.
const LANDMARK_VALUES: usize = NUM_LANDMARKS * 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (run the model fetch step first, see posecap-models)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Narrow detection seam: one frame in, at most one face out.
///
/// The session and every caller above it depend on this trait, so tests run
/// on synthetic detections without a camera or a real model.
pub trait FaceFinder {
    fn detect(&mut self, frame: &DynamicImage) -> Result<DetectionResult, DetectorError>;
}

/// Candidate face before NMS / best-face selection.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    bbox: BoundingBox,
    confidence: f32,
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// ONNX-backed face + 68-point landmark detector.
pub struct LandmarkDetector {
    face_session: Session,
    landmark_session: Session,
    landmark_input_size: u32,
    confidence_threshold: f32,
}

impl LandmarkDetector {
    /// Load both ONNX models per `config`.
    ///
    /// Fails with [`DetectorError::ModelNotFound`] when an artifact is
    /// missing; callers must surface that, never swallow it.
    pub fn load(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let face_session = open_session(&config.detection_model_path())?;
        let num_outputs = face_session.outputs().len();
        if num_outputs < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "detection model requires 6 outputs (3 strides x score/bbox), got {num_outputs}"
            )));
        }
        tracing::info!(
            path = %config.detection_model_path().display(),
            outputs = num_outputs,
            "face detection model loaded"
        );

        let landmark_session = open_session(&config.landmark_model_path())?;
        tracing::info!(
            path = %config.landmark_model_path().display(),
            input_size = config.landmark_input_size,
            "landmark model loaded"
        );

        Ok(Self {
            face_session,
            landmark_session,
            landmark_input_size: config.landmark_input_size,
            confidence_threshold: config.confidence_threshold,
        })
    }

    /// Pick the best face and run the landmark stage on it.
    fn detect_impl(&mut self, frame: &DynamicImage) -> Result<DetectionResult, DetectorError> {
        let (frame_w, frame_h) = frame.dimensions();
        if frame_w == 0 || frame_h == 0 {
            return Ok(DetectionResult::none());
        }

        let (input, letterbox) = preprocess_detection(&frame.to_luma8());
        let mut candidates = Vec::new();
        {
            // Scoped: the outputs borrow the session, which the landmark
            // stage needs again below.
            let outputs = self
                .face_session
                .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

            for (stride_pos, &stride) in DET_STRIDES.iter().enumerate() {
                // Standard export ordering: [0-2] = scores, [3-5] = bboxes.
                let (_, scores) = outputs[stride_pos].try_extract_tensor::<f32>().map_err(|e| {
                    DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
                })?;
                let (_, bboxes) =
                    outputs[3 + stride_pos].try_extract_tensor::<f32>().map_err(|e| {
                        DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
                    })?;

                decode_stride(
                    scores,
                    bboxes,
                    stride,
                    &letterbox,
                    self.confidence_threshold,
                    &mut candidates,
                );
            }
        }

        let kept = nms(candidates, DET_NMS_THRESHOLD);
        let Some(best) = kept
            .into_iter()
            .filter_map(|c| clamp_to_frame(c, frame_w, frame_h))
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        else {
            return Ok(DetectionResult::none());
        };

        let landmarks = self.regress_landmarks(frame, &best.bbox)?;
        tracing::trace!(
            confidence = best.confidence,
            x = best.bbox.x,
            y = best.bbox.y,
            "face detected"
        );

        Ok(DetectionResult::face(landmarks, best.bbox, best.confidence))
    }

    /// Run the 68-point model on a padded square crop of the face.
    fn regress_landmarks(
        &mut self,
        frame: &DynamicImage,
        bbox: &BoundingBox,
    ) -> Result<LandmarkSet, DetectorError> {
        let (frame_w, frame_h) = frame.dimensions();
        let (crop_x, crop_y, side) = face_crop_region(bbox, frame_w, frame_h);

        let size = self.landmark_input_size;
        let crop = frame
            .crop_imm(crop_x, crop_y, side, side)
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();

        // NHWC, [0, 1] normalization.
        let mut data = Vec::with_capacity((size * size * 3) as usize);
        for pixel in crop.pixels() {
            data.push(pixel[0] as f32 / 255.0);
            data.push(pixel[1] as f32 / 255.0);
            data.push(pixel[2] as f32 / 255.0);
        }
        let input = Array4::from_shape_vec((1, size as usize, size as usize, 3), data)
            .map_err(|e| DetectorError::InferenceFailed(format!("landmark input shape: {e}")))?;

        let outputs = self
            .landmark_session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("landmark output: {e}")))?;
        if values.len() < LANDMARK_VALUES {
            return Err(DetectorError::InferenceFailed(format!(
                "landmark output has {} values, expected {LANDMARK_VALUES}",
                values.len()
            )));
        }

        // Model output is normalized to the crop; map back to frame pixels.
        let side = side as f32;
        let points = (0..NUM_LANDMARKS)
            .map(|i| {
                Point::new(
                    values[i * 2] * side + crop_x as f32,
                    values[i * 2 + 1] * side + crop_y as f32,
                )
            })
            .collect();

        LandmarkSet::from_points(points).ok_or_else(|| {
            DetectorError::InferenceFailed("landmark point count mismatch".to_string())
        })
    }
}

impl FaceFinder for LandmarkDetector {
    fn detect(&mut self, frame: &DynamicImage) -> Result<DetectionResult, DetectorError> {
        self.detect_impl(frame)
    }
}

fn open_session(path: &Path) -> Result<Session, DetectorError> {
    if !path.exists() {
        return Err(DetectorError::ModelNotFound(path.display().to_string()));
    }
    Ok(Session::builder()?
        .with_intra_threads(2)
        .map_err(ort::Error::from)?
        .commit_from_file(path)?)
}

/// Letterbox a grayscale frame into the detection input tensor.
///
/// The frame is fit inside the square input, padded with the model mean so
/// padding normalizes to 0, and replicated across the three channels.
fn preprocess_detection(gray: &GrayImage) -> (Array4<f32>, LetterboxInfo) {
    let (w, h) = gray.dimensions();
    let scale = (DET_INPUT_SIZE as f32 / w as f32).min(DET_INPUT_SIZE as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, DET_INPUT_SIZE as u32);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, DET_INPUT_SIZE as u32);
    let pad_x = (DET_INPUT_SIZE as u32 - new_w) as f32 / 2.0;
    let pad_y = (DET_INPUT_SIZE as u32 - new_h) as f32 / 2.0;

    let resized = image::imageops::resize(gray, new_w, new_h, FilterType::Triangle);

    let pad_x_start = pad_x.floor() as u32;
    let pad_y_start = pad_y.floor() as u32;
    let mut tensor = Array4::<f32>::zeros((1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE));
    for y in 0..DET_INPUT_SIZE as u32 {
        for x in 0..DET_INPUT_SIZE as u32 {
            let pixel = if y >= pad_y_start
                && y < pad_y_start + new_h
                && x >= pad_x_start
                && x < pad_x_start + new_w
            {
                resized.get_pixel(x - pad_x_start, y - pad_y_start)[0] as f32
            } else {
                DET_MEAN
            };

            let normalized = (pixel - DET_MEAN) / DET_STD;
            let (yi, xi) = (y as usize, x as usize);
            tensor[[0, 0, yi, xi]] = normalized;
            tensor[[0, 1, yi, xi]] = normalized;
            tensor[[0, 2, yi, xi]] = normalized;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Decode one stride level of the anchor-free detection head into frame-space
/// candidates above `threshold`.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
    out: &mut Vec<Candidate>,
) {
    let grid = DET_INPUT_SIZE / stride;
    let num_anchors = grid * grid * DET_ANCHORS_PER_CELL;

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let cell = idx / DET_ANCHORS_PER_CELL;
        let anchor_cx = ((cell % grid) * stride) as f32;
        let anchor_cy = ((cell / grid) * stride) as f32;

        // Box head regresses distances to the four sides, in stride units.
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        // Undo the letterbox: back to original frame coordinates.
        let fx1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let fy1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let fx2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let fy2 = (y2 - letterbox.pad_y) / letterbox.scale;

        out.push(Candidate {
            bbox: BoundingBox {
                x: fx1,
                y: fy1,
                width: fx2 - fx1,
                height: fy2 - fy1,
            },
            confidence: score,
        });
    }
}

/// Non-maximum suppression over candidates, highest confidence first.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|k| iou(&k.bbox, &candidate.bbox) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Clamp a candidate box into the frame; drop it if nothing remains.
fn clamp_to_frame(candidate: Candidate, frame_w: u32, frame_h: u32) -> Option<Candidate> {
    let b = candidate.bbox;
    let x1 = b.x.max(0.0);
    let y1 = b.y.max(0.0);
    let x2 = (b.x + b.width).min(frame_w as f32);
    let y2 = (b.y + b.height).min(frame_h as f32);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Candidate {
        bbox: BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        },
        confidence: candidate.confidence,
    })
}

/// Square crop region around a face box for the landmark stage, scaled by
/// [`FACE_CROP_SCALE`] and shifted to stay inside the frame.
fn face_crop_region(bbox: &BoundingBox, frame_w: u32, frame_h: u32) -> (u32, u32, u32) {
    let side = (bbox.width.max(bbox.height) * FACE_CROP_SCALE)
        .round()
        .clamp(1.0, frame_w.min(frame_h) as f32);
    let center = bbox.center();
    let x = (center.x - side / 2.0)
        .min(frame_w as f32 - side)
        .max(0.0);
    let y = (center.y - side / 2.0)
        .min(frame_h as f32 - side)
        .max(0.0);
    (x as u32, y as u32, side as u32)
}
