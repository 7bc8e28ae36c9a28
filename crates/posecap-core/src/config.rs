use std::path::PathBuf;

/// Detector configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Minimum face detection score to consider a candidate.
    pub confidence_threshold: f32,
    /// Side length of the landmark model input, in pixels.
    pub landmark_input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_dir: posecap_models::default_model_dir(),
            confidence_threshold: 0.5,
            landmark_input_size: 128,
        }
    }
}

impl DetectorConfig {
    /// Load configuration from `POSECAP_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_dir: std::env::var("POSECAP_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            confidence_threshold: env_f32("POSECAP_CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
            landmark_input_size: env_u32("POSECAP_LANDMARK_INPUT_SIZE", defaults.landmark_input_size),
        }
    }

    /// Path to the face detection model.
    pub fn detection_model_path(&self) -> PathBuf {
        self.model_dir.join(posecap_models::DETECTION_MODEL)
    }

    /// Path to the 68-point landmark model.
    pub fn landmark_model_path(&self) -> PathBuf {
        self.model_dir.join(posecap_models::LANDMARK_MODEL)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
