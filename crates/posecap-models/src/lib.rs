//! posecap-models: model artifact manifest and integrity checking.
//!
//! The capture pipeline runs two ONNX models: a face detector and a 68-point
//! facial landmark regressor. This crate pins where those artifacts come from
//! and verifies on-disk copies before the detector loads them.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Model file descriptor: expected filename, source URL, optional SHA-256
/// checksum, human-readable size.
pub struct ModelFile {
    pub name: &'static str,
    pub url: &'static str,
    /// Hex digest when a published checksum exists; `None` means verification
    /// checks presence only.
    pub sha256: Option<&'static str>,
    pub size_display: &'static str,
}

pub const DETECTION_MODEL: &str = "det_10g.onnx";
pub const LANDMARK_MODEL: &str = "face_landmarks.onnx";

// det_10g checksum taken from the HuggingFace Git LFS pointer file
// (oid sha256: field) at public-data/insightface/models/buffalo_l.
// TODO: mirror face_landmarks.onnx and pin its digest.
pub const MODELS: &[ModelFile] = &[
    ModelFile {
        name: DETECTION_MODEL,
        url: "https://huggingface.co/public-data/insightface/resolve/main/models/buffalo_l/det_10g.onnx",
        sha256: Some("5838f7fe053675b1c7a08b633df49e7af5495cee0493c7dcf6697200b85b5b91"),
        size_display: "16 MB",
    },
    ModelFile {
        name: LANDMARK_MODEL,
        url: "https://github.com/yinguobing/head-pose-estimation/raw/master/assets/face_landmarks.onnx",
        sha256: None,
        size_display: "6 MB",
    },
];

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path})")]
    MissingModel { name: &'static str, path: PathBuf },

    #[error("failed to open model file: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        name: &'static str,
        path: PathBuf,
        expected: String,
        got: String,
    },
}

/// Default on-disk location for model artifacts:
/// `$XDG_DATA_HOME/posecap/models` (or `~/.local/share/posecap/models`).
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("posecap")
        .join("models")
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file_hex(path: &Path) -> Result<String, ModelIntegrityError> {
    let mut file = fs::File::open(path).map_err(|source| ModelIntegrityError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| ModelIntegrityError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a single model file against the manifest entry.
///
/// Unpinned entries (no published checksum) only check that the file exists.
pub fn verify_model_file(model: &ModelFile, path: &Path) -> Result<(), ModelIntegrityError> {
    if !path.exists() {
        return Err(ModelIntegrityError::MissingModel {
            name: model.name,
            path: path.to_path_buf(),
        });
    }

    let Some(expected) = model.sha256 else {
        tracing::warn!(name = model.name, "no pinned checksum; skipping digest check");
        return Ok(());
    };

    let digest = sha256_file_hex(path)?;
    if digest != expected {
        return Err(ModelIntegrityError::ChecksumMismatch {
            name: model.name,
            path: path.to_path_buf(),
            expected: expected.to_string(),
            got: digest,
        });
    }

    Ok(())
}

/// Verify every manifest model under `model_dir`.
pub fn verify_models_dir(model_dir: &Path) -> Result<(), ModelIntegrityError> {
    for model in MODELS {
        let path = model_dir.join(model.name);
        verify_model_file(model, &path)?;
    }

    Ok(())
}
