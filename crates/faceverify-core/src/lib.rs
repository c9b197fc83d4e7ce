//! faceverify-core: face detection, recognition and pairwise comparison.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition, both
//! running via ONNX Runtime for CPU inference. [`FaceComparer`] is the
//! capability the HTTP daemon consumes; [`OnnxComparer`] implements it.

pub mod alignment;
pub mod comparer;
pub mod detector;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use comparer::{CompareError, FaceComparer, OnnxComparer};
pub use types::{BoundingBox, CompareOptions, Embedding, EngineReport};

/// File name of the SCRFD detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/faceverify/models`,
/// falling back to `~/.local/share/faceverify/models`.
pub fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}

/// Per-user data directory shared by the daemon and the CLI.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceverify")
}
