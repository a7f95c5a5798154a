//! facelens-core: face detection, recognition and annotation pipeline.
//!
//! Images are brought into canonical orientation from their EXIF metadata,
//! faces are detected with SCRFD and described with ArcFace (both via ONNX
//! Runtime), and boxes can be drawn back onto the image for inspection.

pub mod alignment;
pub mod arcface;
pub mod codec;
pub mod detector;
pub mod error;
pub mod orientation;
pub mod recognizer;
pub mod render;
pub mod scrfd;
pub mod types;

pub use detector::{FaceDetectionModel, FaceDetector};
pub use error::{FaceError, Result};
pub use orientation::{correct_orientation, Rotation};
pub use recognizer::{extract_feature_with_model, FaceRecognitionModel, FaceRecognizer};
pub use render::{AnnotationStyle, BoxRenderer};
pub use types::{FaceBox, FaceRecord, FeatureVector, Landmark};

use std::path::PathBuf;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/facelens/models`, falling back to
/// `~/.local/share/facelens/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facelens")
        .join("models")
}
