//! Face detection handle.
//!
//! [`FaceDetector`] owns a detection model and resets the model's input size
//! to the current image before every call. The model itself is reached through
//! [`FaceDetectionModel`]; [`ScrfdModel`] is the ONNX implementation.

use crate::codec;
use crate::error::{FaceError, Result};
use crate::orientation;
use crate::scrfd::ScrfdModel;
use crate::types::FaceRecord;
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// A loaded face detection model.
pub trait FaceDetectionModel {
    /// Configure the image size the next [`detect`](Self::detect) call expects.
    fn set_input_size(&mut self, width: u32, height: u32);

    /// Currently configured input size, `None` before the first configuration.
    fn input_size(&self) -> Option<(u32, u32)>;

    /// Run detection. Implementations reject images whose size differs from
    /// the configured input size.
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceRecord>>;
}

/// Face detection handle. Dropping it releases the model.
pub struct FaceDetector<M = ScrfdModel> {
    model: M,
    scratch_dir: Option<PathBuf>,
}

impl FaceDetector<ScrfdModel> {
    /// Load the SCRFD ONNX model at `model_path`. The input size starts unset.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_model(ScrfdModel::load(model_path.as_ref())?))
    }
}

impl<M: FaceDetectionModel> FaceDetector<M> {
    pub fn with_model(model: M) -> Self {
        Self {
            model,
            scratch_dir: None,
        }
    }

    /// Directory for the transient files written by [`detect_bytes`](Self::detect_bytes).
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Detect faces in `image`.
    ///
    /// Records come back in the model's order, unsorted and unfiltered.
    pub fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceRecord>> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 || image.as_bytes().is_empty() {
            return Err(FaceError::InvalidImage(format!(
                "{width}x{height} image with {} data bytes",
                image.as_bytes().len()
            )));
        }

        // A size left over from a previous image would misplace every box.
        self.model.set_input_size(width, height);
        let faces = self.model.detect(image)?;

        tracing::debug!(width, height, faces = faces.len(), "detection complete");
        Ok(faces)
    }

    /// Detect faces in an encoded image.
    ///
    /// The bytes go through a transient file that is removed before this
    /// returns, on success and on failure.
    pub fn detect_bytes(&mut self, bytes: &[u8]) -> Result<Vec<FaceRecord>> {
        if bytes.is_empty() {
            return Err(FaceError::NullArgument("image bytes"));
        }
        let scratch = self.scratch_dir.clone();
        codec::with_transient_file(bytes, scratch.as_deref(), |path| self.detect_path(path))
    }

    /// Detect faces in the image file at `path`, after orientation correction.
    pub fn detect_path(&mut self, path: impl AsRef<Path>) -> Result<Vec<FaceRecord>> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(FaceError::NullArgument("image path"));
        }
        let image = orientation::correct_orientation(path)?;
        self.detect(&image)
    }
}
