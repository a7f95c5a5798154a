//! Face recognition handle.
//!
//! [`FaceRecognizer`] aligns one detected face and turns it into a
//! [`FeatureVector`] through a [`FaceRecognitionModel`]; [`ArcFaceModel`] is
//! the ONNX implementation.

use crate::alignment;
use crate::arcface::ArcFaceModel;
use crate::error::{FaceError, Result};
use crate::types::{FaceRecord, FeatureVector};
use image::{DynamicImage, RgbImage};
use std::path::Path;

/// A loaded face recognition model.
pub trait FaceRecognitionModel {
    /// Cut the face described by `face` out of `image` into the model's
    /// canonical crop. Defaults to five-point similarity alignment.
    fn align_crop(&mut self, image: &DynamicImage, face: &FaceRecord) -> Result<RgbImage> {
        Ok(alignment::align_face(&image.to_rgb8(), face))
    }

    /// Feature values for an aligned crop.
    fn feature(&mut self, aligned: &RgbImage) -> Result<Vec<f32>>;

    /// Identifies the configuration the features come from.
    fn model_version(&self) -> Option<&str> {
        None
    }
}

/// Face recognition handle. Dropping it releases the model.
pub struct FaceRecognizer<M = ArcFaceModel> {
    model: M,
    /// Feature length fixed by the first extraction.
    feature_len: Option<usize>,
}

impl FaceRecognizer<ArcFaceModel> {
    /// Load the ArcFace ONNX model at `model_path`.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_model(ArcFaceModel::load(model_path.as_ref())?))
    }
}

impl<M: FaceRecognitionModel> FaceRecognizer<M> {
    pub fn with_model(model: M) -> Self {
        Self {
            model,
            feature_len: None,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Extract the feature vector of one detected face in `image`.
    ///
    /// The returned vector owns its values; the aligned crop and raw model
    /// output are dropped before this returns.
    pub fn extract_feature(
        &mut self,
        image: &DynamicImage,
        face: &FaceRecord,
    ) -> Result<FeatureVector> {
        if image.width() == 0 || image.height() == 0 || image.as_bytes().is_empty() {
            return Err(FaceError::InvalidImage(format!(
                "{}x{} source image",
                image.width(),
                image.height()
            )));
        }

        let aligned = self.model.align_crop(image, face)?;
        let values = self.model.feature(&aligned)?;

        if values.is_empty() {
            return Err(FaceError::Inference("recognizer returned an empty feature".into()));
        }
        match self.feature_len {
            Some(len) if len != values.len() => {
                return Err(FaceError::Inference(format!(
                    "expected {len}-dim feature, got {}",
                    values.len()
                )));
            }
            Some(_) => {}
            None => self.feature_len = Some(values.len()),
        }

        tracing::debug!(
            dim = values.len(),
            score = face.score(),
            "extracted face feature"
        );

        Ok(FeatureVector {
            values,
            model_version: self.model.model_version().map(str::to_owned),
        })
    }
}

/// One-shot extraction: load the recognizer at `model_path`, extract, and
/// release the recognizer before returning.
pub fn extract_feature_with_model(
    model_path: impl AsRef<Path>,
    image: &DynamicImage,
    face: &FaceRecord,
) -> Result<FeatureVector> {
    let model_path = model_path.as_ref();
    if model_path.as_os_str().is_empty() {
        return Err(FaceError::NullArgument("recognizer model path"));
    }
    let mut recognizer = FaceRecognizer::load(model_path)?;
    recognizer.extract_feature(image, face)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;

    /// Feature = mean of each channel of the aligned crop, plus a bias slot.
    pub(crate) struct MeanColorModel {
        pub dims: usize,
    }

    impl FaceRecognitionModel for MeanColorModel {
        fn feature(&mut self, aligned: &RgbImage) -> Result<Vec<f32>> {
            let n = (aligned.width() * aligned.height()) as f32;
            let mut sums = [0.0f32; 3];
            for p in aligned.pixels() {
                for c in 0..3 {
                    sums[c] += p.0[c] as f32;
                }
            }
            let mut values: Vec<f32> = sums.iter().map(|s| s / n).collect();
            values.resize(self.dims, 1.0);
            Ok(values)
        }

        fn model_version(&self) -> Option<&str> {
            Some("mean-color")
        }
    }

    fn face() -> FaceRecord {
        FaceRecord::new(
            20.0,
            20.0,
            60.0,
            60.0,
            [(38.3, 51.7), (73.5, 51.5), (56.0, 71.7), (41.5, 92.4), (70.7, 92.2)],
            0.9,
        )
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_extract_feature() {
        let mut recognizer = FaceRecognizer::with_model(MeanColorModel { dims: 4 });
        let feature = recognizer.extract_feature(&solid(128, 128, [200, 100, 50]), &face()).unwrap();
        assert_eq!(feature.len(), 4);
        assert!((feature.values[0] - 200.0).abs() < 1.0);
        assert!((feature.values[1] - 100.0).abs() < 1.0);
        assert_eq!(feature.model_version.as_deref(), Some("mean-color"));
    }

    #[test]
    fn test_feature_independent_of_source() {
        let mut recognizer = FaceRecognizer::with_model(MeanColorModel { dims: 3 });
        let mut image = solid(128, 128, [10, 20, 30]);
        let feature = recognizer.extract_feature(&image, &face()).unwrap();
        let snapshot = feature.values.clone();

        if let DynamicImage::ImageRgb8(buf) = &mut image {
            for p in buf.pixels_mut() {
                *p = Rgb([255, 255, 255]);
            }
        }
        assert_eq!(feature.values, snapshot);

        let after = recognizer.extract_feature(&image, &face()).unwrap();
        assert_ne!(after.values, snapshot);
    }

    #[test]
    fn test_feature_length_is_fixed_per_handle() {
        let mut recognizer = FaceRecognizer::with_model(MeanColorModel { dims: 4 });
        recognizer.extract_feature(&solid(64, 64, [1, 2, 3]), &face()).unwrap();
        recognizer.model.dims = 5;
        let err = recognizer.extract_feature(&solid(64, 64, [1, 2, 3]), &face()).unwrap_err();
        assert!(matches!(err, FaceError::Inference(_)));
    }

    #[test]
    fn test_empty_feature_rejected() {
        let mut recognizer = FaceRecognizer::with_model(MeanColorModel { dims: 0 });
        let err = recognizer.extract_feature(&solid(64, 64, [1, 2, 3]), &face()).unwrap_err();
        assert!(matches!(err, FaceError::Inference(_)));
    }

    #[test]
    fn test_empty_source_image() {
        let mut recognizer = FaceRecognizer::with_model(MeanColorModel { dims: 3 });
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            recognizer.extract_feature(&empty, &face()),
            Err(FaceError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_with_model_path_errors() {
        let image = solid(8, 8, [0, 0, 0]);
        assert!(matches!(
            extract_feature_with_model("", &image, &face()),
            Err(FaceError::NullArgument(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_feature_with_model(dir.path().join("w600k_r50.onnx"), &image, &face()),
            Err(FaceError::InvalidModelPath(_))
        ));
    }
}
