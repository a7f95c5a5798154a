use serde::{Deserialize, Serialize};

/// Number of fields in a [`FaceRecord`].
pub const FACE_RECORD_LEN: usize = 15;

/// One detected face: bounding box, five landmarks and a confidence score.
///
/// Field layout (indices into [`FaceRecord::as_array`]):
/// ```text
///  0-1   x, y of the bounding box top-left corner
///  2-3   width, height of the bounding box
///  4-5   right eye
///  6-7   left eye
///  8-9   nose tip
/// 10-11  right mouth corner
/// 12-13  left mouth corner
/// 14     score
/// ```
/// "Right" and "left" are the subject's, so the right eye sits on the image's left.
///
/// Width and height are never negative and the score stays in [0, 1]; the
/// constructors clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; FACE_RECORD_LEN]", into = "[f32; FACE_RECORD_LEN]")]
pub struct FaceRecord([f32; FACE_RECORD_LEN]);

/// Landmark slots of a [`FaceRecord`], in record order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landmark {
    RightEye = 0,
    LeftEye = 1,
    NoseTip = 2,
    RightMouth = 3,
    LeftMouth = 4,
}

impl FaceRecord {
    pub fn new(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        landmarks: [(f32, f32); 5],
        score: f32,
    ) -> Self {
        let mut fields = [0.0f32; FACE_RECORD_LEN];
        fields[0] = x;
        fields[1] = y;
        fields[2] = width;
        fields[3] = height;
        for (i, (lx, ly)) in landmarks.iter().enumerate() {
            fields[4 + i * 2] = *lx;
            fields[5 + i * 2] = *ly;
        }
        fields[14] = score;
        Self::from_array(fields)
    }

    /// Build a record from the raw 15-field layout.
    pub fn from_array(mut fields: [f32; FACE_RECORD_LEN]) -> Self {
        fields[2] = non_negative(fields[2]);
        fields[3] = non_negative(fields[3]);
        fields[14] = if fields[14].is_nan() { 0.0 } else { fields[14].clamp(0.0, 1.0) };
        Self(fields)
    }

    pub fn as_array(&self) -> &[f32; FACE_RECORD_LEN] {
        &self.0
    }

    pub fn x(&self) -> f32 {
        self.0[0]
    }

    pub fn y(&self) -> f32 {
        self.0[1]
    }

    pub fn width(&self) -> f32 {
        self.0[2]
    }

    pub fn height(&self) -> f32 {
        self.0[3]
    }

    pub fn score(&self) -> f32 {
        self.0[14]
    }

    pub fn landmark(&self, which: Landmark) -> (f32, f32) {
        let base = 4 + which as usize * 2;
        (self.0[base], self.0[base + 1])
    }

    /// All five landmarks in record order.
    pub fn landmarks(&self) -> [(f32, f32); 5] {
        std::array::from_fn(|i| (self.0[4 + i * 2], self.0[5 + i * 2]))
    }
}

fn non_negative(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.max(0.0)
    }
}

impl From<[f32; FACE_RECORD_LEN]> for FaceRecord {
    fn from(fields: [f32; FACE_RECORD_LEN]) -> Self {
        Self::from_array(fields)
    }
}

impl From<FaceRecord> for [f32; FACE_RECORD_LEN] {
    fn from(record: FaceRecord) -> Self {
        record.0
    }
}

/// A box to draw: top-left corner, size, label and prediction score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub label: String,
    #[serde(default)]
    pub score: f32,
}

impl FaceBox {
    /// Rendering view of a detection, carrying its score.
    pub fn from_record(record: &FaceRecord, label: impl Into<String>) -> Self {
        Self {
            x: record.x().round() as i32,
            y: record.y().round() as i32,
            width: record.width().round() as u32,
            height: record.height().round() as u32,
            label: label.into(),
            score: record.score(),
        }
    }
}

/// Face feature vector produced by a recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f32>,
    /// Recognizer configuration that produced this vector (e.g., "w600k_r50").
    /// Vectors are only comparable when this matches.
    pub model_version: Option<String>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
