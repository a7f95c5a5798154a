//! SCRFD face detector via ONNX Runtime.
//!
//! Implements the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model with 3-stride anchor-free decoding and NMS post-processing.
//! The network runs at the configured input size, padded up to a multiple of
//! the largest stride, so box coordinates come out in image pixels.

use crate::detector::FaceDetectionModel;
use crate::error::{FaceError, Result};
use crate::types::FaceRecord;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_INPUT_ALIGN: usize = 32;

/// (score, bbox, kps) output positions of one stride.
type StrideOutputIndices = (usize, usize, usize);

/// Axis-aligned detection before it becomes a [`FaceRecord`].
#[derive(Debug, Clone)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    landmarks: [(f32, f32); 5],
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn into_record(self) -> FaceRecord {
        FaceRecord::new(
            self.x1,
            self.y1,
            self.x2 - self.x1,
            self.y2 - self.y1,
            self.landmarks,
            self.score,
        )
    }
}

/// SCRFD-based face detection model.
pub struct ScrfdModel {
    session: Session,
    input_size: Option<(u32, u32)>,
    /// (score, bbox, kps) output positions per stride, resolved at load.
    stride_indices: [StrideOutputIndices; 3],
}

impl ScrfdModel {
    /// Load the SCRFD ONNX model from the given path.
    ///
    /// The model must accept dynamic spatial input dimensions.
    pub fn load(model_path: &Path) -> Result<Self> {
        let display = model_path.display().to_string();
        if !model_path.is_file() {
            return Err(FaceError::InvalidModelPath(display));
        }

        let session = Session::builder()
            .map_err(|e| FaceError::model_load(&display, e))?
            .with_intra_threads(2)
            .map_err(|e| FaceError::model_load(&display, e))?
            .commit_from_file(model_path)
            .map_err(|e| FaceError::model_load(&display, e))?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(FaceError::InvalidModelPath(format!(
                "{display}: SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = stride_output_layout(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output layout");

        Ok(Self {
            session,
            input_size: None,
            stride_indices,
        })
    }

    /// Build the NCHW RGB tensor, padding right and bottom up to `tensor_w × tensor_h`.
    fn preprocess(image: &DynamicImage, tensor_w: usize, tensor_h: usize) -> Array4<f32> {
        let rgb = image.to_rgb8();
        // Pad value normalizes to 0.0.
        let mut tensor = Array4::<f32>::zeros((1, 3, tensor_h, tensor_w));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }
        tensor
    }
}

impl FaceDetectionModel for ScrfdModel {
    fn set_input_size(&mut self, width: u32, height: u32) {
        self.input_size = Some((width, height));
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        self.input_size
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceRecord>> {
        let actual = (image.width(), image.height());
        let (width, height) = match self.input_size {
            Some(size) if size == actual => size,
            configured => {
                return Err(FaceError::Inference(format!(
                    "input size {configured:?} does not match image {}x{}",
                    actual.0, actual.1
                )))
            }
        };

        let tensor_w = align_up(width as usize, SCRFD_INPUT_ALIGN);
        let tensor_h = align_up(height as usize, SCRFD_INPUT_ALIGN);
        let input = Self::preprocess(image, tensor_w, tensor_h);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::Inference(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::Inference(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::Inference(format!("kps stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                tensor_w,
                tensor_h,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD)
            .into_iter()
            .map(Candidate::into_record)
            .collect())
    }
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Map each stride to the positions of its score, box and keypoint outputs.
///
/// Exports that name their outputs `<kind>_<stride>` are matched by name in
/// any order. Anything else is assumed to list all scores, then all boxes,
/// then all keypoints, each block in stride order.
fn stride_output_layout(names: &[String]) -> [StrideOutputIndices; 3] {
    // [stride][score, bbox, kps]
    let mut slots: [[Option<usize>; 3]; 3] = [[None; 3]; 3];
    for (idx, name) in names.iter().enumerate() {
        let Some((kind, stride)) = name.split_once('_') else {
            continue;
        };
        let kind = match kind {
            "score" => 0,
            "bbox" => 1,
            "kps" => 2,
            _ => continue,
        };
        let stride = stride.parse::<usize>().ok();
        if let Some(pos) = SCRFD_STRIDES.iter().position(|&s| Some(s) == stride) {
            slots[pos][kind] = Some(idx);
        }
    }

    let mut layout = [(0, 0, 0); 3];
    for (out, slot) in layout.iter_mut().zip(slots) {
        let [Some(score), Some(bbox), Some(kps)] = slot else {
            tracing::info!(?names, "unnamed SCRFD outputs, assuming score/bbox/kps blocks");
            return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
        };
        *out = (score, bbox, kps);
    }
    tracing::debug!("SCRFD outputs matched by name");
    layout
}

/// Decode detections for a single stride level.
///
/// SCRFD's keypoint order (image-left eye, image-right eye, nose, image-left
/// mouth, image-right mouth) is already the FaceRecord order.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    tensor_w: usize,
    tensor_h: usize,
    threshold: f32,
) -> Vec<Candidate> {
    let grid_w = tensor_w / stride;
    let grid_h = tensor_h / stride;
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid_w) as f32 * step;
        let anchor_cy = (anchor_idx / grid_w) as f32 * step;

        // Distances to the four box edges, in stride units.
        let Some(b) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let Some(k) = kps.get(idx * 10..idx * 10 + 10) else {
            continue;
        };

        let landmarks = std::array::from_fn(|i| {
            (anchor_cx + k[i * 2] * step, anchor_cy + k[i * 2 + 1] * step)
        });

        detections.push(Candidate {
            x1: anchor_cx - b[0] * step,
            y1: anchor_cy - b[1] * step,
            x2: anchor_cx + b[2] * step,
            y2: anchor_cy + b[3] * step,
            score,
            landmarks,
        });
    }

    detections
}

/// Non-Maximum Suppression: keep the strongest of each overlapping cluster,
/// highest confidence first.
fn nms(mut detections: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-Union between two candidates.
fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter_area = inter_w * inter_h;
    let union_area = a.area() + b.area() - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}
