use facelens_core::{FaceBox, FaceRecord, FeatureVector};

pub const MATCH_LABEL: &str = "match";
pub const UNKNOWN_LABEL: &str = "unknown";

/// Cosine similarity in [-1, 1]; 0 when either vector is zero.
pub fn cosine_similarity(a: &FeatureVector, b: &FeatureVector) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.values.iter().zip(b.values.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 { dot / denom } else { 0.0 }
}

/// Label every test face against the reference feature, keeping detection order.
///
/// The box score is the similarity clamped to [0, 1].
pub fn label_faces(
    reference: &FeatureVector,
    faces: &[(FaceRecord, FeatureVector)],
    threshold: f32,
) -> Vec<FaceBox> {
    faces
        .iter()
        .map(|(record, feature)| {
            let similarity = cosine_similarity(reference, feature);
            let label = if similarity >= threshold { MATCH_LABEL } else { UNKNOWN_LABEL };
            tracing::debug!(similarity, label, "compared face");
            FaceBox {
                score: similarity.clamp(0.0, 1.0),
                ..FaceBox::from_record(record, label)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(values: &[f32]) -> FeatureVector {
        FeatureVector { values: values.to_vec(), model_version: None }
    }

    fn rec(x: f32) -> FaceRecord {
        FaceRecord::new(x, 0.0, 10.0, 10.0, [(0.0, 0.0); 5], 0.9)
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&fv(&[1.0, 0.0]), &fv(&[1.0, 0.0])) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&fv(&[1.0, 0.0]), &fv(&[0.0, 1.0])).abs() < 1e-6);
        assert!((cosine_similarity(&fv(&[1.0, 0.0]), &fv(&[-1.0, 0.0])) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&fv(&[0.0, 0.0]), &fv(&[1.0, 0.0])), 0.0);
    }

    #[test]
    fn test_label_faces_keeps_order() {
        let reference = fv(&[1.0, 0.0]);
        let faces = vec![
            (rec(1.0), fv(&[0.0, 1.0])),
            (rec(2.0), fv(&[1.0, 0.1])),
            (rec(3.0), fv(&[-1.0, 0.0])),
        ];
        let boxes = label_faces(&reference, &faces, 0.4);
        let labels: Vec<&str> = boxes.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec![UNKNOWN_LABEL, MATCH_LABEL, UNKNOWN_LABEL]);
        assert_eq!(boxes.iter().map(|b| b.x).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(boxes[2].score, 0.0);
        assert!(boxes[1].score > 0.9);
    }
}
