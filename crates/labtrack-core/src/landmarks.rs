//! Landmark-geometry extractor.
//!
//! Alternate embedding path for hosts where the pretrained encoder is too
//! heavy: the detector's five-point landmarks are normalized by eye geometry
//! and projected to 128 dimensions through a fixed, seeded Gaussian random
//! matrix. Vectors are L2-normalized and compared by cosine distance; the
//! semantics are NOT interchangeable with [`crate::encoder`] embeddings.

use crate::detector::FaceDetector;
use crate::extract::{DetectedFace, ExtractorError, FaceExtractor};
use crate::types::Embedding;
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EMBED_DIM: usize = 128;
const PROJECTION_SEED: u64 = 42;
/// Five landmarks, two coordinates each.
const INPUT_DIM: usize = 10;
/// Landmark indices for the left and right eye in the detector layout.
const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;

/// Default match tolerance in this extractor's cosine space.
pub const LANDMARK_TOLERANCE: f32 = 0.50;

pub struct LandmarkProjector {
    detector: FaceDetector,
    projection: Vec<[f32; EMBED_DIM]>,
    tolerance: f32,
}

impl LandmarkProjector {
    pub fn load(detector_path: &str, tolerance: f32) -> Result<Self, ExtractorError> {
        let detector = FaceDetector::load(detector_path)?;
        tracing::info!(tolerance, "using landmark projection embeddings");
        Ok(Self {
            detector,
            projection: projection_matrix(),
            tolerance,
        })
    }

    fn embed(&self, landmarks: &[(f32, f32); 5]) -> Embedding {
        project(&normalize_landmarks(landmarks), &self.projection)
    }
}

/// Multiply the normalized landmark vector by the projection matrix and
/// L2-normalize the result.
fn project(normalized: &[f32; INPUT_DIM], matrix: &[[f32; EMBED_DIM]]) -> Embedding {
    let mut values = vec![0.0f32; EMBED_DIM];
    for (i, &v) in normalized.iter().enumerate() {
        for (out, &w) in values.iter_mut().zip(matrix[i].iter()) {
            *out += v * w;
        }
    }

    let mut embedding = Embedding { values };
    embedding.normalize();
    embedding
}

impl FaceExtractor for LandmarkProjector {
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractorError> {
        let regions = self.detector.detect(image)?;

        // Detections without landmarks carry no usable geometry: no signal.
        Ok(regions
            .into_iter()
            .filter_map(|region| {
                let landmarks = region.landmarks?;
                Some(DetectedFace {
                    embedding: self.embed(&landmarks),
                    region,
                })
            })
            .collect())
    }

    fn tolerance(&self) -> f32 {
        self.tolerance
    }

    fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        a.cosine_distance(b)
    }
}

/// Center on the eye midpoint and scale by inter-eye distance, making the
/// vector invariant to face position and size in the frame. A degenerate
/// eye distance falls back to unit scale.
fn normalize_landmarks(landmarks: &[(f32, f32); 5]) -> [f32; INPUT_DIM] {
    let left = landmarks[LEFT_EYE];
    let right = landmarks[RIGHT_EYE];
    let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let mut scale = ((left.0 - right.0).powi(2) + (left.1 - right.1).powi(2)).sqrt();
    if scale < 1e-6 {
        scale = 1.0;
    }

    let mut out = [0.0f32; INPUT_DIM];
    for (i, &(x, y)) in landmarks.iter().enumerate() {
        out[i * 2] = (x - center.0) / scale;
        out[i * 2 + 1] = (y - center.1) / scale;
    }
    out
}

/// Fixed Gaussian projection matrix, identical across runs and processes.
/// Box-Muller over a seeded StdRng; the seed is part of the embedding
/// format and must never change.
fn projection_matrix() -> Vec<[f32; EMBED_DIM]> {
    let mut rng = StdRng::seed_from_u64(PROJECTION_SEED);
    let mut matrix = Vec::with_capacity(INPUT_DIM);
    for _ in 0..INPUT_DIM {
        let mut row = [0.0f32; EMBED_DIM];
        for v in row.iter_mut() {
            let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
            let u2: f32 = rng.gen();
            *v = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos();
        }
        matrix.push(row);
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    const LM: [(f32, f32); 5] = [
        (30.0, 40.0),
        (70.0, 40.0),
        (50.0, 60.0),
        (38.0, 80.0),
        (62.0, 80.0),
    ];

    #[test]
    fn test_projection_matrix_deterministic() {
        let a = projection_matrix();
        let b = projection_matrix();
        assert_eq!(a[0], b[0]);
        assert_eq!(a[INPUT_DIM - 1], b[INPUT_DIM - 1]);
    }

    #[test]
    fn test_normalize_centers_eyes() {
        let n = normalize_landmarks(&LM);
        // Eye midpoint maps to the origin, eyes to ±0.5 on the x axis.
        assert!((n[0] + 0.5).abs() < 1e-6);
        assert!((n[2] - 0.5).abs() < 1e-6);
        assert!(n[1].abs() < 1e-6);
        assert!(n[3].abs() < 1e-6);
    }

    #[test]
    fn test_normalize_scale_invariant() {
        let scaled: [(f32, f32); 5] =
            std::array::from_fn(|i| (LM[i].0 * 3.0 + 11.0, LM[i].1 * 3.0 - 7.0));
        assert_eq!(normalize_landmarks(&LM), normalize_landmarks(&scaled));
    }

    #[test]
    fn test_normalize_degenerate_eyes() {
        let collapsed = [(10.0, 10.0); 5];
        let n = normalize_landmarks(&collapsed);
        assert!(n.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_project_is_normalized_and_deterministic() {
        let matrix = projection_matrix();
        let a = project(&normalize_landmarks(&LM), &matrix);
        let b = project(&normalize_landmarks(&LM), &matrix);
        assert_eq!(a.values, b.values);

        let norm: f32 = a.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_project_separates_different_geometry() {
        let matrix = projection_matrix();
        let other: [(f32, f32); 5] = [
            (30.0, 40.0),
            (70.0, 44.0),
            (46.0, 66.0),
            (35.0, 85.0),
            (66.0, 78.0),
        ];
        let a = project(&normalize_landmarks(&LM), &matrix);
        let b = project(&normalize_landmarks(&other), &matrix);
        assert!(a.cosine_distance(&b) > 1e-3);
    }
}
