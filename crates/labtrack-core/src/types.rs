use serde::{Deserialize, Serialize};

/// Pixel region of a detected face within a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Fixed-length face embedding vector (128-dimensional in both extractors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Cosine distance (1 − dot) between two L2-normalized embeddings.
    /// 0 = identical, larger = more different.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        1.0 - dot
    }

    /// L2-normalize in place. Zero vectors are left untouched.
    pub fn normalize(&mut self) {
        let norm: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
    }
}

/// A known individual with their variant set of reference embeddings.
///
/// Built once per session load and immutable afterwards; rebuilt when the
/// grade/context changes.
#[derive(Debug, Clone)]
pub struct Individual {
    pub student_id: i64,
    pub display_name: String,
    pub surname: String,
    pub encodings: Vec<Embedding>,
}

/// The in-memory set of known individuals available for matching.
///
/// Individual order is significant: the frame matcher resolves matches in
/// gallery order, and assignment determinism downstream depends on it.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    pub individuals: Vec<Individual>,
}

impl Gallery {
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }
}
