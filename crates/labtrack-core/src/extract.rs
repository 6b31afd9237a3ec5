//! The face-embedding capability the rest of the system consumes.
//!
//! Two incompatible extractor implementations exist ([`crate::encoder`] and
//! [`crate::landmarks`]) with different vector semantics; callers select one
//! by configuration and must use that extractor's own tolerance and metric.

use crate::types::{Embedding, FaceRegion};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face paired with its embedding.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub embedding: Embedding,
    pub region: FaceRegion,
}

/// Swappable face detection + encoding capability.
///
/// "No face found" is no signal, not an error: implementations return an
/// empty vec and reserve `Err` for model and inference failures.
pub trait FaceExtractor {
    /// Detect faces in the image and compute one embedding per face.
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractorError>;

    /// Maximum distance accepted as a positive match for this extractor.
    fn tolerance(&self) -> f32;

    /// Distance metric matching this extractor's embedding semantics.
    fn distance(&self, a: &Embedding, b: &Embedding) -> f32;
}
