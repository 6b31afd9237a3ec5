//! Pretrained ONNX face encoder extractor.
//!
//! Crops each detected face, resizes to the model input, and produces a
//! 128-dimensional L2-normalized embedding compared by Euclidean distance.

use crate::detector::FaceDetector;
use crate::extract::{DetectedFace, ExtractorError, FaceExtractor};
use crate::types::Embedding;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const ENC_INPUT_SIZE: usize = 112;
const ENC_MEAN: f32 = 127.5;
const ENC_STD: f32 = 127.5;
const ENC_EMBEDDING_DIM: usize = 128;

/// Default match tolerance for this encoder's Euclidean space.
pub const ENCODER_TOLERANCE: f32 = 0.40;

pub struct OnnxEncoder {
    detector: FaceDetector,
    session: Session,
    tolerance: f32,
}

impl OnnxEncoder {
    pub fn load(detector_path: &str, encoder_path: &str, tolerance: f32) -> Result<Self, ExtractorError> {
        if !Path::new(encoder_path).exists() {
            return Err(ExtractorError::ModelNotFound(encoder_path.to_string()));
        }

        let detector = FaceDetector::load(detector_path)?;
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(encoder_path)?;

        tracing::info!(path = encoder_path, tolerance, "loaded face encoder model");

        Ok(Self {
            detector,
            session,
            tolerance,
        })
    }

    fn encode_crop(&mut self, crop: &RgbImage) -> Result<Embedding, ExtractorError> {
        let input = preprocess(crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractorError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ENC_EMBEDDING_DIM {
            return Err(ExtractorError::InferenceFailed(format!(
                "expected {ENC_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        let mut embedding = Embedding { values: raw.to_vec() };
        embedding.normalize();
        Ok(embedding)
    }
}

impl FaceExtractor for OnnxEncoder {
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractorError> {
        let regions = self.detector.detect(image)?;

        let mut faces = Vec::with_capacity(regions.len());
        for region in regions {
            let crop = crop_region(image, &region);
            let embedding = self.encode_crop(&crop)?;
            faces.push(DetectedFace { embedding, region });
        }
        Ok(faces)
    }

    fn tolerance(&self) -> f32 {
        self.tolerance
    }

    fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        a.euclidean_distance(b)
    }
}

/// Crop the region (clamped to image bounds) and resize to the encoder input.
fn crop_region(image: &RgbImage, region: &crate::types::FaceRegion) -> RgbImage {
    let x = region.x.max(0.0) as u32;
    let y = region.y.max(0.0) as u32;
    let w = (region.width.max(1.0) as u32).min(image.width().saturating_sub(x).max(1));
    let h = (region.height.max(1.0) as u32).min(image.height().saturating_sub(y).max(1));

    let cropped = image::imageops::crop_imm(image, x, y, w, h).to_image();
    image::imageops::resize(
        &cropped,
        ENC_INPUT_SIZE as u32,
        ENC_INPUT_SIZE as u32,
        image::imageops::FilterType::Triangle,
    )
}

fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, ENC_INPUT_SIZE, ENC_INPUT_SIZE));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 - ENC_MEAN) / ENC_STD;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaceRegion;

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let crop = RgbImage::from_pixel(
            ENC_INPUT_SIZE as u32,
            ENC_INPUT_SIZE as u32,
            image::Rgb([128, 128, 128]),
        );
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, ENC_INPUT_SIZE, ENC_INPUT_SIZE]);
        let expected = (128.0 - ENC_MEAN) / ENC_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_crop_region_clamps_to_bounds() {
        let image = RgbImage::from_pixel(100, 80, image::Rgb([10, 20, 30]));
        let region = FaceRegion {
            x: -15.0,
            y: 60.0,
            width: 500.0,
            height: 500.0,
            confidence: 0.9,
            landmarks: None,
        };
        let crop = crop_region(&image, &region);
        assert_eq!(crop.width(), ENC_INPUT_SIZE as u32);
        assert_eq!(crop.height(), ENC_INPUT_SIZE as u32);
    }
}
