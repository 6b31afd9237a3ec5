//! Anchor-free ONNX face detector (SCRFD family, e.g. scrfd_500m_bnkps).
//!
//! Decodes score/box/keypoint tensors at strides 8/16/32 and returns
//! confidence-sorted face regions with five-point landmarks.

use crate::extract::ExtractorError;
use crate::types::FaceRegion;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DET_NMS_THRESHOLD: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

/// Horizontal and vertical mapping factors from model space back to frame space.
struct ScaleInfo {
    x: f32,
    y: f32,
}

pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    /// Load the detection model from the given ONNX file.
    pub fn load(model_path: &str) -> Result<Self, ExtractorError> {
        if !Path::new(model_path).exists() {
            return Err(ExtractorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        if num_outputs < 9 {
            return Err(ExtractorError::InferenceFailed(format!(
                "detector needs 9 outputs (3 strides x score/box/kps), got {num_outputs}"
            )));
        }

        tracing::info!(path = model_path, outputs = num_outputs, "loaded face detection model");

        Ok(Self { session })
    }

    /// Detect faces in an RGB frame, most confident first.
    pub fn detect(&mut self, image: &image::RgbImage) -> Result<Vec<FaceRegion>, ExtractorError> {
        let (input, scale) = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // Positional output layout: [0-2] scores, [3-5] boxes, [6-8] kps,
        // one slot per stride.
        let mut detections = Vec::new();
        for (pos, &stride) in DET_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[pos + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractorError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[pos + 6]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            decode_stride(scores, boxes, kps, stride, &scale, &mut detections);
        }

        let mut kept = nms(detections, DET_NMS_THRESHOLD);
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(kept)
    }
}

/// Resize to the square model input (independent axis scaling) and build the
/// normalized NCHW tensor.
fn preprocess(image: &image::RgbImage) -> (Array4<f32>, ScaleInfo) {
    let resized = image::imageops::resize(
        image,
        DET_INPUT_SIZE as u32,
        DET_INPUT_SIZE as u32,
        image::imageops::FilterType::Triangle,
    );

    let scale = ScaleInfo {
        x: image.width() as f32 / DET_INPUT_SIZE as f32,
        y: image.height() as f32 / DET_INPUT_SIZE as f32,
    };

    let mut tensor = Array4::<f32>::zeros((1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 - DET_MEAN) / DET_STD;
        }
    }

    (tensor, scale)
}

/// Decode one stride level: distances from the anchor center, in stride units.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    scale: &ScaleInfo,
    out: &mut Vec<FaceRegion>,
) {
    let grid = DET_INPUT_SIZE / stride;
    let num_anchors = grid * grid * DET_ANCHORS_PER_CELL;
    let s = stride as f32;

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= DET_CONFIDENCE_THRESHOLD {
            continue;
        }

        let cell = idx / DET_ANCHORS_PER_CELL;
        let cx = (cell % grid) as f32 * s;
        let cy = (cell / grid) as f32 * s;

        let b = idx * 4;
        if b + 3 >= boxes.len() {
            continue;
        }
        let x1 = (cx - boxes[b] * s) * scale.x;
        let y1 = (cy - boxes[b + 1] * s) * scale.y;
        let x2 = (cx + boxes[b + 2] * s) * scale.x;
        let y2 = (cy + boxes[b + 3] * s) * scale.y;

        let k = idx * 10;
        let landmarks = if k + 9 < kps.len() {
            let mut lms = [(0.0f32, 0.0f32); 5];
            for (i, lm) in lms.iter_mut().enumerate() {
                *lm = (
                    (cx + kps[k + i * 2] * s) * scale.x,
                    (cy + kps[k + i * 2 + 1] * s) * scale.y,
                );
            }
            Some(lms)
        } else {
            None
        };

        out.push(FaceRegion {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }
}

/// Non-maximum suppression over confidence-sorted regions.
fn nms(mut regions: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    regions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceRegion> = Vec::new();
    for candidate in regions {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f32, y: f32, w: f32, h: f32, conf: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou_disjoint() {
        let a = region(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = region(20.0, 20.0, 10.0, 10.0, 0.8);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_identical() {
        let a = region(5.0, 5.0, 10.0, 10.0, 0.9);
        assert!((iou(&a, &a.clone()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlap_keeps_best() {
        let dets = vec![
            region(0.0, 0.0, 10.0, 10.0, 0.7),
            region(1.0, 1.0, 10.0, 10.0, 0.9),
            region(50.0, 50.0, 10.0, 10.0, 0.8),
        ];
        let kept = nms(dets, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stride_below_threshold_skipped() {
        let grid = DET_INPUT_SIZE / 32;
        let n = grid * grid * DET_ANCHORS_PER_CELL;
        let scores = vec![0.1f32; n];
        let boxes = vec![1.0f32; n * 4];
        let kps = vec![0.0f32; n * 10];
        let mut out = Vec::new();
        decode_stride(&scores, &boxes, &kps, 32, &ScaleInfo { x: 1.0, y: 1.0 }, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_decode_stride_box_geometry() {
        let grid = DET_INPUT_SIZE / 32;
        let n = grid * grid * DET_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; n];
        scores[0] = 0.9;
        // One stride unit in every direction from the (0, 0) anchor.
        let boxes = vec![1.0f32; n * 4];
        let kps = vec![0.0f32; n * 10];
        let mut out = Vec::new();
        decode_stride(&scores, &boxes, &kps, 32, &ScaleInfo { x: 1.0, y: 1.0 }, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].x, -32.0);
        assert_eq!(out[0].width, 64.0);
        assert!(out[0].landmarks.is_some());
    }
}
