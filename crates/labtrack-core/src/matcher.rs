//! Per-frame matching of detected faces against the gallery.

use crate::extract::{ExtractorError, FaceExtractor};
use crate::types::Gallery;
use image::RgbImage;

/// Linear downscale applied before detection, for throughput.
const DOWNSCALE: f32 = 0.25;

/// A known individual recognized in the current frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedIndividual {
    pub student_id: i64,
    pub display_name: String,
}

/// Match one camera frame against the gallery.
///
/// Returns at most `max_faces` recognized individuals, deduplicated by
/// identity. Matching is first-under-tolerance in gallery order — not
/// best-distance — because downstream assignment depends on a stable match
/// order. Zero detections is an empty result, not an error.
pub fn match_frame(
    frame: &RgbImage,
    gallery: &Gallery,
    extractor: &mut dyn FaceExtractor,
    max_faces: usize,
) -> Result<Vec<RecognizedIndividual>, ExtractorError> {
    // Nothing to match: skip the detection cost entirely.
    if gallery.is_empty() || max_faces == 0 {
        return Ok(Vec::new());
    }

    let small = downscale(frame);

    let mut probes = extractor.detect_and_encode(&small)?;
    // Excess detections beyond the cap are dropped, not merged.
    probes.truncate(max_faces);

    let tolerance = extractor.tolerance();
    let mut found: Vec<RecognizedIndividual> = Vec::new();

    for probe in &probes {
        'individuals: for individual in &gallery.individuals {
            if found.iter().any(|f| f.student_id == individual.student_id) {
                continue;
            }
            for variant in &individual.encodings {
                if extractor.distance(variant, &probe.embedding) <= tolerance {
                    found.push(RecognizedIndividual {
                        student_id: individual.student_id,
                        display_name: individual.display_name.clone(),
                    });
                    break 'individuals;
                }
            }
        }
        if found.len() >= max_faces {
            break;
        }
    }

    Ok(found)
}

fn downscale(frame: &RgbImage) -> RgbImage {
    let w = ((frame.width() as f32 * DOWNSCALE) as u32).max(1);
    let h = ((frame.height() as f32 * DOWNSCALE) as u32).max(1);
    image::imageops::resize(frame, w, h, image::imageops::FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{DetectedFace, FaceExtractor};
    use crate::types::{Embedding, FaceRegion, Individual};

    /// Extractor stub returning pre-baked probe embeddings.
    struct FixedProbes {
        probes: Vec<Vec<f32>>,
        detect_calls: usize,
    }

    impl FaceExtractor for FixedProbes {
        fn detect_and_encode(
            &mut self,
            _image: &RgbImage,
        ) -> Result<Vec<DetectedFace>, ExtractorError> {
            self.detect_calls += 1;
            Ok(self
                .probes
                .iter()
                .map(|values| DetectedFace {
                    embedding: Embedding { values: values.clone() },
                    region: FaceRegion {
                        x: 0.0,
                        y: 0.0,
                        width: 10.0,
                        height: 10.0,
                        confidence: 0.9,
                        landmarks: None,
                    },
                })
                .collect())
        }

        fn tolerance(&self) -> f32 {
            0.5
        }

        fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
            a.euclidean_distance(b)
        }
    }

    fn individual(id: i64, name: &str, encodings: Vec<Vec<f32>>) -> Individual {
        Individual {
            student_id: id,
            display_name: name.into(),
            surname: name.into(),
            encodings: encodings
                .into_iter()
                .map(|values| Embedding { values })
                .collect(),
        }
    }

    fn frame() -> RgbImage {
        RgbImage::new(64, 64)
    }

    #[test]
    fn test_empty_gallery_short_circuits() {
        let mut extractor = FixedProbes {
            probes: vec![vec![0.0, 0.0]],
            detect_calls: 0,
        };
        let result = match_frame(&frame(), &Gallery::default(), &mut extractor, 4).unwrap();
        assert!(result.is_empty());
        assert_eq!(extractor.detect_calls, 0, "detection must not run on an empty gallery");
    }

    #[test]
    fn test_no_faces_detected_is_empty() {
        let gallery = Gallery {
            individuals: vec![individual(1, "Ana Alvarez", vec![vec![0.0, 0.0]])],
        };
        let mut extractor = FixedProbes {
            probes: vec![],
            detect_calls: 0,
        };
        let result = match_frame(&frame(), &gallery, &mut extractor, 4).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_first_match_policy_not_best_distance() {
        // Probe at origin: "Far" (first in gallery order, distance 0.4) must
        // win over "Near" (distance 0.1) because both are under tolerance.
        let gallery = Gallery {
            individuals: vec![
                individual(1, "Far", vec![vec![0.4, 0.0]]),
                individual(2, "Near", vec![vec![0.1, 0.0]]),
            ],
        };
        let mut extractor = FixedProbes {
            probes: vec![vec![0.0, 0.0]],
            detect_calls: 0,
        };
        let result = match_frame(&frame(), &gallery, &mut extractor, 4).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].student_id, 1);
    }

    #[test]
    fn test_any_variant_under_tolerance_matches() {
        let gallery = Gallery {
            individuals: vec![individual(
                7,
                "Rossi",
                vec![vec![9.0, 9.0], vec![0.2, 0.0]],
            )],
        };
        let mut extractor = FixedProbes {
            probes: vec![vec![0.0, 0.0]],
            detect_calls: 0,
        };
        let result = match_frame(&frame(), &gallery, &mut extractor, 4).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].student_id, 7);
    }

    #[test]
    fn test_dedup_by_identity() {
        // Two probes both match the same individual: reported once.
        let gallery = Gallery {
            individuals: vec![individual(3, "Mora", vec![vec![0.0, 0.0]])],
        };
        let mut extractor = FixedProbes {
            probes: vec![vec![0.1, 0.0], vec![0.0, 0.1]],
            detect_calls: 0,
        };
        let result = match_frame(&frame(), &gallery, &mut extractor, 4).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_max_faces_caps_probes() {
        let gallery = Gallery {
            individuals: vec![
                individual(1, "A", vec![vec![0.0, 0.0]]),
                individual(2, "B", vec![vec![10.0, 0.0]]),
                individual(3, "C", vec![vec![20.0, 0.0]]),
            ],
        };
        let mut extractor = FixedProbes {
            probes: vec![vec![0.0, 0.0], vec![10.0, 0.0], vec![20.0, 0.0]],
            detect_calls: 0,
        };
        let result = match_frame(&frame(), &gallery, &mut extractor, 2).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].student_id, 1);
        assert_eq!(result[1].student_id, 2);
    }

    #[test]
    fn test_unknown_face_produces_nothing() {
        let gallery = Gallery {
            individuals: vec![individual(1, "A", vec![vec![0.0, 0.0]])],
        };
        let mut extractor = FixedProbes {
            probes: vec![vec![100.0, 100.0]],
            detect_calls: 0,
        };
        let result = match_frame(&frame(), &gallery, &mut extractor, 4).unwrap();
        assert!(result.is_empty());
    }
}
