//! Gallery builder: reference photos → variant embedding sets.
//!
//! Each individual's photo is expanded into a small set of image variants
//! (brightness and rotation perturbations) and one embedding is computed per
//! variant that yields a detectable face, making matching more robust to
//! pose and lighting. A failure on one individual never aborts the batch.

use crate::extract::FaceExtractor;
use crate::types::{Gallery, Individual};
use image::RgbImage;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

/// Brightness offset approximating ±10% of the 8-bit range.
const BRIGHTNESS_STEP: i32 = 25;
const ROTATION_DEGREES: f32 = 10.0;

/// One roster row as loaded from the store: identity plus reference photo.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub student_id: i64,
    pub display_name: String,
    pub surname: String,
    pub photo: Option<Vec<u8>>,
}

/// Build a gallery from roster entries.
///
/// Entries without a photo, with an undecodable photo, or whose variants all
/// fail to produce an embedding are skipped with a warning. An empty gallery
/// is a valid result ("nothing to match"), never an error.
pub fn build_gallery(roster: &[RosterEntry], extractor: &mut dyn FaceExtractor) -> Gallery {
    let mut individuals = Vec::with_capacity(roster.len());

    for entry in roster {
        let Some(photo) = entry.photo.as_deref() else {
            tracing::warn!(student_id = entry.student_id, "no reference photo; skipping");
            continue;
        };

        let image = match image::load_from_memory(photo) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(
                    student_id = entry.student_id,
                    error = %e,
                    "could not decode reference photo; skipping"
                );
                continue;
            }
        };

        let mut encodings = Vec::new();
        for variant in variants(&image) {
            match extractor.detect_and_encode(&variant) {
                // Best detection only: the reference photo should contain
                // one face, extra detections are background noise.
                Ok(faces) => {
                    if let Some(face) = faces.into_iter().next() {
                        encodings.push(face.embedding);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        student_id = entry.student_id,
                        error = %e,
                        "variant encoding failed"
                    );
                }
            }
        }

        if encodings.is_empty() {
            tracing::warn!(
                student_id = entry.student_id,
                "no variant produced an embedding; skipping"
            );
            continue;
        }

        tracing::debug!(
            student_id = entry.student_id,
            variants = encodings.len(),
            "gallery entry built"
        );

        individuals.push(Individual {
            student_id: entry.student_id,
            display_name: entry.display_name.clone(),
            surname: entry.surname.clone(),
            encodings,
        });
    }

    tracing::info!(
        individuals = individuals.len(),
        of = roster.len(),
        "gallery built"
    );
    Gallery { individuals }
}

/// Image variants for robustness: the unmodified original always comes
/// first, followed by brightness and small-rotation perturbations.
pub fn variants(image: &RgbImage) -> Vec<RgbImage> {
    let theta = ROTATION_DEGREES.to_radians();
    vec![
        image.clone(),
        image::imageops::brighten(image, BRIGHTNESS_STEP),
        image::imageops::brighten(image, -BRIGHTNESS_STEP),
        rotate_about_center(image, theta, Interpolation::Bilinear, image::Rgb([0, 0, 0])),
        rotate_about_center(image, -theta, Interpolation::Bilinear, image::Rgb([0, 0, 0])),
    ]
}
