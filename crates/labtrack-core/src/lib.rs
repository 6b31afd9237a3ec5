//! labtrack-core — Face gallery building and per-frame matching.
//!
//! The recognition pipeline: a [`FaceExtractor`] turns an image into
//! embeddings, the gallery builder produces a variant set per known
//! individual, and the frame matcher resolves which known individuals are
//! visible in a camera frame.

pub mod detector;
pub mod encoder;
pub mod extract;
pub mod gallery;
pub mod landmarks;
pub mod matcher;
pub mod types;

pub use encoder::{OnnxEncoder, ENCODER_TOLERANCE};
pub use extract::{DetectedFace, ExtractorError, FaceExtractor};
pub use landmarks::{LandmarkProjector, LANDMARK_TOLERANCE};
pub use gallery::{build_gallery, RosterEntry};
pub use matcher::{match_frame, RecognizedIndividual};
pub use types::{Embedding, FaceRegion, Gallery, Individual};
