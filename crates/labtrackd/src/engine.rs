//! Recognition engine thread.
//!
//! Camera, extractor and gallery live on one dedicated OS thread; the async
//! side talks to it over a bounded channel with oneshot replies. The
//! channel capacity of 1 means at most one recognition pass is in flight —
//! a slow capture delays only the tick that awaits it, never reorders
//! results.

use labtrack_core::{build_gallery, match_frame, FaceExtractor, Gallery, RecognizedIndividual, RosterEntry};
use labtrack_hw::{CameraError, FrameSource};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("extractor error: {0}")]
    Extractor(#[from] labtrack_core::ExtractorError),
    #[error("engine thread exited")]
    ChannelClosed,
}

enum EngineRequest {
    RebuildGallery {
        roster: Vec<RosterEntry>,
        reply: oneshot::Sender<usize>,
    },
    Scan {
        reply: oneshot::Sender<Result<Vec<RecognizedIndividual>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Replace the gallery with embeddings built from the given roster.
    /// Returns the number of individuals that yielded encodings.
    pub async fn rebuild_gallery(&self, roster: Vec<RosterEntry>) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::RebuildGallery {
                roster,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Capture one frame and match it against the current gallery.
    pub async fn scan(&self) -> Result<Vec<RecognizedIndividual>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Scan { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Discards warmup frames first (camera AGC/AE stabilization), then enters
/// the request loop. The gallery starts empty; callers must rebuild it
/// before scans can match anything.
pub fn spawn_engine(
    mut source: Box<dyn FrameSource>,
    mut extractor: Box<dyn FaceExtractor + Send>,
    max_faces: usize,
    warmup_frames: usize,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(1);

    std::thread::Builder::new()
        .name("labtrack-engine".into())
        .spawn(move || {
            if warmup_frames > 0 {
                tracing::info!(count = warmup_frames, "discarding warmup frames");
                for _ in 0..warmup_frames {
                    let _ = source.next_frame();
                }
            }

            let mut gallery = Gallery::default();
            tracing::info!(max_faces, "engine thread started");

            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::RebuildGallery { roster, reply } => {
                        gallery = build_gallery(&roster, &mut *extractor);
                        tracing::info!(
                            individuals = gallery.individuals.len(),
                            "gallery rebuilt"
                        );
                        let _ = reply.send(gallery.individuals.len());
                    }
                    EngineRequest::Scan { reply } => {
                        let result = run_scan(&mut *source, &gallery, &mut *extractor, max_faces);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn run_scan(
    source: &mut dyn FrameSource,
    gallery: &Gallery,
    extractor: &mut dyn FaceExtractor,
    max_faces: usize,
) -> Result<Vec<RecognizedIndividual>, EngineError> {
    let frame = source.next_frame()?;
    if frame.is_dark {
        tracing::debug!(seq = frame.sequence, "dark frame, skipping recognition");
        return Ok(Vec::new());
    }
    Ok(match_frame(&frame.to_rgb_image(), gallery, extractor, max_faces)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrack_core::{DetectedFace, Embedding, ExtractorError, FaceRegion};
    use labtrack_hw::Frame;

    struct CannedSource {
        width: u32,
        height: u32,
        sequence: u32,
    }

    impl FrameSource for CannedSource {
        fn next_frame(&mut self) -> Result<Frame, CameraError> {
            self.sequence += 1;
            Ok(Frame {
                data: vec![128; (self.width * self.height) as usize],
                width: self.width,
                height: self.height,
                timestamp: std::time::Instant::now(),
                sequence: self.sequence,
                is_dark: false,
            })
        }

        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }
    }

    /// Emits one fixed probe per image, so gallery photos and camera frames
    /// all land on the same embedding.
    struct FixedExtractor;

    impl FaceExtractor for FixedExtractor {
        fn detect_and_encode(
            &mut self,
            _image: &image::RgbImage,
        ) -> Result<Vec<DetectedFace>, ExtractorError> {
            Ok(vec![DetectedFace {
                embedding: Embedding {
                    values: vec![1.0, 0.0],
                },
                region: FaceRegion {
                    x: 0.0,
                    y: 0.0,
                    width: 8.0,
                    height: 8.0,
                    confidence: 0.9,
                    landmarks: None,
                },
            }])
        }

        fn tolerance(&self) -> f32 {
            0.5
        }

        fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
            a.euclidean_distance(b)
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([120, 120, 120]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_rebuild_then_scan_recognizes() {
        let source = Box::new(CannedSource {
            width: 16,
            height: 16,
            sequence: 0,
        });
        let handle = spawn_engine(source, Box::new(FixedExtractor), 4, 0);

        let roster = vec![RosterEntry {
            student_id: 7,
            display_name: "Ana Alvarez".into(),
            surname: "Alvarez".into(),
            photo: Some(png_bytes()),
        }];
        assert_eq!(handle.rebuild_gallery(roster).await.unwrap(), 1);

        let found = handle.scan().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].student_id, 7);
    }

    #[tokio::test]
    async fn test_scan_with_empty_gallery_is_empty() {
        let source = Box::new(CannedSource {
            width: 16,
            height: 16,
            sequence: 0,
        });
        let handle = spawn_engine(source, Box::new(FixedExtractor), 4, 0);
        assert!(handle.scan().await.unwrap().is_empty());
    }
}
