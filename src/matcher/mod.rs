//! CredentialMatcher - per-frame identity candidates
//!
//! ## Responsibilities
//!
//! - QR channel: decode a pass token from the full frame (every frame)
//! - Face channel: detect + match faces against the gallery on every
//!   other frame, at half resolution
//! - Channel isolation: a failure in one channel never aborts the frame
//!   or the other channel

use crate::error::{Error, Result};
use crate::frame_source::Frame;
use crate::recognition::{FaceEngine, FaceGallery, FaceRegion};
use image::imageops::FilterType;
use image::RgbImage;
use std::sync::Arc;

/// Detection runs at 1/FACE_DOWNSCALE resolution; surfaced boxes are
/// scaled back up by the same factor.
const FACE_DOWNSCALE: u32 = 2;

/// One identity candidate produced from a frame. Ephemeral: lives for a
/// single pipeline iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityCandidate {
    /// Decoded QR pass token, with the detected quadrilateral corners
    /// (overlay only).
    Qr {
        token: String,
        corners: Option<[(i32, i32); 4]>,
    },
    /// Gallery face match below the acceptance threshold.
    Face {
        name: String,
        distance: f32,
        region: FaceRegion,
    },
    /// Detected face with no acceptable gallery match.
    UnknownFace { region: FaceRegion },
}

/// CredentialMatcher instance
pub struct CredentialMatcher {
    engine: Arc<dyn FaceEngine>,
    gallery: FaceGallery,
    threshold: f32,
    /// Decimation toggle: the face channel runs when this is true.
    face_frame: bool,
}

impl CredentialMatcher {
    /// Create new CredentialMatcher
    pub fn new(engine: Arc<dyn FaceEngine>, gallery: FaceGallery, threshold: f32) -> Self {
        Self {
            engine,
            gallery,
            threshold,
            face_frame: true,
        }
    }

    pub fn gallery_size(&self) -> usize {
        self.gallery.len()
    }

    /// Run both channels over a frame and collect candidates. A frame may
    /// yield a QR candidate and face candidates simultaneously; the
    /// authorization policy treats them as separate attempts.
    pub fn match_frame(&mut self, frame: &Frame) -> Vec<IdentityCandidate> {
        let mut candidates = Vec::new();

        match self.decode_qr(&frame.image) {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "QR channel failed for frame");
            }
        }

        if self.face_frame {
            match self.match_faces(&frame.image) {
                Ok(mut faces) => candidates.append(&mut faces),
                Err(e) => {
                    tracing::warn!(error = %e, "Face channel failed for frame");
                }
            }
        }
        self.face_frame = !self.face_frame;

        candidates
    }

    /// QR channel: grayscale the full frame and decode the first detected
    /// code.
    fn decode_qr(&self, image: &RgbImage) -> Result<Option<IdentityCandidate>> {
        let gray = image::imageops::grayscale(image);
        let mut prepared = rqrr::PreparedImage::prepare(gray);

        let grid = match prepared.detect_grids().into_iter().next() {
            Some(grid) => grid,
            None => return Ok(None),
        };

        let b = &grid.bounds;
        let corners = [
            (b[0].x, b[0].y),
            (b[1].x, b[1].y),
            (b[2].x, b[2].y),
            (b[3].x, b[3].y),
        ];
        let (_meta, token) = grid
            .decode()
            .map_err(|e| Error::Decode(format!("QR decode failed: {:?}", e)))?;

        tracing::debug!(token_len = token.len(), "QR code decoded");

        Ok(Some(IdentityCandidate::Qr {
            token,
            corners: Some(corners),
        }))
    }

    /// Face channel: detect at half resolution, match each region against
    /// the gallery. With an empty gallery every region is surfaced as
    /// unknown and no embedding is computed (cold-start state).
    fn match_faces(&self, image: &RgbImage) -> Result<Vec<IdentityCandidate>> {
        let small = image::imageops::resize(
            image,
            (image.width() / FACE_DOWNSCALE).max(1),
            (image.height() / FACE_DOWNSCALE).max(1),
            FilterType::Triangle,
        );

        let regions = self.engine.detect_faces(&small)?;
        if regions.is_empty() {
            return Ok(Vec::new());
        }

        if self.gallery.is_empty() {
            return Ok(regions
                .into_iter()
                .map(|region| IdentityCandidate::UnknownFace {
                    region: region.scaled(FACE_DOWNSCALE),
                })
                .collect());
        }

        let mut candidates = Vec::with_capacity(regions.len());
        for region in regions {
            let encoding = self.engine.embed(&small, &region)?;
            let surfaced = region.scaled(FACE_DOWNSCALE);

            match self.gallery.best_match(&encoding) {
                Some((name, distance)) if distance < self.threshold => {
                    candidates.push(IdentityCandidate::Face {
                        name: name.to_string(),
                        distance,
                        region: surfaced,
                    });
                }
                _ => candidates.push(IdentityCandidate::UnknownFace { region: surfaced }),
            }
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::{FeatureVector, GalleryEntry};
    use image::Luma;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine stub: fixed regions at detection resolution, one encoding
    /// per region, embed-call counter.
    struct StubEngine {
        regions: Vec<FaceRegion>,
        encodings: Vec<FeatureVector>,
        embed_calls: AtomicUsize,
    }

    impl StubEngine {
        fn new(regions: Vec<FaceRegion>, encodings: Vec<FeatureVector>) -> Self {
            Self {
                regions,
                encodings,
                embed_calls: AtomicUsize::new(0),
            }
        }
    }

    impl FaceEngine for StubEngine {
        fn detect_faces(&self, _image: &RgbImage) -> Result<Vec<FaceRegion>> {
            Ok(self.regions.clone())
        }

        fn embed(&self, _image: &RgbImage, region: &FaceRegion) -> Result<FeatureVector> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            let idx = self
                .regions
                .iter()
                .position(|r| r == region)
                .expect("unknown region");
            Ok(self.encodings[idx].clone())
        }
    }

    fn region(left: u32, top: u32) -> FaceRegion {
        FaceRegion {
            top,
            right: left + 20,
            bottom: top + 20,
            left,
        }
    }

    fn blank_frame() -> Frame {
        Frame::new(RgbImage::new(160, 120))
    }

    fn qr_frame(payload: &str) -> Frame {
        let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
        let rendered = code
            .render::<Luma<u8>>()
            .min_dimensions(240, 240)
            .build();
        Frame::new(image::DynamicImage::ImageLuma8(rendered).to_rgb8())
    }

    #[test]
    fn empty_gallery_yields_unknown_without_embedding() {
        let engine = Arc::new(StubEngine::new(vec![region(10, 10), region(40, 10)], vec![]));
        let mut matcher = CredentialMatcher::new(engine.clone(), FaceGallery::empty(), 0.38);

        let candidates = matcher.match_frame(&blank_frame());
        assert_eq!(candidates.len(), 2);
        assert!(candidates
            .iter()
            .all(|c| matches!(c, IdentityCandidate::UnknownFace { .. })));
        assert_eq!(engine.embed_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn match_is_strictly_below_threshold() {
        let gallery = FaceGallery::from_entries(vec![GalleryEntry {
            name: "alice".to_string(),
            encoding: vec![0.0, 0.0],
        }]);
        // probe [3,4] is at distance exactly 5.0, probe [0,4] at 4.0
        let engine = Arc::new(StubEngine::new(
            vec![region(10, 10), region(40, 10)],
            vec![vec![3.0, 4.0], vec![0.0, 4.0]],
        ));
        let mut matcher = CredentialMatcher::new(engine, gallery, 5.0);

        let candidates = matcher.match_frame(&blank_frame());
        assert_eq!(candidates.len(), 2);
        assert!(matches!(
            &candidates[0],
            IdentityCandidate::UnknownFace { .. }
        ));
        match &candidates[1] {
            IdentityCandidate::Face { name, distance, .. } => {
                assert_eq!(name, "alice");
                assert_eq!(*distance, 4.0);
            }
            other => panic!("expected face match, got {:?}", other),
        }
    }

    #[test]
    fn face_regions_scale_back_to_full_resolution() {
        let engine = Arc::new(StubEngine::new(vec![region(10, 5)], vec![]));
        let mut matcher = CredentialMatcher::new(engine, FaceGallery::empty(), 0.38);

        let candidates = matcher.match_frame(&blank_frame());
        match &candidates[0] {
            IdentityCandidate::UnknownFace { region } => {
                assert_eq!(region.left, 20);
                assert_eq!(region.top, 10);
                assert_eq!(region.right, 60);
                assert_eq!(region.bottom, 50);
            }
            other => panic!("expected unknown face, got {:?}", other),
        }
    }

    #[test]
    fn face_channel_runs_on_every_other_frame() {
        let engine = Arc::new(StubEngine::new(vec![region(10, 10)], vec![]));
        let mut matcher = CredentialMatcher::new(engine, FaceGallery::empty(), 0.38);

        assert_eq!(matcher.match_frame(&blank_frame()).len(), 1);
        assert_eq!(matcher.match_frame(&blank_frame()).len(), 0);
        assert_eq!(matcher.match_frame(&blank_frame()).len(), 1);
    }

    #[test]
    fn qr_channel_decodes_token_with_corners() {
        let engine = Arc::new(StubEngine::new(vec![], vec![]));
        let mut matcher = CredentialMatcher::new(engine, FaceGallery::empty(), 0.38);

        let candidates = matcher.match_frame(&qr_frame("abc-123"));
        assert_eq!(candidates.len(), 1);
        match &candidates[0] {
            IdentityCandidate::Qr { token, corners } => {
                assert_eq!(token, "abc-123");
                assert!(corners.is_some());
            }
            other => panic!("expected QR candidate, got {:?}", other),
        }
    }

    #[test]
    fn qr_and_face_channels_are_independent() {
        let engine = Arc::new(StubEngine::new(vec![region(5, 5)], vec![]));
        let mut matcher = CredentialMatcher::new(engine, FaceGallery::empty(), 0.38);

        let candidates = matcher.match_frame(&qr_frame("pass-1"));
        assert!(candidates
            .iter()
            .any(|c| matches!(c, IdentityCandidate::Qr { .. })));
        assert!(candidates
            .iter()
            .any(|c| matches!(c, IdentityCandidate::UnknownFace { .. })));
    }

    #[test]
    fn gallery_load_is_idempotent_for_fixed_frame() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"encodings": [[0.1, 0.2]], "names": ["alice"]}}"#
        )
        .unwrap();

        let run = |gallery: FaceGallery| {
            let engine = Arc::new(StubEngine::new(
                vec![region(10, 10)],
                vec![vec![0.1, 0.2]],
            ));
            let mut matcher = CredentialMatcher::new(engine, gallery, 0.38);
            matcher.match_frame(&blank_frame())
        };

        let first = run(FaceGallery::load(file.path()).unwrap());
        let second = run(FaceGallery::load(file.path()).unwrap());
        assert_eq!(first, second);
        assert!(matches!(&first[0], IdentityCandidate::Face { name, .. } if name == "alice"));
    }
}
