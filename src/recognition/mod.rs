//! Face recognition capability and identity gallery
//!
//! ## Responsibilities
//!
//! - `FaceEngine`: the injected detect/embed capability (the recognition
//!   technique itself lives outside this crate)
//! - Euclidean feature distance
//! - `FaceGallery`: known identities loaded once at startup, queried by
//!   linear scan per detection

use crate::error::{Error, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Face bounding box in pixel coordinates (top/right/bottom/left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    /// Scale all edges by an integer factor (detection runs on a
    /// downscaled frame; boxes are surfaced at full resolution).
    pub fn scaled(&self, factor: u32) -> FaceRegion {
        FaceRegion {
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            left: self.left * factor,
        }
    }
}

/// Fixed-length numeric face encoding.
pub type FeatureVector = Vec<f32>;

/// Injected recognition capability: find face regions, encode them.
pub trait FaceEngine: Send + Sync {
    fn detect_faces(&self, image: &RgbImage) -> Result<Vec<FaceRegion>>;
    fn embed(&self, image: &RgbImage, region: &FaceRegion) -> Result<FeatureVector>;
}

/// Euclidean distance between two feature vectors.
pub fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// One known identity.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub name: String,
    pub encoding: FeatureVector,
}

/// On-disk gallery format: parallel encoding/name arrays.
#[derive(Debug, Serialize, Deserialize)]
struct GalleryFile {
    encodings: Vec<FeatureVector>,
    names: Vec<String>,
}

/// Preloaded identity gallery, immutable for the run.
#[derive(Debug, Default)]
pub struct FaceGallery {
    entries: Vec<GalleryEntry>,
}

impl FaceGallery {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    /// Load the gallery file. A missing file is the documented cold-start
    /// state: warn and run with an empty gallery.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Face gallery file missing, starting empty");
                return Ok(Self::empty());
            }
            Err(e) => return Err(e.into()),
        };

        let file: GalleryFile = serde_json::from_slice(&raw)?;
        if file.encodings.len() != file.names.len() {
            return Err(Error::Config(format!(
                "gallery file {}: {} encodings vs {} names",
                path.display(),
                file.encodings.len(),
                file.names.len()
            )));
        }

        let entries: Vec<GalleryEntry> = file
            .names
            .into_iter()
            .zip(file.encodings)
            .map(|(name, encoding)| GalleryEntry { name, encoding })
            .collect();

        tracing::info!(path = %path.display(), entries = entries.len(), "Face gallery loaded");

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Minimum-distance entry for a probe encoding. Linear scan; galleries
    /// hold tens of entries.
    pub fn best_match(&self, probe: &[f32]) -> Option<(&str, f32)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), distance(&e.encoding, probe)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Engine that never detects anything. Wired by default until a real
/// engine implementation is injected; the QR and remote paths carry the
/// system without it.
pub struct NullFaceEngine;

impl FaceEngine for NullFaceEngine {
    fn detect_faces(&self, _image: &RgbImage) -> Result<Vec<FaceRegion>> {
        Ok(Vec::new())
    }

    fn embed(&self, _image: &RgbImage, _region: &FaceRegion) -> Result<FeatureVector> {
        Ok(Vec::new())
    }
}
