//! Face detector interface and backend selection.

use crate::types::BoundingBox;
use image::GrayImage;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: String, reason: String },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("unknown detector backend: {0} (expected seeta or scrfd)")]
    UnknownBackend(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face localisation strategy.
///
/// Implementations return every candidate they find; callers decide which
/// one to use. Coordinates are in pixels of the input image.
pub trait FaceDetector: Send {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Named detector backends. Trades speed (`Seeta`) for recall (`Scrfd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorBackend {
    /// SeetaFace funnel-structured cascade. Fast, frontal faces only.
    #[default]
    Seeta,
    /// SCRFD anchor-free CNN via ONNX Runtime. Slower, handles pose and scale.
    Scrfd,
}

impl DetectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorBackend::Seeta => "seeta",
            DetectorBackend::Scrfd => "scrfd",
        }
    }
}

impl fmt::Display for DetectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorBackend {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "seeta" | "cascade" | "opencv" => Ok(DetectorBackend::Seeta),
            "scrfd" | "retinaface" => Ok(DetectorBackend::Scrfd),
            other => Err(DetectorError::UnknownBackend(other.to_string())),
        }
    }
}

/// Load the detector for `backend` from model files in `model_dir`.
pub fn load_detector(
    backend: DetectorBackend,
    model_dir: &Path,
) -> Result<Box<dyn FaceDetector>, DetectorError> {
    let detector: Box<dyn FaceDetector> = match backend {
        DetectorBackend::Seeta => Box::new(crate::seeta::SeetaDetector::load(
            &model_dir.join(crate::SEETA_MODEL_FILE),
        )?),
        DetectorBackend::Scrfd => Box::new(crate::scrfd::ScrfdDetector::load(
            &model_dir.join(crate::SCRFD_MODEL_FILE),
        )?),
    };
    tracing::info!(%backend, dir = %model_dir.display(), "face detector ready");
    Ok(detector)
}

/// Order candidates best-first: highest confidence, then top-most, then left-most.
///
/// The positional tie-break keeps the choice stable for identical input.
pub fn rank_candidates(candidates: &mut [BoundingBox]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
            .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
    });
}
