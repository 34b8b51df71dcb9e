//! Same-person decision between two face crops.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::scrfd::ScrfdDetector;
use crate::types::{BoundingBox, Verdict};
use image::{DynamicImage, RgbImage};
use std::path::Path;
use thiserror::Error;

/// Distances strictly below this are a match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Distance assumed when the model yields none: a definite non-match.
pub const MISSING_DISTANCE: f32 = 1.0;

#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("landmark detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// Dissimilarity between two face crops. Lower = more similar.
///
/// `Ok(None)` means the model ran but produced no usable distance.
pub trait FaceVerifier: Send {
    fn distance(&mut self, a: &RgbImage, b: &RgbImage) -> Result<Option<f32>, VerifierError>;
}

/// Threshold a distance into a match decision.
pub fn decide(distance: Option<f32>, threshold: f32) -> Verdict {
    let distance = match distance {
        Some(d) if d.is_finite() => d,
        _ => MISSING_DISTANCE,
    };
    Verdict {
        distance,
        matched: distance < threshold,
    }
}

/// Run `verifier` over two crops and apply `threshold`.
pub fn verify_faces(
    verifier: &mut dyn FaceVerifier,
    a: &RgbImage,
    b: &RgbImage,
    threshold: f32,
) -> Result<Verdict, VerifierError> {
    let verdict = decide(verifier.distance(a, b)?, threshold);
    tracing::info!(distance = verdict.distance, matched = verdict.matched, threshold, "faces compared");
    Ok(verdict)
}

/// ArcFace cosine-distance verifier.
///
/// Crops are re-detected with SCRFD purely to recover landmarks for
/// alignment; a crop with no landmark hit is embedded unaligned.
pub struct ArcFaceVerifier {
    landmarks: Option<ScrfdDetector>,
    recognizer: FaceRecognizer,
}

impl ArcFaceVerifier {
    pub fn new(landmarks: Option<ScrfdDetector>, recognizer: FaceRecognizer) -> Self {
        Self { landmarks, recognizer }
    }

    /// Load ArcFace, plus SCRFD for alignment when its model is present.
    pub fn load(model_dir: &Path) -> Result<Self, VerifierError> {
        let recognizer = FaceRecognizer::load(&model_dir.join(crate::ARCFACE_MODEL_FILE))?;
        let scrfd_path = model_dir.join(crate::SCRFD_MODEL_FILE);
        let landmarks = if scrfd_path.exists() {
            Some(ScrfdDetector::load(&scrfd_path)?)
        } else {
            tracing::warn!(path = %scrfd_path.display(), "SCRFD model missing; embedding crops without alignment");
            None
        };
        Ok(Self::new(landmarks, recognizer))
    }

    fn face_landmarks(&mut self, face: &RgbImage) -> Result<Option<[(f32, f32); 5]>, VerifierError> {
        let Some(detector) = self.landmarks.as_mut() else {
            return Ok(None);
        };
        let gray = DynamicImage::ImageRgb8(face.clone()).to_luma8();
        let faces: Vec<BoundingBox> = detector.detect(&gray)?;
        Ok(faces.first().and_then(|f| f.landmarks))
    }
}

impl FaceVerifier for ArcFaceVerifier {
    fn distance(&mut self, a: &RgbImage, b: &RgbImage) -> Result<Option<f32>, VerifierError> {
        let la = self.face_landmarks(a)?;
        let lb = self.face_landmarks(b)?;
        let ea = self.recognizer.extract(a, la.as_ref())?;
        let eb = self.recognizer.extract(b, lb.as_ref())?;
        Ok(ea.cosine_distance(&eb))
    }
}
