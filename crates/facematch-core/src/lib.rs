//! facematch-core: face detection, cropping and verification.
//!
//! Detection uses either the SeetaFace cascade (`rustface`) or SCRFD; the
//! same-person decision thresholds the cosine distance between ArcFace
//! embeddings. ONNX models run on CPU via ONNX Runtime.

pub mod alignment;
pub mod detector;
pub mod extract;
pub mod recognizer;
pub mod resize;
pub mod scrfd;
pub mod seeta;
pub mod types;
pub mod verify;

use std::path::PathBuf;

pub use detector::{load_detector, rank_candidates, DetectorBackend, DetectorError, FaceDetector};
pub use extract::{extract_face, ExtractionError, FaceCrop};
pub use recognizer::FaceRecognizer;
pub use resize::{fit_within, DEFAULT_MAX_DIMENSION};
pub use types::{BoundingBox, CropRect, Embedding, Verdict};
pub use verify::{decide, verify_faces, ArcFaceVerifier, FaceVerifier, VerifierError, DEFAULT_MATCH_THRESHOLD};

/// SeetaFace frontal cascade model.
pub const SEETA_MODEL_FILE: &str = "seeta_fd_frontal_v1.0.bin";
/// SCRFD 10G detection model.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace w600k_r50 recognition model.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/facematch/models`, falling back to
/// `~/.local/share/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
        .join("models")
}
