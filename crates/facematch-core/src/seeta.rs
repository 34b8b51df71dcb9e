//! Classical face detector backed by the `rustface` crate (SeetaFace engine).

use crate::detector::{DetectorError, FaceDetector};
use crate::types::BoundingBox;
use image::GrayImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Smallest face the cascade looks for, in pixels.
const SEETA_MIN_FACE_SIZE: u32 = 30;
const SEETA_SCORE_THRESHOLD: f64 = 2.0;
const SEETA_PYRAMID_SCALE: f32 = 0.8;
const SEETA_WINDOW_STEP: u32 = 4;

/// SeetaFace funnel-structured cascade detector.
pub struct SeetaDetector {
    model: rustface::Model,
}

impl SeetaDetector {
    /// Load the SeetaFace frontal model (`seeta_fd_frontal_v1.0.bin`).
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let load_err = |reason: String| DetectorError::ModelLoad {
            path: model_path.display().to_string(),
            reason,
        };
        let file = File::open(model_path).map_err(|e| load_err(e.to_string()))?;
        let model = rustface::read_model(BufReader::new(file)).map_err(|e| load_err(e.to_string()))?;

        tracing::info!(path = %model_path.display(), "loaded SeetaFace model");
        Ok(Self { model })
    }
}

impl FaceDetector for SeetaDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(SEETA_MIN_FACE_SIZE);
        detector.set_score_thresh(SEETA_SCORE_THRESHOLD);
        detector.set_pyramid_scale_factor(SEETA_PYRAMID_SCALE);
        detector.set_slide_window_step(SEETA_WINDOW_STEP, SEETA_WINDOW_STEP);

        let image = rustface::ImageData::new(gray.as_raw(), gray.width(), gray.height());
        let faces: Vec<BoundingBox> = detector
            .detect(&image)
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                BoundingBox {
                    x: bbox.x() as f32,
                    y: bbox.y() as f32,
                    width: bbox.width() as f32,
                    height: bbox.height() as f32,
                    confidence: face.score() as f32,
                    landmarks: None,
                }
            })
            .collect();

        tracing::debug!(count = faces.len(), "SeetaFace detections");
        Ok(faces)
    }
}
