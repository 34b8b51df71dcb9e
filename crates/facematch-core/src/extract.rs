//! Face extraction: detect, pick one face, crop it out of the source image.

use crate::detector::{rank_candidates, DetectorError, FaceDetector};
use crate::types::CropRect;
use image::{DynamicImage, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("no face detected")]
    NoFace,
    #[error("detected face region lies outside the image")]
    EmptyRegion,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// A cropped face and where it came from.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    pub image: RgbImage,
    pub region: CropRect,
    pub confidence: f32,
}

/// Locate the best face in `image` and return only that region.
///
/// Detection runs on the grayscale image; the crop is taken from the colour
/// source. Zero candidates is an error, never a full-image fallback.
pub fn extract_face(
    image: &DynamicImage,
    detector: &mut dyn FaceDetector,
) -> Result<FaceCrop, ExtractionError> {
    let gray = image.to_luma8();
    let mut candidates = detector.detect(&gray)?;
    rank_candidates(&mut candidates);

    let best = candidates.first().ok_or(ExtractionError::NoFace)?;
    let region = best
        .clamp_to(image.width(), image.height())
        .ok_or(ExtractionError::EmptyRegion)?;

    tracing::debug!(
        candidates = candidates.len(),
        confidence = best.confidence,
        x = region.x,
        y = region.y,
        width = region.width,
        height = region.height,
        "face selected"
    );

    let crop = image
        .crop_imm(region.x, region.y, region.width, region.height)
        .to_rgb8();

    Ok(FaceCrop {
        image: crop,
        region,
        confidence: best.confidence,
    })
}
