//! Bounding oversized images before detection.

use image::imageops::FilterType;
use image::DynamicImage;

/// Default bound on the longer image side, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 640;

/// Target size for an image of `width` × `height` whose longer side must not
/// exceed `max_dimension`. Returns `None` when no resize is needed.
///
/// The longer side becomes exactly `max_dimension`; the shorter side is
/// `round(shorter * max_dimension / longer)`, never below 1.
pub fn scaled_size(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let longer = width.max(height);
    if longer <= max_dimension || max_dimension == 0 {
        return None;
    }

    let scale = |side: u32| -> u32 {
        let scaled = (side as f64 * max_dimension as f64 / longer as f64).round() as u32;
        scaled.max(1)
    };

    if width >= height {
        Some((max_dimension, scale(height)))
    } else {
        Some((scale(width), max_dimension))
    }
}

/// Downscale `image` proportionally so its longer side fits `max_dimension`.
pub fn fit_within(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    match scaled_size(image.width(), image.height(), max_dimension) {
        Some((w, h)) => {
            tracing::debug!(
                from_width = image.width(),
                from_height = image.height(),
                to_width = w,
                to_height = h,
                "downscaling image"
            );
            image.resize_exact(w, h, FilterType::Triangle)
        }
        None => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn landscape_is_bounded_on_width() {
        assert_eq!(scaled_size(2000, 1000, 640), Some((640, 320)));
    }

    #[test]
    fn portrait_is_bounded_on_height() {
        assert_eq!(scaled_size(1000, 3000, 640), Some((213, 640)));
    }

    #[test]
    fn shorter_side_is_rounded() {
        // 1000 * 640 / 1500 = 426.67
        assert_eq!(scaled_size(1500, 1000, 640), Some((640, 427)));
    }

    #[test]
    fn small_image_untouched() {
        assert_eq!(scaled_size(640, 480, 640), None);
        assert_eq!(scaled_size(10, 10, 640), None);
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        assert_eq!(scaled_size(10_000, 2, 640), Some((640, 1)));
    }

    #[test]
    fn fit_within_resizes_buffer() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(2000, 1000));
        let out = fit_within(img, 640);
        assert_eq!((out.width(), out.height()), (640, 320));
    }

    #[test]
    fn fit_within_passes_small_images_through() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(300, 200));
        let out = fit_within(img, 640);
        assert_eq!((out.width(), out.height()), (300, 200));
    }
}
