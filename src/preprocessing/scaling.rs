//! # Image Scaling Module
//!
//! Small receipt photos are upscaled before recognition so that glyphs are
//! large enough for the engine. Images whose longer side already reaches
//! [`UPSCALE_THRESHOLD_PX`] are left untouched.

use image::imageops::FilterType;
use image::GrayImage;
use tracing;

use super::types::ScaledImageResult;

/// Longer-side size below which images are upscaled
pub const UPSCALE_THRESHOLD_PX: u32 = 2000;

/// Factor applied to images below the threshold
pub const UPSCALE_FACTOR: u32 = 2;

/// Upscales a grayscale image by [`UPSCALE_FACTOR`] with cubic interpolation
/// when its longer side is below [`UPSCALE_THRESHOLD_PX`].
///
/// # Examples
///
/// ```
/// use image::GrayImage;
/// use receipt_ledger::preprocessing::upscale_for_ocr;
///
/// let small = GrayImage::new(300, 200);
/// let result = upscale_for_ocr(&small);
/// assert_eq!(result.new_dimensions, (600, 400));
/// assert_eq!(result.scale_factor, 2);
/// ```
pub fn upscale_for_ocr(gray: &GrayImage) -> ScaledImageResult {
    let start_time = std::time::Instant::now();
    let (width, height) = gray.dimensions();

    if width.max(height) >= UPSCALE_THRESHOLD_PX {
        return ScaledImageResult {
            image: gray.clone(),
            original_dimensions: (width, height),
            new_dimensions: (width, height),
            scale_factor: 1,
            processing_time_ms: start_time.elapsed().as_millis() as u32,
        };
    }

    let new_width = width * UPSCALE_FACTOR;
    let new_height = height * UPSCALE_FACTOR;
    let scaled = image::imageops::resize(gray, new_width, new_height, FilterType::CatmullRom);

    let processing_time = start_time.elapsed();
    tracing::debug!(
        target: "ocr_preprocessing",
        "Upscaled {}x{} -> {}x{} in {}ms",
        width,
        height,
        new_width,
        new_height,
        processing_time.as_millis()
    );

    ScaledImageResult {
        image: scaled,
        original_dimensions: (width, height),
        new_dimensions: (new_width, new_height),
        scale_factor: UPSCALE_FACTOR,
        processing_time_ms: processing_time.as_millis() as u32,
    }
}
