//! # Image Preprocessing Module
//!
//! This module turns an uploaded receipt photo into a binary raster suited to
//! text recognition.
//!
//! The module is organized into focused sub-modules:
//! - `scaling`: 2x upscaling of small images
//! - `filtering`: 3x3 Gaussian noise reduction
//! - `thresholding`: adaptive Gaussian binarization
//! - `deskewing`: rotation detection and correction
//! - `types`: Shared types and error definitions

pub mod deskewing;
pub mod filtering;
pub mod scaling;
pub mod thresholding;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use types::{
    DenoisedImageResult, DeskewResult, NormalizedRaster, PreprocessingError, ScaledImageResult,
    ThresholdedImageResult,
};

pub use deskewing::deskew_image;
pub use filtering::gaussian_blur_3x3;
pub use scaling::upscale_for_ocr;
pub use thresholding::apply_adaptive_threshold;

/// Decode receipt bytes and run the full normalization pipeline.
///
/// Steps, in order: grayscale, conditional 2x upscale, 3x3 Gaussian blur,
/// adaptive Gaussian threshold (block 31, offset 10), deskew.
///
/// # Errors
///
/// Returns `PreprocessingError::ImageLoad` when the bytes are not a decodable
/// image.
pub fn normalize_receipt_image(bytes: &[u8]) -> Result<NormalizedRaster, PreprocessingError> {
    let start_time = std::time::Instant::now();

    let decoded = image::load_from_memory(bytes).map_err(|e| PreprocessingError::ImageLoad {
        message: e.to_string(),
    })?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(PreprocessingError::ImageLoad {
            message: "image has zero width or height".to_string(),
        });
    }

    normalize_gray(decoded.to_luma8(), start_time)
}

/// Run the normalization steps on an already decoded image.
pub fn normalize_decoded(image: &image::DynamicImage) -> Result<NormalizedRaster, PreprocessingError> {
    normalize_gray(image.to_luma8(), std::time::Instant::now())
}

fn normalize_gray(
    gray: image::GrayImage,
    start_time: std::time::Instant,
) -> Result<NormalizedRaster, PreprocessingError> {
    let original_dimensions = gray.dimensions();

    let scaled = upscale_for_ocr(&gray);
    let blurred = gaussian_blur_3x3(&scaled.image);
    let thresholded = apply_adaptive_threshold(
        &blurred.image,
        thresholding::DEFAULT_BLOCK_SIZE,
        thresholding::DEFAULT_OFFSET,
    )?;
    let deskewed = deskew_image(&thresholded.image);

    let processing_time = start_time.elapsed();
    tracing::debug!(
        target: "ocr_preprocessing",
        "Receipt normalized in {}ms: {}x{} -> {}x{}, scale={}, skew={:.2}°",
        processing_time.as_millis(),
        original_dimensions.0,
        original_dimensions.1,
        deskewed.image.width(),
        deskewed.image.height(),
        scaled.scale_factor,
        deskewed.skew_angle_degrees
    );

    Ok(NormalizedRaster {
        image: deskewed.image,
        original_dimensions,
        scale_factor: scaled.scale_factor,
        skew_angle_degrees: deskewed.skew_angle_degrees,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}
