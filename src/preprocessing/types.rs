//! # Shared Types for Image Preprocessing
//!
//! This module contains the shared types, structs, and enums used across
//! the preprocessing sub-modules.

use image::GrayImage;

/// Errors that can occur during image preprocessing operations.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessingError {
    /// Failed to load or decode image
    ImageLoad { message: String },
    /// Invalid parameter passed to an operation
    InvalidParameter { message: String },
    /// Image processing operation failed
    ProcessingFailed { message: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::ImageLoad { message } => {
                write!(f, "Failed to load image: {}", message)
            }
            PreprocessingError::InvalidParameter { message } => {
                write!(f, "Invalid preprocessing parameter: {}", message)
            }
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

/// Result of an OCR-oriented upscaling step.
#[derive(Debug, Clone)]
pub struct ScaledImageResult {
    /// The (possibly) scaled image
    pub image: GrayImage,
    /// Original image dimensions (width, height)
    pub original_dimensions: (u32, u32),
    /// New image dimensions (width, height)
    pub new_dimensions: (u32, u32),
    /// Integer scale factor applied (1 or 2)
    pub scale_factor: u32,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of image noise reduction operation.
#[derive(Debug, Clone)]
pub struct DenoisedImageResult {
    /// The blurred image
    pub image: GrayImage,
    /// Kernel size used (e.g., 3 for 3x3 kernel)
    pub kernel_size: u32,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of adaptive thresholding.
#[derive(Debug, Clone)]
pub struct ThresholdedImageResult {
    /// The binary image (0 or 255)
    pub image: GrayImage,
    /// Neighbourhood size used for the local mean
    pub block_size: u32,
    /// Constant subtracted from the local mean
    pub offset: i32,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of skew detection and correction.
#[derive(Debug, Clone)]
pub struct DeskewResult {
    /// The rotated image
    pub image: GrayImage,
    /// Rotation applied, in degrees, counter-clockwise positive
    pub skew_angle_degrees: f32,
    /// Number of foreground pixels the angle was estimated from
    pub foreground_pixels: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Output of the full normalization pipeline, ready for recognition.
#[derive(Debug, Clone)]
pub struct NormalizedRaster {
    /// Single-channel binary raster
    pub image: GrayImage,
    /// Decoded image dimensions (width, height)
    pub original_dimensions: (u32, u32),
    /// Integer scale factor applied (1 or 2)
    pub scale_factor: u32,
    /// Deskew rotation applied, in degrees
    pub skew_angle_degrees: f32,
    /// Total processing time in milliseconds
    pub processing_time_ms: u32,
}

impl NormalizedRaster {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
