//! # Image Thresholding Module
//!
//! This module provides adaptive binary thresholding for OCR preprocessing.
//! Receipts are often lit unevenly, so each pixel is compared against a
//! Gaussian-weighted mean of its own neighbourhood instead of a single global
//! threshold.

use image::{GrayImage, Luma};
use tracing;

use super::types::{PreprocessingError, ThresholdedImageResult};

/// Neighbourhood size used by the receipt pipeline
pub const DEFAULT_BLOCK_SIZE: u32 = 31;

/// Constant subtracted from the local mean by the receipt pipeline
pub const DEFAULT_OFFSET: i32 = 10;

/// Applies adaptive Gaussian thresholding.
///
/// For each pixel the threshold is the Gaussian-weighted mean of its
/// `block_size` x `block_size` neighbourhood minus `offset`. Pixels strictly
/// above the threshold become 255, all others 0. Borders are replicated.
///
/// # Arguments
///
/// * `gray` - The input grayscale image
/// * `block_size` - Odd neighbourhood size, at least 3
/// * `offset` - Constant subtracted from the weighted mean
///
/// # Examples
///
/// ```
/// use image::{GrayImage, Luma};
/// use receipt_ledger::preprocessing::apply_adaptive_threshold;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let img = GrayImage::from_pixel(40, 40, Luma([128u8]));
/// let result = apply_adaptive_threshold(&img, 31, 10)?;
/// // A flat image sits above its own mean minus the offset
/// assert!(result.image.pixels().all(|p| p[0] == 255));
/// # Ok(())
/// # }
/// ```
pub fn apply_adaptive_threshold(
    gray: &GrayImage,
    block_size: u32,
    offset: i32,
) -> Result<ThresholdedImageResult, PreprocessingError> {
    if block_size < 3 || block_size % 2 == 0 {
        return Err(PreprocessingError::InvalidParameter {
            message: format!("block size must be odd and >= 3, got {}", block_size),
        });
    }

    let start_time = std::time::Instant::now();
    let (width, height) = gray.dimensions();
    let kernel = gaussian_kernel(block_size as usize);
    let means = gaussian_mean(gray, &kernel);

    let mut binary = GrayImage::new(width, height);
    for (index, (pixel, mean)) in gray.as_raw().iter().zip(means.iter()).enumerate() {
        let local_mean = mean.round().clamp(0.0, 255.0) as i32;
        let value = if (*pixel as i32) - local_mean > -offset {
            255u8
        } else {
            0u8
        };
        let x = (index % width as usize) as u32;
        let y = (index / width as usize) as u32;
        binary.put_pixel(x, y, Luma([value]));
    }

    let processing_time = start_time.elapsed();
    tracing::debug!(
        target: "ocr_preprocessing",
        "Adaptive threshold completed in {}ms: block_size={}, offset={}, dimensions={}x{}",
        processing_time.as_millis(),
        block_size,
        offset,
        width,
        height
    );

    Ok(ThresholdedImageResult {
        image: binary,
        block_size,
        offset,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Normalized 1-D Gaussian kernel with the sigma OpenCV derives from the size
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let radius = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - radius;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / total) as f32).collect()
}

/// Separable Gaussian-weighted mean with replicated borders
fn gaussian_mean(gray: &GrayImage, kernel: &[f32]) -> Vec<f32> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let radius = (kernel.len() / 2) as isize;
    let src = gray.as_raw();

    let clamp = |value: isize, len: usize| value.clamp(0, len as isize - 1) as usize;

    let mut horizontal = vec![0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = clamp(x as isize + k as isize - radius, w);
                acc += weight * row[sx] as f32;
            }
            horizontal[y * w + x] = acc;
        }
    }

    let mut vertical = vec![0f32; w * h];
    for y in 0..h {
        for (k, weight) in kernel.iter().enumerate() {
            let sy = clamp(y as isize + k as isize - radius, h);
            let src_row = &horizontal[sy * w..(sy + 1) * w];
            let dst_row = &mut vertical[y * w..(y + 1) * w];
            for (dst, value) in dst_row.iter_mut().zip(src_row.iter()) {
                *dst += weight * value;
            }
        }
    }

    vertical
}
