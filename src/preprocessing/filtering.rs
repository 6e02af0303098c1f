//! # Image Filtering Module
//!
//! Noise reduction ahead of thresholding. The blur uses the fixed 3-tap
//! Gaussian kernel `[1, 2, 1] / 4` in both directions with replicated borders.

use image::{GrayImage, Luma};
use tracing;

use super::types::DenoisedImageResult;

/// Applies a 3x3 Gaussian blur to a grayscale image.
///
/// The kernel is separable, so the image is filtered horizontally and then
/// vertically using integer arithmetic. Edge pixels are extended outward.
///
/// # Examples
///
/// ```
/// use image::{GrayImage, Luma};
/// use receipt_ledger::preprocessing::gaussian_blur_3x3;
///
/// let img = GrayImage::from_pixel(8, 8, Luma([90u8]));
/// let blurred = gaussian_blur_3x3(&img);
/// assert_eq!(blurred.image.get_pixel(4, 4)[0], 90);
/// ```
pub fn gaussian_blur_3x3(gray: &GrayImage) -> DenoisedImageResult {
    let start_time = std::time::Instant::now();
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let src = gray.as_raw();

    // Horizontal pass, values scaled by 4
    let mut horizontal = vec![0u16; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let left = row[x.saturating_sub(1)] as u16;
            let center = row[x] as u16;
            let right = row[(x + 1).min(w - 1)] as u16;
            horizontal[y * w + x] = left + 2 * center + right;
        }
    }

    // Vertical pass, values scaled by 16 before rounding back down
    let mut output = GrayImage::new(width, height);
    for y in 0..h {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(h - 1);
        for x in 0..w {
            let sum = horizontal[up * w + x] + 2 * horizontal[y * w + x] + horizontal[down * w + x];
            output.put_pixel(x as u32, y as u32, Luma([((sum + 8) >> 4) as u8]));
        }
    }

    let processing_time = start_time.elapsed();
    tracing::debug!(
        target: "ocr_preprocessing",
        "Gaussian blur 3x3 completed in {}ms for {}x{}",
        processing_time.as_millis(),
        width,
        height
    );

    DenoisedImageResult {
        image: output,
        kernel_size: 3,
        processing_time_ms: processing_time.as_millis() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blur_preserves_dimensions() {
        let img = GrayImage::new(17, 5);
        let result = gaussian_blur_3x3(&img);
        assert_eq!(result.image.dimensions(), (17, 5));
        assert_eq!(result.kernel_size, 3);
    }

    #[test]
    fn test_blur_spreads_single_dot() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([0u8]));
        img.put_pixel(2, 2, Luma([160u8]));
        let result = gaussian_blur_3x3(&img).image;

        // Center keeps 4/16, edge neighbours 2/16, corners 1/16
        assert_eq!(result.get_pixel(2, 2)[0], 40);
        assert_eq!(result.get_pixel(1, 2)[0], 20);
        assert_eq!(result.get_pixel(1, 1)[0], 10);
        assert_eq!(result.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_blur_handles_single_pixel_image() {
        let img = GrayImage::from_pixel(1, 1, Luma([77u8]));
        assert_eq!(gaussian_blur_3x3(&img).image.get_pixel(0, 0)[0], 77);
    }
}
