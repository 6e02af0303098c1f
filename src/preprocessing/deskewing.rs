//! # Image Deskewing Module
//!
//! This module detects and corrects rotation of a binarized receipt.
//!
//! The skew estimate comes from the minimum-area rectangle enclosing every
//! foreground (non-white) pixel. The rectangle's angle is reported in
//! `(-90°, 0°]` and folded into `(-45°, 45°]` before the raster is rotated
//! about its centre.

use image::{GrayImage, Luma};
use tracing;

use super::types::DeskewResult;

/// Detects and corrects skew in a binarized image.
///
/// Foreground pixels are those with a value below 255. When none exist the
/// image is returned unchanged with an angle of 0.
///
/// # Examples
///
/// ```
/// use image::{GrayImage, Luma};
/// use receipt_ledger::preprocessing::deskew_image;
///
/// let blank = GrayImage::from_pixel(50, 50, Luma([255u8]));
/// let result = deskew_image(&blank);
/// assert_eq!(result.skew_angle_degrees, 0.0);
/// assert_eq!(result.foreground_pixels, 0);
/// ```
pub fn deskew_image(binary: &GrayImage) -> DeskewResult {
    let start_time = std::time::Instant::now();

    let (points, foreground_pixels) = foreground_row_extremes(binary);
    if foreground_pixels == 0 {
        tracing::debug!(
            target: "ocr_preprocessing",
            "No foreground pixels found, skipping deskew"
        );
        return DeskewResult {
            image: binary.clone(),
            skew_angle_degrees: 0.0,
            foreground_pixels,
            processing_time_ms: start_time.elapsed().as_millis() as u32,
        };
    }

    let rect_angle = min_area_rect_angle(&points);
    let angle = fold_rect_angle(rect_angle);
    let rotated = if angle == 0.0 {
        binary.clone()
    } else {
        rotate_about_center(binary, angle)
    };

    let processing_time = start_time.elapsed();
    tracing::debug!(
        target: "ocr_preprocessing",
        "Deskew completed in {}ms: rect_angle={:.2}°, applied={:.2}°, foreground_pixels={}",
        processing_time.as_millis(),
        rect_angle,
        angle,
        foreground_pixels
    );

    DeskewResult {
        image: rotated,
        skew_angle_degrees: angle as f32,
        foreground_pixels,
        processing_time_ms: processing_time.as_millis() as u32,
    }
}

/// Leftmost and rightmost foreground pixel of every row, plus the total count.
///
/// The convex hull of these points equals the hull of all foreground pixels.
fn foreground_row_extremes(binary: &GrayImage) -> (Vec<(f64, f64)>, usize) {
    let (width, _) = binary.dimensions();
    let mut points = Vec::new();
    let mut count = 0usize;

    for (y, row) in binary.as_raw().chunks(width.max(1) as usize).enumerate() {
        let mut first = None;
        let mut last = None;
        for (x, value) in row.iter().enumerate() {
            if *value < 255 {
                count += 1;
                if first.is_none() {
                    first = Some(x);
                }
                last = Some(x);
            }
        }
        if let (Some(first), Some(last)) = (first, last) {
            points.push((first as f64, y as f64));
            if last != first {
                points.push((last as f64, y as f64));
            }
        }
    }

    (points, count)
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Monotone chain convex hull, counter-clockwise without repeated endpoints
fn convex_hull(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut lower: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], *p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], *p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Angle of the minimum-area enclosing rectangle, in `(-90, 0]` degrees.
///
/// Uses rotating calipers: one side of the optimal rectangle is collinear
/// with a hull edge, so every edge direction is tried.
fn min_area_rect_angle(points: &[(f64, f64)]) -> f64 {
    let hull = convex_hull(points.to_vec());
    if hull.len() < 2 {
        return 0.0;
    }

    let mut best_area = f64::INFINITY;
    let mut best_direction = 0.0f64;
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0.0 {
            continue;
        }
        let (ux, uy) = (dx / length, dy / length);

        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in &hull {
            let u = p.0 * ux + p.1 * uy;
            let v = -p.0 * uy + p.1 * ux;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if area < best_area {
            best_area = area;
            best_direction = dy.atan2(dx).to_degrees();
        }
    }

    let folded = best_direction.rem_euclid(90.0);
    if folded == 0.0 {
        0.0
    } else {
        -folded
    }
}

/// Fold a rectangle angle from `(-90, 0]` into a correction in `(-45, 45]`
pub fn fold_rect_angle(rect_angle: f64) -> f64 {
    if rect_angle < -45.0 {
        -(90.0 + rect_angle)
    } else {
        -rect_angle
    }
}

/// Rotate counter-clockwise by `angle_degrees` about the image centre.
///
/// Nearest-neighbour sampling keeps the raster binary; out-of-bounds samples
/// replicate the nearest edge pixel. Dimensions are unchanged.
pub fn rotate_about_center(image: &GrayImage, angle_degrees: f64) -> GrayImage {
    let (width, height) = image.dimensions();
    let cx = (width / 2) as f64;
    let cy = (height / 2) as f64;
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let max_x = width.saturating_sub(1) as f64;
    let max_y = height.saturating_sub(1) as f64;

    let mut output = GrayImage::new(width, height);
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = (cos * dx - sin * dy + cx).round().clamp(0.0, max_x) as u32;
        let sy = (sin * dx + cos * dy + cy).round().clamp(0.0, max_y) as u32;
        *pixel = Luma([image.get_pixel(sx, sy)[0]]);
    }
    output
}
