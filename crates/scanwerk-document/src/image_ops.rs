// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page image operations — persistence, blank-page detection, and deskew.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::{debug, info, warn};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_jobs::Page;

/// Luminance above which a pixel counts as white.
const WHITE_LUMA: u8 = 240;

/// Sampling stride for blank detection: every 4th pixel in each axis.
const SAMPLE_STRIDE: u32 = 4;

/// Largest skew angle the deskew pass will correct, in degrees.
const MAX_SKEW_DEGREES: f32 = 3.0;

/// Skew below this is noise; the image is left untouched.
const MIN_SKEW_DEGREES: f32 = 0.25;

/// Write each in-memory page to `dir` as `page_0001.png`, `page_0002.png`, …
/// Pages without image data are skipped. Returns (page number, path) pairs
/// in page order.
pub fn save_pages(dir: &Path, pages: &[Page]) -> Result<Vec<(usize, PathBuf)>> {
    let mut saved = Vec::with_capacity(pages.len());

    for page in pages {
        let Some(image) = &page.image else {
            continue;
        };

        let path = dir.join(format!("page_{:04}.png", page.number));
        image.save(&path).map_err(|e| {
            ScanwerkError::Pipeline(format!("save image {}: {e}", path.display()))
        })?;
        saved.push((page.number, path));
    }

    Ok(saved)
}

/// Whether an image is mostly white.
///
/// Samples every 4th pixel in each axis; a pixel is white when its luminance
/// exceeds 240. The page is blank when the white ratio reaches `threshold`.
pub fn is_blank_page(image: &DynamicImage, threshold: f64) -> bool {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return true;
    }

    let mut sampled = 0u64;
    let mut white = 0u64;
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            sampled += 1;
            if gray.get_pixel(x, y).0[0] > WHITE_LUMA {
                white += 1;
            }
            x += SAMPLE_STRIDE;
        }
        y += SAMPLE_STRIDE;
    }

    if sampled == 0 {
        return true;
    }
    white as f64 / sampled as f64 >= threshold
}

/// Drop pages whose white-pixel ratio reaches `threshold`; dropped files are
/// unlinked from disk. A non-positive threshold falls back to 0.99.
pub fn remove_blank_pages(paths: Vec<PathBuf>, threshold: f64) -> Result<Vec<PathBuf>> {
    let threshold = if threshold <= 0.0 { 0.99 } else { threshold };

    let mut kept = Vec::with_capacity(paths.len());
    for path in paths {
        let image = image::open(&path).map_err(|e| {
            ScanwerkError::Pipeline(format!("load image {}: {e}", path.display()))
        })?;

        if is_blank_page(&image, threshold) {
            info!(path = %path.display(), "dropping blank page");
            let _ = std::fs::remove_file(&path);
        } else {
            kept.push(path);
        }
    }

    Ok(kept)
}

/// Straighten tilted scans in place. Pages with no detectable skew are left
/// untouched; per-page failures are logged and skipped.
pub fn deskew_images(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let image = match image::open(path) {
            Ok(image) => image,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "deskew: cannot load image");
                continue;
            }
        };

        if let Some(straightened) = deskew_image(&image) {
            if let Err(e) = straightened.save(path) {
                warn!(path = %path.display(), error = %e, "deskew: cannot save image");
            }
        }
    }
    Ok(())
}

/// Correct a small skew angle. Returns `None` when the page is already
/// straight enough.
pub fn deskew_image(image: &DynamicImage) -> Option<DynamicImage> {
    let angle = estimate_skew_degrees(&analysis_image(image));
    if angle.abs() < MIN_SKEW_DEGREES {
        return None;
    }

    debug!(angle, "deskewing page");
    let rgb = image.to_rgb8();
    let rotated = rotate_about_center(
        &rgb,
        -angle.to_radians(),
        Interpolation::Bilinear,
        image::Rgb([255u8, 255, 255]),
    );
    Some(DynamicImage::ImageRgb8(rotated))
}

/// Downscaled grayscale copy used for skew analysis; keeps the angle sweep
/// cheap on full-resolution scans.
fn analysis_image(image: &DynamicImage) -> GrayImage {
    const TARGET_WIDTH: u32 = 500;
    if image.width() > TARGET_WIDTH {
        let scale = TARGET_WIDTH as f32 / image.width() as f32;
        let height = ((image.height() as f32) * scale).max(1.0) as u32;
        image
            .resize_exact(TARGET_WIDTH, height, image::imageops::FilterType::Triangle)
            .to_luma8()
    } else {
        image.to_luma8()
    }
}

/// Estimate the skew angle via a projection profile sweep.
///
/// For each candidate angle the dark pixels are accumulated into sheared row
/// bins; text lines on a straight page concentrate darkness into few bins,
/// maximizing the variance of the profile. The candidate with the highest
/// variance wins.
fn estimate_skew_degrees(gray: &GrayImage) -> f32 {
    let (width, height) = gray.dimensions();
    if width < 16 || height < 16 {
        return 0.0;
    }

    let mut best_angle = 0.0f32;
    let mut best_score = f64::MIN;

    let mut candidate = -MAX_SKEW_DEGREES;
    while candidate <= MAX_SKEW_DEGREES + f32::EPSILON {
        let score = projection_variance(gray, candidate);
        if score > best_score {
            best_score = score;
            best_angle = candidate;
        }
        candidate += 0.25;
    }

    best_angle
}

fn projection_variance(gray: &GrayImage, angle_degrees: f32) -> f64 {
    let (width, height) = gray.dimensions();
    let tan = angle_degrees.to_radians().tan();

    // Bins cover the sheared row range.
    let max_shift = (width as f32 * tan.abs()).ceil() as i64 + 1;
    let bins = height as i64 + 2 * max_shift;
    let mut profile = vec![0u64; bins as usize];

    for y in 0..height {
        for x in 0..width {
            let luma = gray.get_pixel(x, y).0[0];
            if luma < 128 {
                let shifted = y as i64 + (x as f32 * tan) as i64 + max_shift;
                profile[shifted as usize] += 1;
            }
        }
    }

    let n = profile.len() as f64;
    let mean = profile.iter().sum::<u64>() as f64 / n;
    profile
        .iter()
        .map(|&count| {
            let d = count as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid_image(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value; 3])))
    }

    #[test]
    fn all_white_page_is_blank_at_default_threshold() {
        let white = solid_image(100, 100, 255);
        assert!(is_blank_page(&white, 0.99));
    }

    #[test]
    fn all_black_page_is_not_blank() {
        let black = solid_image(100, 100, 0);
        assert!(!is_blank_page(&black, 0.99));
    }

    #[test]
    fn half_black_page_is_not_blank() {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        for y in 0..50 {
            for x in 0..100 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        assert!(!is_blank_page(&DynamicImage::ImageRgb8(img), 0.99));
    }

    #[test]
    fn threshold_boundary_preserves_and_removes_correctly() {
        // 60% white page: blank at threshold 0.5, kept at threshold 0.7.
        let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        for y in 0..40 {
            for x in 0..100 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let img = DynamicImage::ImageRgb8(img);
        assert!(is_blank_page(&img, 0.5));
        assert!(!is_blank_page(&img, 0.7));
    }

    #[test]
    fn remove_blank_pages_unlinks_dropped_files() {
        let dir = tempfile::tempdir().unwrap();
        let blank_path = dir.path().join("page_0001.png");
        let content_path = dir.path().join("page_0002.png");
        solid_image(64, 64, 255).save(&blank_path).unwrap();
        solid_image(64, 64, 0).save(&content_path).unwrap();

        let kept = remove_blank_pages(vec![blank_path.clone(), content_path.clone()], 0.99)
            .unwrap();

        assert_eq!(kept, vec![content_path.clone()]);
        assert!(!blank_path.exists());
        assert!(content_path.exists());
    }

    #[test]
    fn save_pages_uses_zero_padded_names() {
        let dir = tempfile::tempdir().unwrap();
        let pages = vec![
            Page::scanned(1, solid_image(32, 32, 128)),
            Page::scanned(2, solid_image(32, 32, 128)),
        ];

        let saved = save_pages(dir.path(), &pages).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved[0].1.ends_with("page_0001.png"));
        assert!(saved[1].1.ends_with("page_0002.png"));
        assert!(saved[0].1.exists());
    }

    #[test]
    fn save_pages_skips_imageless_pages() {
        let dir = tempfile::tempdir().unwrap();
        let pages = vec![Page {
            number: 1,
            ..Default::default()
        }];
        let saved = save_pages(dir.path(), &pages).unwrap();
        assert!(saved.is_empty());
    }

    #[test]
    fn straight_page_is_not_rotated() {
        // Horizontal black stripes on white, perfectly level.
        let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        for stripe in 0..5 {
            let y0 = 30 + stripe * 50;
            for y in y0..y0 + 6 {
                for x in 20..380 {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        assert!(deskew_image(&DynamicImage::ImageRgb8(img)).is_none());
    }

    #[test]
    fn tilted_stripes_are_detected_and_rotated() {
        // The same stripes sheared by ~2 degrees.
        let tilt = 2.0f32.to_radians().tan();
        let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        for stripe in 0..5 {
            let y0 = 30 + stripe * 50;
            for x in 20..380u32 {
                let shift = (x as f32 * tilt) as u32;
                for dy in 0..6 {
                    let y = y0 + dy + shift;
                    if y < 300 {
                        img.put_pixel(x, y, Rgb([0, 0, 0]));
                    }
                }
            }
        }
        let straightened = deskew_image(&DynamicImage::ImageRgb8(img));
        assert!(straightened.is_some());
    }
}
