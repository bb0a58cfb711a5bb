use image::imageops::FilterType;
use image::{Luma, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

use crate::image2d::{GrayImage2, Image2D};

// ── Preprocessing ─────────────────────────────────────────────────────────
//
// Everything that happens to the document before binarization: grayscale
// conversion, optional antialiased subsampling of oversized scans,
// optional background/foreground split, optional deskew.

/// ITU-R 601 luma with integer rounding.
pub fn grayscale(rgb: &RgbImage) -> GrayImage2 {
    let h = rgb.height() as usize;
    let w = rgb.width() as usize;
    let data = rgb
        .as_raw()
        .chunks_exact(3)
        .map(|p| {
            let v = 299 * p[0] as u32 + 587 * p[1] as u32 + 114 * p[2] as u32;
            ((v + 500) / 1000) as u8
        })
        .collect();
    Image2D::from_vec(h, w, data)
}

/// Subsampling factor for oversized scans: 2:1 for pages between 2500 and
/// 5000 pixels on both sides, 3:1 above 5000, otherwise untouched.
pub fn find_best_scale(nrows: usize, ncols: usize) -> u32 {
    if nrows > 5000 && ncols > 5000 {
        return 3;
    }
    if nrows > 2500 && nrows < 5000 && ncols > 2500 && ncols < 5000 {
        return 2;
    }
    1
}

/// Antialiased downscale by an integer factor.
pub fn subsample(rgb: &RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return rgb.clone();
    }
    let w = (rgb.width() / factor).max(1);
    let h = (rgb.height() / factor).max(1);
    image::imageops::resize(rgb, w, h, FilterType::Lanczos3)
}

// ── Background / foreground split ─────────────────────────────────────────

/// Gray-level margin below the estimated background that counts as ink.
const FG_MARGIN: u8 = 20;

/// Split a grayscale page into an estimated background and the foreground
/// objects composited over white.
///
/// The background is a grayscale closing (sliding max, then min) with a
/// square window whose side is `√lambda`; dark objects smaller than the
/// window vanish into it. `lambda` is the maximum plausible foreground
/// object area — callers default it to `1.2 · (H + W)`.
pub fn split_bg_fg(gray: &GrayImage2, lambda: usize) -> (GrayImage2, GrayImage2) {
    let radius = ((lambda as f64).sqrt() as usize / 2).max(1);
    let dilated = sliding_box(gray, radius, true);
    let bg = sliding_box(&dilated, radius, false);

    let mut fg: GrayImage2 = Image2D::filled(gray.nrows(), gray.ncols(), 255u8);
    for r in 0..gray.nrows() {
        let src = gray.row(r);
        let est = bg.row(r);
        let dst = fg.row_mut(r);
        for c in 0..src.len() {
            if src[c].saturating_add(FG_MARGIN) < est[c] {
                dst[c] = src[c];
            }
        }
    }
    (bg, fg)
}

/// Separable box dilation (`max = true`) or erosion over a window of
/// half-side `radius`, van Herk style with a monotonic deque.
fn sliding_box(img: &GrayImage2, radius: usize, max: bool) -> GrayImage2 {
    let h = img.nrows();
    let w = img.ncols();
    let mut tmp: GrayImage2 = Image2D::new(h, w);
    let mut buf = vec![0u8; w.max(h)];

    for r in 0..h {
        sliding_extreme(img.row(r), radius, max, &mut buf[..w]);
        tmp.row_mut(r).copy_from_slice(&buf[..w]);
    }

    let mut out: GrayImage2 = Image2D::new(h, w);
    let mut column = vec![0u8; h];
    for c in 0..w {
        for r in 0..h {
            column[r] = tmp.at(r, c);
        }
        sliding_extreme(&column, radius, max, &mut buf[..h]);
        for r in 0..h {
            out.set(r, c, buf[r]);
        }
    }
    out
}

fn sliding_extreme(src: &[u8], radius: usize, max: bool, dst: &mut [u8]) {
    let n = src.len();
    let mut deque: std::collections::VecDeque<usize> = std::collections::VecDeque::new();
    let better = |a: u8, b: u8| if max { a >= b } else { a <= b };

    for i in 0..n.min(radius) {
        while deque.back().is_some_and(|&b| better(src[i], src[b])) {
            deque.pop_back();
        }
        deque.push_back(i);
    }
    for i in 0..n {
        let incoming = i + radius;
        if incoming < n {
            while deque.back().is_some_and(|&b| better(src[incoming], src[b])) {
                deque.pop_back();
            }
            deque.push_back(incoming);
        }
        while deque.front().is_some_and(|&f| f + radius < i) {
            deque.pop_front();
        }
        dst[i] = src[*deque.front().expect("window never empty")];
    }
}

// ── Deskew ────────────────────────────────────────────────────────────────

/// Half-range of the skew search, degrees.
const SKEW_RANGE_DEG: f64 = 5.0;
/// Angular step of the search, degrees.
const SKEW_STEP_DEG: f64 = 0.1;
/// Row/column stride when accumulating projection profiles.
const SKEW_STRIDE: usize = 4;

/// Estimate the page skew in degrees by maximizing the variance of the
/// sheared row-projection profile of dark pixels.
pub fn estimate_skew(gray: &GrayImage2) -> f64 {
    let h = gray.nrows();
    let w = gray.ncols();
    if h < 2 || w < 2 {
        return 0.0;
    }

    let mut best = (f64::MIN, 0.0);
    let steps = (2.0 * SKEW_RANGE_DEG / SKEW_STEP_DEG).round() as i32;
    for step in 0..=steps {
        let angle = -SKEW_RANGE_DEG + step as f64 * SKEW_STEP_DEG;
        let tan = angle.to_radians().tan();

        let mut profile = vec![0u64; h + w];
        for r in (0..h).step_by(SKEW_STRIDE) {
            let row = gray.row(r);
            for c in (0..w).step_by(SKEW_STRIDE) {
                let darkness = 255u64.saturating_sub(row[c] as u64);
                if darkness == 0 {
                    continue;
                }
                let projected = r as f64 - c as f64 * tan + w as f64;
                let bucket = (projected.round() as i64).clamp(0, (h + w) as i64 - 1) as usize;
                profile[bucket] += darkness;
            }
        }

        let score = profile.iter().map(|&v| (v * v) as f64).sum::<f64>();
        if score > best.0 {
            best = (score, angle);
        }
    }
    best.1
}

/// Rotate the page by the estimated skew. White fills the corners.
pub fn deskew(gray: &GrayImage2) -> GrayImage2 {
    let angle = estimate_skew(gray);
    if angle.abs() < SKEW_STEP_DEG {
        return gray.clone();
    }
    let rotated = rotate_about_center(
        &gray.to_gray(),
        (-angle).to_radians() as f32,
        Interpolation::Bilinear,
        Luma([255u8]),
    );
    GrayImage2::from_gray(&rotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn grayscale_follows_601_luma() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([10, 200, 30]));
        let gray = grayscale(&rgb);
        assert_eq!(gray.at(0, 0), 76); // 0.299 · 255
        assert_eq!(gray.at(0, 1), 124); // 2.99 + 117.4 + 3.42 ≈ 123.8
    }

    #[test]
    fn scale_gates_follow_page_size() {
        assert_eq!(find_best_scale(1000, 1000), 1);
        assert_eq!(find_best_scale(3000, 3000), 2);
        assert_eq!(find_best_scale(3000, 1000), 1);
        assert_eq!(find_best_scale(6000, 6000), 3);
        assert_eq!(find_best_scale(6000, 3000), 1);
    }

    #[test]
    fn subsample_halves_dimensions() {
        let rgb = RgbImage::from_pixel(100, 60, Rgb([128, 128, 128]));
        let out = subsample(&rgb, 2);
        assert_eq!((out.width(), out.height()), (50, 30));
    }

    #[test]
    fn split_bg_fg_lifts_small_ink_off_the_page() {
        let mut gray: GrayImage2 = Image2D::filled(80, 80, 200u8);
        for r in 40..44 {
            for c in 10..30 {
                gray.set(r, c, 20);
            }
        }
        let (bg, fg) = split_bg_fg(&gray, 1600); // window side 40
        // the closing swallowed the thin dark bar
        assert_eq!(bg.at(42, 20), 200);
        // foreground keeps the ink over white
        assert_eq!(fg.at(42, 20), 20);
        assert_eq!(fg.at(10, 10), 255);
    }

    #[test]
    fn estimate_skew_of_level_text_is_zero() {
        let mut gray: GrayImage2 = Image2D::filled(120, 200, 255u8);
        for &top in &[20, 50, 80] {
            for r in top..top + 6 {
                for c in 20..180 {
                    gray.set(r, c, 0);
                }
            }
        }
        assert!(estimate_skew(&gray).abs() < 1e-9);
    }

    #[test]
    fn estimate_skew_recovers_a_sheared_page() {
        // Bars drawn along a 2° slope.
        let mut gray: GrayImage2 = Image2D::filled(200, 300, 255u8);
        let tan = 2.0f64.to_radians().tan();
        for &base in &[40, 90, 140] {
            for c in 10..290 {
                let r = base as f64 + c as f64 * tan;
                for dr in 0..5 {
                    let rr = r as usize + dr;
                    if rr < 200 {
                        gray.set(rr, c, 0);
                    }
                }
            }
        }
        let estimate = estimate_skew(&gray);
        assert!((estimate - 2.0).abs() < 0.5, "estimated {estimate}");
    }
}
