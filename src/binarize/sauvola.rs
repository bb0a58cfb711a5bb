use rayon::prelude::*;

use crate::binarize::SAUVOLA_R;
use crate::image2d::{BitImage2, GrayImage2, Image2D};
use crate::integral::IntegralImage;

// ── Sauvola adaptive threshold ────────────────────────────────────────────
//
// t(p) = m(p) · (1 + K · (σ(p)/R − 1))
//
// where m and σ are the mean and standard deviation of the window of side
// `win` centered at p, clipped to the image. Thresholds adapt to local
// background variations (gradients, glare, uneven ink) that a global cut
// would miss. Ink is darker than its surround, so foreground iff I(p) < t.

/// The point formula alone, exposed for the multi-scale variant and tests.
#[inline]
pub fn sauvola_threshold_formula(mean: f64, stddev: f64, k: f64, r: f64) -> f64 {
    mean * (1.0 + k * (stddev / r - 1.0))
}

/// Single-scale Sauvola binarization. `win` is the window side (odd);
/// windows are clipped at the borders, so images smaller than `win` are
/// accepted. A uniform image has σ = 0 everywhere and comes out
/// all-background.
pub fn sauvola(img: &GrayImage2, win: usize, k: f64) -> BitImage2 {
    let h = img.nrows();
    let w = img.ncols();
    let mut out: BitImage2 = Image2D::new(h, w);
    if h == 0 || w == 0 {
        return out;
    }

    let integral = IntegralImage::build(img);
    let half = (win / 2) as i64;

    out.rows_mut()
        .enumerate()
        .collect::<Vec<_>>()
        .into_par_iter()
        .for_each(|(r, dst)| {
            let src = img.row(r);
            let r = r as i64;
            for (c, &px) in src.iter().enumerate() {
                let ci = c as i64;
                let (mean, stddev) =
                    integral.mean_stddev(r - half, ci - half, r + half, ci + half);
                let t = sauvola_threshold_formula(mean, stddev, k, SAUVOLA_R);
                dst[c] = (px as f64) < t;
            }
        });

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binarize::DEFAULT_SAUVOLA_K;

    #[test]
    fn threshold_formula_reference_values() {
        // m=100, σ=20, K=0.34, R=128 → t ≈ 71.09
        let t = sauvola_threshold_formula(100.0, 20.0, 0.34, 128.0);
        assert!((t - 71.09375).abs() < 1e-9);
        // pixel 60 is ink, pixel 80 is background
        assert!(60.0 < t);
        assert!(80.0 >= t);
    }

    #[test]
    fn uniform_image_is_all_background() {
        let img: GrayImage2 = Image2D::filled(100, 100, 200u8);
        let mask = sauvola(&img, 101, DEFAULT_SAUVOLA_K);
        assert_eq!(mask.count_foreground(), 0);
    }

    #[test]
    fn dark_bar_on_bright_field_is_foreground() {
        let mut img: GrayImage2 = Image2D::filled(60, 60, 230u8);
        for r in 20..30 {
            for c in 10..50 {
                img.set(r, c, 20);
            }
        }
        let mask = sauvola(&img, 31, DEFAULT_SAUVOLA_K);
        assert!(mask.at(25, 30));
        assert!(!mask.at(5, 5));
        // every ink pixel is recovered
        for r in 21..29 {
            for c in 11..49 {
                assert!(mask.at(r, c), "({r}, {c}) lost");
            }
        }
    }

    #[test]
    fn image_smaller_than_window_is_accepted() {
        let mut img: GrayImage2 = Image2D::filled(8, 8, 220u8);
        img.set(4, 4, 10);
        let mask = sauvola(&img, 101, DEFAULT_SAUVOLA_K);
        assert!(mask.at(4, 4));
        assert!(!mask.at(0, 0));
    }
}
