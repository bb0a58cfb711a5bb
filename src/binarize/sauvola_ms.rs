use rayon::prelude::*;

use crate::binarize::sauvola::sauvola;
use crate::components::{ComponentSet, Connectivity};
use crate::image2d::{BitImage2, GrayImage2, Image2D};

// ── Multi-scale Sauvola ───────────────────────────────────────────────────
//
// Single-scale Sauvola hollows out strokes thicker than its window: deep
// inside a thick stroke the window is uniform ink, σ collapses and the
// threshold drops below the ink value. The multi-scale variant binarizes
// an antialiased 2:1 pyramid at every level and, per full-resolution
// pixel, adopts the decision of the level whose object scale best matches
// the local stroke width. Fine ink keeps the fine decision; thick strokes
// are recovered from the coarser levels.

/// Multi-scale Sauvola binarization over `depth` pyramid levels.
///
/// Levels that would degenerate (a side below 2 pixels) are not built, so
/// tiny inputs fall back to fewer scales, ultimately to plain Sauvola.
pub fn sauvola_ms(img: &GrayImage2, win: usize, depth: usize, k: f64) -> BitImage2 {
    let h = img.nrows();
    let w = img.ncols();
    if h == 0 || w == 0 {
        return Image2D::new(h, w);
    }

    // Pyramid: level 0 is the input, each next a 2:1 antialiased subsample.
    // Eight levels is a 256:1 reduction, far past any useful text scale.
    let depth = depth.clamp(1, 8);
    let mut levels: Vec<GrayImage2> = vec![img.clone()];
    for _ in 1..depth {
        let next = {
            let prev = levels.last().expect("level 0 present");
            if prev.nrows() < 2 || prev.ncols() < 2 {
                break;
            }
            subsample_antialiased(prev)
        };
        levels.push(next);
    }

    let masks: Vec<BitImage2> = levels.par_iter().map(|level| sauvola(level, win, k)).collect();
    if masks.len() == 1 {
        return masks.into_iter().next().expect("one mask");
    }

    // Object-scale map per level: each component's shorter bbox side,
    // expressed in full-resolution pixels, propagated over its pixels.
    let scale_maps: Vec<Image2D<u32>> = masks
        .par_iter()
        .enumerate()
        .map(|(level, mask)| object_scale_map(mask, level))
        .collect();

    let strokes = stroke_width_map(&masks[0]);

    let mut out: BitImage2 = Image2D::new(h, w);
    for r in 0..h {
        let dst = out.row_mut(r);
        for (c, slot) in dst.iter_mut().enumerate() {
            *slot = match arbitrate(&scale_maps, &strokes, r, c) {
                Some(level) => {
                    let mask = &masks[level];
                    let rl = (r >> level).min(mask.nrows() - 1);
                    let cl = (c >> level).min(mask.ncols() - 1);
                    mask.at(rl, cl)
                }
                None => false,
            };
        }
    }
    out
}

/// Pick the level whose object scale sits closest to the local stroke
/// width; ties break toward the finer scale. Levels with no object under
/// the pixel do not compete; `None` means every level decided background.
fn arbitrate(scale_maps: &[Image2D<u32>], strokes: &Image2D<u32>, r: usize, c: usize) -> Option<usize> {
    // Candidate levels, finest first.
    let mut candidates: [(u32, usize); 8] = [(0, 0); 8];
    let mut n = 0;
    for (level, map) in scale_maps.iter().enumerate() {
        let rl = (r >> level).min(map.nrows() - 1);
        let cl = (c >> level).min(map.ncols() - 1);
        let os = map.at(rl, cl);
        if os != 0 {
            candidates[n] = (os, level);
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }

    // Glyph bodies run near four stroke widths; where the finest mask has
    // no stroke under the pixel, trust the finest level that sees an
    // object at all.
    let sw = strokes.at(r, c);
    let target = if sw > 0 { sw * 4 } else { candidates[0].0 };

    let mut best = u32::MAX;
    let mut winner = candidates[0].1;
    for &(os, level) in &candidates[..n] {
        let dist = os.abs_diff(target);
        if dist < best {
            best = dist;
            winner = level;
        }
    }
    Some(winner)
}

/// 2:1 subsample with a 3×3 binomial kernel centered on every other input
/// pixel. Border taps falling outside are dropped and the kernel weight
/// renormalized.
pub fn subsample_antialiased(img: &GrayImage2) -> GrayImage2 {
    const KERNEL: [[u32; 3]; 3] = [[1, 2, 1], [2, 4, 2], [1, 2, 1]];
    let h = img.nrows();
    let w = img.ncols();
    let oh = h.div_ceil(2);
    let ow = w.div_ceil(2);
    let mut out: GrayImage2 = Image2D::new(oh, ow);

    for or in 0..oh {
        let dst = out.row_mut(or);
        for (oc, slot) in dst.iter_mut().enumerate() {
            let cr = (or * 2) as i64;
            let cc = (oc * 2) as i64;
            let mut acc = 0u32;
            let mut weight = 0u32;
            for (kr, kernel_row) in KERNEL.iter().enumerate() {
                for (kc, &kw) in kernel_row.iter().enumerate() {
                    if let Some(v) = img.try_at(cr + kr as i64 - 1, cc + kc as i64 - 1) {
                        acc += kw * v as u32;
                        weight += kw;
                    }
                }
            }
            *slot = ((acc + weight / 2) / weight) as u8;
        }
    }
    out
}

/// Per-pixel stroke width of a mask: the shorter of the horizontal and
/// vertical foreground run lengths through the pixel; 0 on background.
fn stroke_width_map(mask: &BitImage2) -> Image2D<u32> {
    let h = mask.nrows();
    let w = mask.ncols();
    let mut hruns: Image2D<u32> = Image2D::new(h, w);

    for r in 0..h {
        let src = mask.row(r);
        let dst = hruns.row_mut(r);
        let mut c = 0;
        while c < w {
            if src[c] {
                let start = c;
                while c < w && src[c] {
                    c += 1;
                }
                let len = (c - start) as u32;
                for slot in &mut dst[start..c] {
                    *slot = len;
                }
            } else {
                c += 1;
            }
        }
    }

    // Vertical runs, folded into the minimum in place.
    for c in 0..w {
        let mut r = 0;
        while r < h {
            if mask.at(r, c) {
                let start = r;
                while r < h && mask.at(r, c) {
                    r += 1;
                }
                let len = (r - start) as u32;
                for rr in start..r {
                    let cur = hruns.at(rr, c);
                    hruns.set(rr, c, cur.min(len));
                }
            } else {
                r += 1;
            }
        }
    }
    hruns
}

/// Label the mask and write each component's shorter bbox side, scaled to
/// full-resolution units, over the component's pixels.
fn object_scale_map(mask: &BitImage2, level: usize) -> Image2D<u32> {
    let set = ComponentSet::extract(mask, Connectivity::Eight);
    let scales: Vec<u32> = std::iter::once(0)
        .chain(set.iter().map(|comp| {
            (comp.width().min(comp.height()) as u32) << level
        }))
        .collect();

    let mut out: Image2D<u32> = Image2D::new(mask.nrows(), mask.ncols());
    for r in 0..mask.nrows() {
        let labels = set.labels().row(r);
        let dst = out.row_mut(r);
        for (c, &label) in labels.iter().enumerate() {
            dst[c] = scales[label as usize];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binarize::{DEFAULT_SAUVOLA_DEPTH, DEFAULT_SAUVOLA_K};

    #[test]
    fn uniform_image_stays_empty() {
        let img: GrayImage2 = Image2D::filled(100, 100, 200u8);
        let mask = sauvola_ms(&img, 101, DEFAULT_SAUVOLA_DEPTH, DEFAULT_SAUVOLA_K);
        assert_eq!(mask.count_foreground(), 0);
    }

    #[test]
    fn depth_one_matches_single_scale() {
        let mut img: GrayImage2 = Image2D::filled(40, 40, 220u8);
        for c in 5..35 {
            img.set(20, c, 15);
        }
        let single = sauvola(&img, 21, DEFAULT_SAUVOLA_K);
        let ms = sauvola_ms(&img, 21, 1, DEFAULT_SAUVOLA_K);
        assert_eq!(single, ms);
    }

    #[test]
    fn thick_stroke_interior_recovered_from_coarse_levels() {
        // A 40×40 ink block against a 15-wide window: the fine level
        // hollows the interior (uniform window, σ = 0); a coarser level
        // sees the block smaller than its window and keeps it solid.
        let mut img: GrayImage2 = Image2D::filled(200, 200, 230u8);
        for r in 80..120 {
            for c in 80..120 {
                img.set(r, c, 20);
            }
        }
        let fine = sauvola(&img, 15, DEFAULT_SAUVOLA_K);
        assert!(!fine.at(100, 100), "fine scale should hollow the interior");

        let ms = sauvola_ms(&img, 15, 3, DEFAULT_SAUVOLA_K);
        assert!(ms.at(100, 100), "multi-scale should fill the interior");
        assert!(ms.at(81, 100));
        assert!(!ms.at(10, 10));
    }

    #[test]
    fn subsample_halves_and_averages() {
        let img: GrayImage2 = Image2D::filled(9, 7, 100u8);
        let sub = subsample_antialiased(&img);
        assert_eq!(sub.nrows(), 5);
        assert_eq!(sub.ncols(), 4);
        // uniform input survives antialiasing untouched
        for r in 0..5 {
            for c in 0..4 {
                assert_eq!(sub.at(r, c), 100);
            }
        }
    }

    #[test]
    fn stroke_width_is_min_of_runs() {
        let mut mask: BitImage2 = Image2D::new(6, 8);
        // a 2-tall, 5-wide bar
        for r in 2..4 {
            for c in 1..6 {
                mask.set(r, c, true);
            }
        }
        let sw = stroke_width_map(&mask);
        assert_eq!(sw.at(2, 3), 2);
        assert_eq!(sw.at(3, 1), 2);
        assert_eq!(sw.at(0, 0), 0);
    }
}
