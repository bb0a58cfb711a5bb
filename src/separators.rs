use crate::components::{ComponentSet, Connectivity};
use crate::image2d::{BitImage2, Image2D};

// ── Separator extraction ──────────────────────────────────────────────────
//
// Two kinds of structural marks must never be linked into text lines:
// ruled vertical lines, and the wide whitespace gutters between columns.
// Both are detected on the binary mask and handed to
// `ComponentSet::add_separators`.

/// Default vertical-line structuring element length.
pub const DEFAULT_VSEP_LEN: usize = 81;

/// Sentinel distance for rows with no ink at all.
const FAR: u32 = u32::MAX / 2;

/// Morphological opening with a vertical line structuring element.
///
/// A one-pixel-wide vertical SE makes the opening separable per column:
/// erosion keeps only the centers of runs at least `2·(len/2)+1` tall and
/// dilation restores those runs in full, so the opening is exactly
/// "keep every vertical run of the required length".
pub fn vertical_separators(mask: &BitImage2, len: usize) -> BitImage2 {
    let h = mask.nrows();
    let w = mask.ncols();
    let mut out: BitImage2 = Image2D::new(h, w);
    let min_len = 2 * (len / 2) + 1;

    for c in 0..w {
        let mut r = 0;
        while r < h {
            if mask.at(r, c) {
                let start = r;
                while r < h && mask.at(r, c) {
                    r += 1;
                }
                if r - start >= min_len {
                    for rr in start..r {
                        out.set(rr, c, true);
                    }
                }
            } else {
                r += 1;
            }
        }
    }
    out
}

/// Whitespace (non-visible) separators: wide vertical strips of background
/// between text columns.
///
/// A horizontal distance transform measures how far each pixel sits from
/// the nearest ink in its row; a pixel belongs to a gutter when that
/// distance stays above the median component height across a tall vertical
/// neighborhood. Gaps narrower than a text height (inter-word spacing)
/// never qualify.
pub fn whitespace_separators(mask: &BitImage2) -> BitImage2 {
    let h = mask.nrows();
    let w = mask.ncols();
    let mut out: BitImage2 = Image2D::new(h, w);

    let set = ComponentSet::extract(mask, Connectivity::Eight);
    let mut heights: Vec<usize> = set.iter().map(|comp| comp.height()).collect();
    if heights.is_empty() {
        return out;
    }
    heights.sort_unstable();
    let median_height = heights[heights.len() / 2] as u32;
    if median_height == 0 {
        return out;
    }

    let dist = horizontal_distance(mask);
    let vmin = column_sliding_min(&dist, median_height as usize * 2);

    for r in 0..h {
        let src = vmin.row(r);
        let dst = out.row_mut(r);
        for c in 0..w {
            dst[c] = src[c] > median_height;
        }
    }
    out
}

/// Distance along the row to the nearest foreground pixel; `FAR` on rows
/// without any ink. Two sweeps per row.
fn horizontal_distance(mask: &BitImage2) -> Image2D<u32> {
    let h = mask.nrows();
    let w = mask.ncols();
    let mut dist: Image2D<u32> = Image2D::new(h, w);

    for r in 0..h {
        let src = mask.row(r);
        let dst = dist.row_mut(r);
        let mut d = FAR;
        for c in 0..w {
            d = if src[c] { 0 } else { d.saturating_add(1).min(FAR) };
            dst[c] = d;
        }
        d = FAR;
        for c in (0..w).rev() {
            d = if src[c] { 0 } else { d.saturating_add(1).min(FAR) };
            dst[c] = dst[c].min(d);
        }
    }
    dist
}

/// Per-column minimum over a sliding vertical window of half-height
/// `half`, via a monotonic deque.
fn column_sliding_min(img: &Image2D<u32>, half: usize) -> Image2D<u32> {
    let h = img.nrows();
    let w = img.ncols();
    let mut out: Image2D<u32> = Image2D::new(h, w);

    for c in 0..w {
        // (row, value), values increasing front to back
        let mut deque: std::collections::VecDeque<(usize, u32)> = std::collections::VecDeque::new();
        for r in 0..h.min(half) {
            push_min(&mut deque, r, img.at(r, c));
        }
        for r in 0..h {
            let incoming = r + half;
            if incoming < h {
                push_min(&mut deque, incoming, img.at(incoming, c));
            }
            while let Some(&(row, _)) = deque.front() {
                if row + half < r {
                    deque.pop_front();
                } else {
                    break;
                }
            }
            out.set(r, c, deque.front().map(|&(_, v)| v).unwrap_or(FAR));
        }
    }
    out
}

fn push_min(deque: &mut std::collections::VecDeque<(usize, u32)>, row: usize, value: u32) {
    while let Some(&(_, back)) = deque.back() {
        if back >= value {
            deque.pop_back();
        } else {
            break;
        }
    }
    deque.push_back((row, value));
}
