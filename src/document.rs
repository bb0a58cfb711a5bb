use image::RgbImage;

use crate::components::BBox;
use crate::lines::{LineSet, LineTag};

// ── Document ──────────────────────────────────────────────────────────────

/// A block of vertically adjacent text lines.
#[derive(Debug, Clone)]
pub struct ParagraphInfo {
    pub lines: Vec<u32>,
    pub bbox: BBox,
}

/// One processed page: the decoded image, the reconstructed line set and
/// the recognized text. Lines reference components by id; nothing points
/// back upstream.
pub struct Document {
    pub filename: String,
    pub rgb: RgbImage,
    pub lines: LineSet,
    pub paragraphs: Vec<ParagraphInfo>,
    pub text: String,
}

/// Vertical gap cap between paragraph lines, as a multiple of x-height.
const PARAGRAPH_GAP_FACTOR: f64 = 1.5;

/// Group surviving text lines into paragraphs by vertical adjacency.
pub fn paragraphs_from_lines(lines: &LineSet) -> Vec<ParagraphInfo> {
    let mut text_lines: Vec<_> = lines
        .iter()
        .filter(|line| line.tag == LineTag::Text)
        .collect();
    text_lines.sort_by_key(|line| (line.bbox.min_row, line.bbox.min_col));

    let mut paragraphs: Vec<ParagraphInfo> = Vec::new();
    for line in text_lines {
        let gap_cap = PARAGRAPH_GAP_FACTOR * line.x_height.max(1) as f64;
        match paragraphs.last_mut() {
            Some(para) if (line.bbox.min_row as f64 - para.bbox.max_row as f64) <= gap_cap => {
                para.lines.push(line.id);
                para.bbox = para.bbox.merge(&line.bbox);
            }
            _ => paragraphs.push(ParagraphInfo {
                lines: vec![line.id],
                bbox: line.bbox,
            }),
        }
    }
    paragraphs
}
