use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::components::ComponentSet;
use crate::error::Result;
use crate::image2d::BitImage2;
use crate::lines::{LineSet, LineTag};
use crate::links::ObjectLinks;

// ── Debug artifacts ───────────────────────────────────────────────────────
//
// Write-only renderings of intermediate pipeline state. Later stages
// never read these back.

const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
const CYAN: Rgb<u8> = Rgb([0, 255, 255]);
const GREEN: Rgb<u8> = Rgb([0, 160, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Save a binary mask as a raw PBM (1 = ink).
pub fn save_pbm(mask: &BitImage2, path: &Path) -> Result<()> {
    let bits: Vec<u8> = (0..mask.nrows())
        .flat_map(|r| mask.row(r).iter().map(|&fg| fg as u8))
        .collect();
    let writer = BufWriter::new(File::create(path)?);
    PnmEncoder::new(writer)
        .with_subtype(PnmSubtype::Bitmap(SampleEncoding::Binary))
        .write_image(
            &bits,
            mask.ncols() as u32,
            mask.nrows() as u32,
            ExtendedColorType::L8,
        )?;
    Ok(())
}

/// Save an RGB rendering as a raw PPM.
pub fn save_ppm(img: &RgbImage, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    PnmEncoder::new(writer)
        .with_subtype(PnmSubtype::Pixmap(SampleEncoding::Binary))
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)?;
    Ok(())
}

/// Ink black on white, as the canvas for every overlay.
pub fn base_image(mask: &BitImage2) -> RgbImage {
    image::DynamicImage::ImageLuma8(mask.to_gray()).to_rgb8()
}

fn draw_bbox(img: &mut RgbImage, bbox: &crate::components::BBox, color: Rgb<u8>) {
    let (top, left) = (bbox.min_row as f32, bbox.min_col as f32);
    let (bottom, right) = (bbox.max_row as f32, bbox.max_col as f32);
    draw_line_segment_mut(img, (left, top), (right, top), color);
    draw_line_segment_mut(img, (left, bottom), (right, bottom), color);
    draw_line_segment_mut(img, (left, top), (left, bottom), color);
    draw_line_segment_mut(img, (right, top), (right, bottom), color);
}

fn draw_link(img: &mut RgbImage, set: &ComponentSet, s: u32, t: u32, color: Rgb<u8>) {
    let a = set.get(s).center;
    let b = set.get(t).center;
    draw_line_segment_mut(img, (a.1 as f32, a.0 as f32), (b.1 as f32, b.0 as f32), color);
}

/// Component boxes plus the raw left (cyan) and right (green) links,
/// anchored at mass centers.
pub fn linked_bboxes_image(
    mask: &BitImage2,
    set: &ComponentSet,
    left: &ObjectLinks,
    right: &ObjectLinks,
) -> RgbImage {
    let mut img = base_image(mask);
    for comp in set.iter() {
        draw_bbox(&mut img, &comp.bbox, BLUE);
    }
    for (s, t) in left.iter_links() {
        draw_link(&mut img, set, s, t, CYAN);
    }
    for (s, t) in right.iter_links() {
        draw_link(&mut img, set, s, t, GREEN);
    }
    img
}

/// Filter decisions: links that survived in green, rejected ones in red.
pub fn decision_image(
    mask: &BitImage2,
    set: &ComponentSet,
    before: &ObjectLinks,
    after: &ObjectLinks,
) -> RgbImage {
    let mut img = base_image(mask);
    for (s, t) in before.iter_links() {
        let color = if after.get(s) == t { GREEN } else { RED };
        draw_link(&mut img, set, s, t, color);
    }
    img
}

/// Bounding boxes of lines that still carry text.
pub fn bboxes_image(mask: &BitImage2, lines: &LineSet) -> RgbImage {
    let mut img = base_image(mask);
    for line in lines.text_lines() {
        draw_bbox(&mut img, &line.bbox, RED);
    }
    img
}

/// Baseline (red) and meanline (blue) of every surviving line.
pub fn mean_and_base_lines_image(mask: &BitImage2, lines: &LineSet) -> RgbImage {
    let mut img = base_image(mask);
    for line in lines.text_lines() {
        let (left, right) = (line.bbox.min_col as f32, line.bbox.max_col as f32);
        draw_line_segment_mut(
            &mut img,
            (left, line.baseline as f32),
            (right, line.baseline as f32),
            RED,
        );
        draw_line_segment_mut(
            &mut img,
            (left, line.meanline as f32),
            (right, line.meanline as f32),
            BLUE,
        );
    }
    img
}

/// Text report of every surviving line's geometry, one line per text
/// line, whitespace-separated.
pub fn lines_report(lines: &LineSet) -> String {
    let mut out = String::new();
    for line in lines.iter() {
        if matches!(line.tag, LineTag::Merged | LineTag::Ignored | LineTag::Pathological) {
            continue;
        }
        let _ = writeln!(
            out,
            "{} {} {} {} {} {} {} {} {} {} {} {}",
            line.bbox.min_row,
            line.bbox.min_col,
            line.bbox.max_row,
            line.bbox.max_col,
            line.card,
            line.baseline,
            line.x_height,
            line.meanline,
            line.d_height,
            line.a_height,
            line.char_space,
            line.char_width,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Connectivity;
    use crate::image2d::Image2D;
    use crate::links::{link_with_single_neighbor, merge_double_link, Direction, ObjectGroups};

    fn sample() -> (BitImage2, ComponentSet, LineSet) {
        let mut mask: BitImage2 = Image2D::new(100, 100);
        for &(c0, c1) in &[(10usize, 30usize), (40, 60), (70, 90)] {
            for r in 40..=60 {
                for c in c0..=c1 {
                    mask.set(r, c, true);
                }
            }
        }
        let mut set = ComponentSet::extract(&mask, Connectivity::Eight);
        let right = link_with_single_neighbor(&set, Direction::Right);
        let left = link_with_single_neighbor(&set, Direction::Left);
        let merged = merge_double_link(&left, &right);
        let mut groups = ObjectGroups::from_links(&merged);
        let lines = LineSet::from_groups(&mut set, &mut groups);
        (mask, set, lines)
    }

    #[test]
    fn report_lists_surviving_lines_with_twelve_fields() {
        let (_, _, lines) = sample();
        let report = lines_report(&lines);
        let rows: Vec<&str> = report.lines().collect();
        assert_eq!(rows.len(), 1);
        let fields: Vec<&str> = rows[0].split_whitespace().collect();
        assert_eq!(fields.len(), 12);
        assert_eq!(fields[0], "40"); // pmin_row
        assert_eq!(fields[4], "3"); // card
        assert_eq!(fields[5], "60"); // baseline
    }

    #[test]
    fn pbm_and_ppm_files_are_written() {
        let (mask, set, lines) = sample();
        let dir = tempfile::tempdir().unwrap();

        let pbm = dir.path().join("mask.pbm");
        save_pbm(&mask, &pbm).unwrap();
        assert!(pbm.metadata().unwrap().len() > 0);

        let ppm = dir.path().join("bboxes.ppm");
        save_ppm(&bboxes_image(&mask, &lines), &ppm).unwrap();
        assert!(ppm.metadata().unwrap().len() > 0);

        let right = link_with_single_neighbor(&set, Direction::Right);
        let left = link_with_single_neighbor(&set, Direction::Left);
        let links_img = linked_bboxes_image(&mask, &set, &left, &right);
        assert_eq!(links_img.dimensions(), (100, 100));
    }
}
