use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{DynamicImage, GrayImage, RgbImage};
use tracing::{debug, info, warn};

use crate::binarize::{self, DEFAULT_SAUVOLA_DEPTH};
use crate::components::{components_small, denoise_fg, ComponentSet, Connectivity};
use crate::config::{BinarizationAlgo, Options};
use crate::document::{paragraphs_from_lines, Document};
use crate::error::{Error, Result};
use crate::image2d::BitImage2;
use crate::lines::{tag_pathological, text_merging, LineSet};
use crate::links::{
    filter_links_hratio, link_with_single_neighbor, merge_double_link, Direction, ObjectGroups,
};
use crate::ocr::tesseract::TesseractRecognizer;
use crate::ocr::{plausible_text, Recognizer};
use crate::preprocess;
use crate::separators::{vertical_separators, whitespace_separators};

// ── Progress and cancellation ─────────────────────────────────────────────

/// Stage reporting callbacks. Implementations must be cheap; they run on
/// the pipeline thread.
pub trait Progress: Send + Sync {
    fn on_stage(&self, _name: &str) {}
    fn on_progress(&self, _fraction: f32) {}
}

/// The silent default.
pub struct NoProgress;

impl Progress for NoProgress {}

/// Shared cancellation flag. Cancellation is cooperative: the pipeline
/// polls between stages and abandons the document, discarding partial
/// results.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct Stages<'a> {
    progress: &'a dyn Progress,
    cancel: &'a CancelFlag,
    done: u32,
    total: u32,
}

impl Stages<'_> {
    /// Announce the next stage, or bail out if the document was abandoned.
    fn enter(&mut self, name: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        info!(stage = name, "pipeline stage");
        self.progress.on_stage(name);
        Ok(())
    }

    fn finish(&mut self) {
        self.done += 1;
        self.progress.on_progress(self.done as f32 / self.total as f32);
    }
}

// ── Debug artifact sink ───────────────────────────────────────────────────

/// Best-effort writer for stage artifacts; failures are logged, never
/// propagated, and later stages never read anything back.
struct DebugSink {
    dir: Option<PathBuf>,
}

impl DebugSink {
    fn new(opts: &Options) -> DebugSink {
        let dir = opts.debug_dir.clone();
        if let Some(dir) = &dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), error = %e, "cannot create debug directory");
            }
        }
        DebugSink { dir }
    }

    fn pbm(&self, name: &str, mask: &BitImage2) {
        if let Some(dir) = &self.dir {
            if let Err(e) = crate::debug::save_pbm(mask, &dir.join(name)) {
                warn!(name, error = %e, "debug artifact not written");
            }
        }
    }

    fn ppm(&self, name: &str, img: &RgbImage) {
        if let Some(dir) = &self.dir {
            if let Err(e) = crate::debug::save_ppm(img, &dir.join(name)) {
                warn!(name, error = %e, "debug artifact not written");
            }
        }
    }

    fn text(&self, name: &str, content: &str) {
        if let Some(dir) = &self.dir {
            if let Err(e) = std::fs::write(dir.join(name), content) {
                warn!(name, error = %e, "debug artifact not written");
            }
        }
    }

    fn enabled(&self) -> bool {
        self.dir.is_some()
    }
}

// ── Entry points ──────────────────────────────────────────────────────────

/// Extract text from an encoded image with the default Tesseract backend.
pub fn extract_text(image_bytes: &[u8], opts: &Options) -> Result<String> {
    extract_text_with(
        image_bytes,
        opts,
        &TesseractRecognizer::default(),
        &NoProgress,
        &CancelFlag::default(),
    )
}

/// Extract text with explicit collaborators (recognizer, progress sink,
/// cancellation flag).
pub fn extract_text_with(
    image_bytes: &[u8],
    opts: &Options,
    recognizer: &dyn Recognizer,
    progress: &dyn Progress,
    cancel: &CancelFlag,
) -> Result<String> {
    let rgb = decode_rgb(image_bytes)?;
    let doc = process_document(rgb, "<memory>", opts, recognizer, progress, cancel)?;
    Ok(doc.text)
}

/// Decode bytes into 8-bit RGB, rejecting what the pipeline cannot take.
pub fn decode_rgb(image_bytes: &[u8]) -> Result<RgbImage> {
    let decoded = image::load_from_memory(image_bytes)
        .map_err(|e| Error::InvalidImage(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(Error::InvalidImage("zero-sized image".to_string()));
    }
    match decoded {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => Ok(decoded.to_rgb8()),
        other => Err(Error::UnsupportedFormat(format!("{:?}", other.color()))),
    }
}

/// Run the full pipeline over one decoded page.
pub fn process_document(
    rgb: RgbImage,
    filename: &str,
    opts: &Options,
    recognizer: &dyn Recognizer,
    progress: &dyn Progress,
    cancel: &CancelFlag,
) -> Result<Document> {
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(Error::InvalidImage("zero-sized image".to_string()));
    }

    let sink = DebugSink::new(opts);
    let total = 8
        + opts.enable_subsample as u32
        + opts.enable_fg_extraction as u32
        + opts.enable_deskew as u32
        + 2 * opts.enable_denoising as u32
        + opts.enable_line_seps as u32
        + opts.enable_whitespace_seps as u32;
    let mut stages = Stages { progress, cancel, done: 0, total };

    // Preprocessing ------------------------------------------------------

    let rgb = if opts.enable_subsample {
        stages.enter("Subsample")?;
        let scale = preprocess::find_best_scale(rgb.height() as usize, rgb.width() as usize);
        let out = preprocess::subsample(&rgb, scale);
        debug!(scale, "subsampled to {}×{}", out.width(), out.height());
        stages.finish();
        out
    } else {
        rgb
    };

    stages.enter("Convert to gray-scale image")?;
    let mut gray = preprocess::grayscale(&rgb);
    stages.finish();

    if opts.enable_fg_extraction {
        stages.enter("Foreground extraction")?;
        let lambda = opts.lambda_for(gray.nrows(), gray.ncols());
        let (_bg, fg) = preprocess::split_bg_fg(&gray, lambda);
        gray = fg;
        stages.finish();
    }

    if opts.enable_deskew {
        stages.enter("Deskew")?;
        gray = preprocess::deskew(&gray);
        stages.finish();
    }

    // Binarization -------------------------------------------------------

    let mut mask = match opts.binarization_algo {
        BinarizationAlgo::Convert => {
            stages.enter("Binary conversion")?;
            binarize::convert_binarize(&gray)
        }
        BinarizationAlgo::Sauvola => {
            stages.enter("Binarization (Sauvola)")?;
            binarize::sauvola(&gray, opts.sauvola_win, opts.sauvola_k)
        }
        BinarizationAlgo::SauvolaMs => {
            stages.enter("Binarization (Sauvola Multi-scale)")?;
            binarize::sauvola_ms(&gray, opts.sauvola_win, DEFAULT_SAUVOLA_DEPTH, opts.sauvola_k)
        }
    };
    stages.finish();

    if opts.enable_denoising {
        stages.enter("Remove noise")?;
        mask = denoise_fg(&mask, Connectivity::Eight, 2);
        stages.finish();
    }

    // A page with no ink at all short-circuits to the empty result.
    if mask.count_foreground() == 0 {
        debug!("binarization produced no foreground, returning empty text");
        return Ok(empty_document(rgb, filename));
    }

    // Separators ---------------------------------------------------------

    let vseps = if opts.enable_line_seps {
        stages.enter("Find vertical separators")?;
        let seps = vertical_separators(&mask, opts.vertical_sep_len);
        // remove them so they cannot glue text columns together
        for r in 0..mask.nrows() {
            let sep_row = seps.row(r);
            let row = mask.row_mut(r);
            for (c, &is_sep) in sep_row.iter().enumerate() {
                if is_sep {
                    row[c] = false;
                }
            }
        }
        sink.pbm("vseparators.pbm", &seps);
        stages.finish();
        Some(seps)
    } else {
        None
    };

    let wseps = if opts.enable_whitespace_seps {
        stages.enter("Find whitespace separators")?;
        let seps = whitespace_separators(&mask);
        sink.pbm("whitespaces.pbm", &seps);
        stages.finish();
        Some(seps)
    } else {
        None
    };

    if opts.enable_denoising {
        stages.enter("Denoise")?;
        mask = denoise_fg(&mask, Connectivity::Eight, 3);
        sink.pbm("denoised.pbm", &mask);
        stages.finish();
    }

    // Components ---------------------------------------------------------

    stages.enter("Finding components")?;
    let mut set = ComponentSet::extract(&mask, Connectivity::Eight);
    debug!(components = set.len(), "components extracted");
    if let Some(seps) = &vseps {
        set.add_separators(seps);
    }
    if let Some(seps) = &wseps {
        set.add_separators(seps);
    }
    sink.pbm("all_separators.pbm", set.separators());
    stages.finish();

    stages.enter("Filtering components")?;
    components_small(&mut set, 3);
    stages.finish();

    // Linking ------------------------------------------------------------

    stages.enter("Linking objects")?;
    let left = link_with_single_neighbor(&set, Direction::Left);
    let right = link_with_single_neighbor(&set, Direction::Right);
    if sink.enabled() {
        sink.ppm(
            "object_links.ppm",
            &crate::debug::linked_bboxes_image(&mask, &set, &left, &right),
        );
    }
    let merged = merge_double_link(&left, &right);
    stages.finish();

    stages.enter("Filtering objects")?;
    let filtered = filter_links_hratio(&set, &merged, opts.hratio_threshold);
    if sink.enabled() {
        sink.ppm(
            "hratio_links_decision_image.ppm",
            &crate::debug::decision_image(&mask, &set, &merged, &filtered),
        );
    }
    stages.finish();

    // Lines --------------------------------------------------------------

    stages.enter("Rebuilding lines")?;
    let mut groups = ObjectGroups::from_links(&filtered);
    let mut lines = LineSet::from_groups(&mut set, &mut groups);
    if sink.enabled() {
        sink.ppm("step1_bboxes.ppm", &crate::debug::bboxes_image(&mask, &lines));
        sink.ppm(
            "step1_x_height.ppm",
            &crate::debug::mean_and_base_lines_image(&mask, &lines),
        );
    }

    text_merging(&mut lines, &set);
    tag_pathological(&mut lines);
    debug!(lines = lines.text_lines().count(), "lines rebuilt");

    if sink.enabled() {
        sink.ppm("step2_bboxes.ppm", &crate::debug::bboxes_image(&mask, &lines));
        sink.ppm(
            "step2_x_height.ppm",
            &crate::debug::mean_and_base_lines_image(&mask, &lines),
        );
        sink.text("step2_bboxes_100p.txt", &crate::debug::lines_report(&lines));
    }
    stages.finish();

    // Recognition --------------------------------------------------------

    stages.enter("Recognizing text")?;
    let mut ordered: Vec<_> = lines.text_lines().collect();
    ordered.sort_by_key(|line| (line.bbox.min_row, line.bbox.min_col));

    let mut pieces: Vec<String> = Vec::with_capacity(ordered.len());
    for line in ordered {
        let clip = clip_line(&mask, line);
        let piece = recognizer.recognize(&clip, &opts.ocr_language)?;
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }
    let text = plausible_text(pieces.join("\n"));
    stages.finish();

    let paragraphs = paragraphs_from_lines(&lines);
    Ok(Document { filename: filename.to_string(), rgb, lines, paragraphs, text })
}

fn empty_document(rgb: RgbImage, filename: &str) -> Document {
    Document {
        filename: filename.to_string(),
        rgb,
        lines: LineSet::empty(),
        paragraphs: Vec::new(),
        text: String::new(),
    }
}

/// Render a line's bbox-clipped slice of the binary mask as dark ink on
/// white for the recognizer.
fn clip_line(mask: &BitImage2, line: &crate::lines::LineInfo) -> GrayImage {
    let bbox = line.bbox;
    let w = bbox.width() as u32;
    let h = bbox.height() as u32;
    GrayImage::from_fn(w, h, |x, y| {
        let r = bbox.min_row + y as usize;
        let c = bbox.min_col + x as usize;
        image::Luma([if mask.at(r, c) { 0 } else { 255 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_rgb(b"not an image").unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn decode_accepts_png_rgb() {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let decoded = decode_rgb(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (4, 4));
    }

    #[test]
    fn decode_rejects_sixteen_bit_input() {
        let img = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_pixel(4, 4, image::Luma([40_000u16]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageLuma16(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let err = decode_rgb(&bytes).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn cancelled_flag_aborts_before_work() {
        let rgb = RgbImage::from_pixel(50, 50, image::Rgb([200, 200, 200]));
        let cancel = CancelFlag::new();
        cancel.cancel();
        struct NeverCalled;
        impl Recognizer for NeverCalled {
            fn name(&self) -> &str {
                "never"
            }
            fn recognize(&self, _: &GrayImage, _: &str) -> Result<String> {
                panic!("recognizer must not run after cancellation");
            }
        }
        let err = process_document(
            rgb,
            "x",
            &Options::default(),
            &NeverCalled,
            &NoProgress,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
