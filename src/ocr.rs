pub mod tesseract;

use image::GrayImage;

use crate::error::Result;

// ── Recognizer boundary ───────────────────────────────────────────────────

/// Every OCR backend implements this.
///
/// `recognize` receives one text line's bbox-clipped binary image,
/// rendered dark ink on white, together with a language tag, and returns
/// the recognized UTF-8 string. The pipeline assumes nothing else about
/// the backend.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;
    fn recognize(&self, line: &GrayImage, lang: &str) -> Result<String>;
}

// ── Plausibility filter ───────────────────────────────────────────────────

/// Minimum letter-or-number share for text to count as real writing.
const MIN_LETTER_RATIO: f64 = 0.7;
/// Maximum whitespace share.
const MAX_SPACE_RATIO: f64 = 0.3;

/// Reject OCR output that is garbage rather than writing.
///
/// Pages with no real text (noise, ornaments, figures) make the
/// recognizer produce strings like `" W Y œe ''ii'' ï§ _* ,"`; counting
/// letter-or-number and whitespace code points separates those from
/// prose. Implausible input comes back as the empty string, and the
/// filter is idempotent.
pub fn plausible_text(text: String) -> String {
    if text.is_empty() {
        return text;
    }
    let mut letters = 0usize;
    let mut spaces = 0usize;
    let mut total = 0usize;
    for c in text.chars() {
        total += 1;
        if c.is_alphanumeric() {
            letters += 1;
        } else if c.is_whitespace() {
            spaces += 1;
        }
    }
    let letter_ratio = letters as f64 / total as f64;
    let space_ratio = spaces as f64 / total as f64;
    if letter_ratio > MIN_LETTER_RATIO && space_ratio < MAX_SPACE_RATIO {
        text
    } else {
        tracing::debug!(letter_ratio, space_ratio, "extracted text looks like junk");
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(plausible_text(" W Y œe ''ii'' ï§ _* ,".to_string()), "");
    }

    #[test]
    fn prose_is_retained() {
        let text = "The quick brown fox.".to_string();
        assert_eq!(plausible_text(text.clone()), text);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(plausible_text(String::new()), "");
    }

    #[test]
    fn all_whitespace_is_rejected() {
        assert_eq!(plausible_text("   \n\t ".to_string()), "");
    }

    #[test]
    fn filter_is_idempotent() {
        for sample in ["The quick brown fox.", " W Y œe ''ii'' ï§ _* ,", "", "a b c d e f g h"] {
            let once = plausible_text(sample.to_string());
            let twice = plausible_text(once.clone());
            assert_eq!(once, twice, "not idempotent on {sample:?}");
        }
    }

    #[test]
    fn unicode_letters_count_as_letters() {
        let text = "Füße größer".to_string();
        assert_eq!(plausible_text(text.clone()), text);
    }
}
