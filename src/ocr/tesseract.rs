use image::GrayImage;
use kreuzberg_tesseract::TesseractAPI;

use super::Recognizer;
use crate::error::{Error, Result};

// ── Tesseract backend ─────────────────────────────────────────────────────

/// Page segmentation mode 7: treat the image as a single text line.
const PSM_SINGLE_LINE: u32 = 7;

/// `Recognizer` backed by a local Tesseract installation.
#[derive(Default)]
pub struct TesseractRecognizer {
    /// Directory that directly contains `<lang>.traineddata` files.
    /// `None` → Tesseract uses TESSDATA_PREFIX or the system default.
    pub tessdata_dir: Option<String>,
}

impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, line: &GrayImage, lang: &str) -> Result<String> {
        let lang = normalize_lang(lang);
        let datadir = self.tessdata_dir.as_deref().unwrap_or("");

        let mut api = TesseractAPI::new();
        api.init(datadir, &lang)
            .map_err(|e| Error::OcrBackend(format!("init({lang}): {e}")))?;
        api.set_variable("tessedit_pageseg_mode", &PSM_SINGLE_LINE.to_string())
            .map_err(|e| Error::OcrBackend(e.to_string()))?;

        let w = line.width() as i32;
        let h = line.height() as i32;
        api.set_image(line.as_raw(), w, h, 1, w)
            .map_err(|e| Error::OcrBackend(e.to_string()))?;

        let raw = api
            .get_utf8_text()
            .map_err(|e| Error::OcrBackend(e.to_string()))?;
        Ok(raw.trim().to_string())
    }
}

/// Map common two-letter tags onto Tesseract's three-letter codes;
/// anything else passes through untouched.
fn normalize_lang(lang: &str) -> String {
    match lang.trim() {
        "" => "eng".to_string(),
        "en" | "eng" => "eng".to_string(),
        "de" | "deu" => "deu".to_string(),
        "fr" | "fra" => "fra".to_string(),
        "es" | "spa" => "spa".to_string(),
        other => other.to_string(),
    }
}
