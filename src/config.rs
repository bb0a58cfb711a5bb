use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::binarize::{DEFAULT_SAUVOLA_K, DEFAULT_SAUVOLA_WIN};
use crate::links::DEFAULT_HRATIO;
use crate::separators::DEFAULT_VSEP_LEN;

/// Binarization algorithm selector.
///
/// `Convert` is the violent fixed-threshold conversion; `Sauvola` the
/// single-scale adaptive threshold; `SauvolaMs` its multi-scale variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BinarizationAlgo {
    Convert,
    Sauvola,
    #[default]
    SauvolaMs,
}

/// Extraction options. All fields are optional in serialized form —
/// absent fields keep their defaults, so older JSON files stay loadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Antialiased 2× or 3× downscale for oversized scans.
    #[serde(default)]
    pub enable_subsample: bool,

    /// Background/foreground split before binarization.
    #[serde(default)]
    pub enable_fg_extraction: bool,

    /// Maximum foreground object area for the split; `None` resolves to
    /// `1.2 · (H + W)` at run time.
    #[serde(default)]
    pub lambda: Option<usize>,

    /// Rotate by the estimated page skew.
    #[serde(default)]
    pub enable_deskew: bool,

    /// Foreground denoising, applied after binarization and again before
    /// component extraction.
    #[serde(default = "default_true")]
    pub enable_denoising: bool,

    #[serde(default)]
    pub binarization_algo: BinarizationAlgo,

    /// Sauvola window side; must be odd.
    #[serde(default = "default_sauvola_win")]
    pub sauvola_win: usize,

    #[serde(default = "default_sauvola_k")]
    pub sauvola_k: f64,

    #[serde(default = "default_true")]
    pub enable_line_seps: bool,

    #[serde(default = "default_true")]
    pub enable_whitespace_seps: bool,

    /// Vertical-line structuring element length for separator extraction.
    #[serde(default = "default_vsep_len")]
    pub vertical_sep_len: usize,

    /// Bbox height-ratio above which an object link is rejected.
    #[serde(default = "default_hratio")]
    pub hratio_threshold: f64,

    /// Language tag forwarded to the OCR backend.
    #[serde(default = "default_language")]
    pub ocr_language: String,

    /// When set, every stage writes named PPM/PBM artifacts here.
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_sauvola_win() -> usize {
    DEFAULT_SAUVOLA_WIN
}

fn default_sauvola_k() -> f64 {
    DEFAULT_SAUVOLA_K
}

fn default_vsep_len() -> usize {
    DEFAULT_VSEP_LEN
}

fn default_hratio() -> f64 {
    DEFAULT_HRATIO
}

fn default_language() -> String {
    "eng".to_string()
}

impl Default for Options {
    fn default() -> Self {
        Options {
            enable_subsample: false,
            enable_fg_extraction: false,
            lambda: None,
            enable_deskew: false,
            enable_denoising: true,
            binarization_algo: BinarizationAlgo::default(),
            sauvola_win: default_sauvola_win(),
            sauvola_k: default_sauvola_k(),
            enable_line_seps: true,
            enable_whitespace_seps: true,
            vertical_sep_len: default_vsep_len(),
            hratio_threshold: default_hratio(),
            ocr_language: default_language(),
            debug_dir: None,
        }
    }
}

impl Options {
    /// Effective `lambda` for a page of the given dimensions.
    pub fn lambda_for(&self, nrows: usize, ncols: usize) -> usize {
        self.lambda
            .unwrap_or_else(|| (1.2 * (nrows + ncols) as f64) as usize)
    }
}

/// Load options from a JSON file.
pub fn load_options(path: &Path) -> anyhow::Result<Options> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    let opts = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("parse error in {}: {e}", path.display()))?;
    Ok(opts)
}

/// Save options as pretty JSON.
pub fn save_options(path: &Path, opts: &Options) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(opts)?;
    fs::write(path, text).map_err(|e| anyhow::anyhow!("cannot write {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let opts = Options::default();
        assert!(!opts.enable_subsample);
        assert!(!opts.enable_fg_extraction);
        assert!(!opts.enable_deskew);
        assert!(opts.enable_denoising);
        assert_eq!(opts.binarization_algo, BinarizationAlgo::SauvolaMs);
        assert_eq!(opts.sauvola_win, 101);
        assert_eq!(opts.sauvola_k, 0.34);
        assert!(opts.enable_line_seps);
        assert!(opts.enable_whitespace_seps);
        assert_eq!(opts.vertical_sep_len, 81);
        assert_eq!(opts.hratio_threshold, 2.5);
        assert_eq!(opts.ocr_language, "eng");
        assert!(opts.debug_dir.is_none());
    }

    #[test]
    fn lambda_auto_scales_with_page_size() {
        let opts = Options::default();
        assert_eq!(opts.lambda_for(1000, 500), 1800);
        let fixed = Options { lambda: Some(42), ..Options::default() };
        assert_eq!(fixed.lambda_for(1000, 500), 42);
    }

    #[test]
    fn sparse_json_fills_in_defaults() {
        let opts: Options = serde_json::from_str(r#"{"ocr_language": "fra"}"#).unwrap();
        assert_eq!(opts.ocr_language, "fra");
        assert_eq!(opts.sauvola_win, 101);
        assert_eq!(opts.binarization_algo, BinarizationAlgo::SauvolaMs);
    }

    #[test]
    fn options_roundtrip_through_json() {
        let opts = Options {
            enable_deskew: true,
            binarization_algo: BinarizationAlgo::Sauvola,
            sauvola_win: 75,
            ..Options::default()
        };
        let text = serde_json::to_string(&opts).unwrap();
        let back: Options = serde_json::from_str(&text).unwrap();
        assert!(back.enable_deskew);
        assert_eq!(back.binarization_algo, BinarizationAlgo::Sauvola);
        assert_eq!(back.sauvola_win, 75);
    }
}
