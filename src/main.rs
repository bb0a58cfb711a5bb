use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pagetext::{
    extract_text, load_options, BinarizationAlgo, Error, ExtractionJob, Options,
};

/// Extract text from a document image.
#[derive(Parser, Debug)]
#[command(name = "pagetext", version, about)]
struct Args {
    /// Image file, `file://` URI or `http(s)://` URL.
    input: String,

    /// Language tag forwarded to the OCR backend.
    #[arg(long, default_value = "eng")]
    lang: String,

    /// Binarization algorithm.
    #[arg(long, value_enum)]
    algo: Option<BinarizationAlgo>,

    /// Sauvola window side (odd).
    #[arg(long)]
    sauvola_win: Option<usize>,

    /// Sauvola K parameter.
    #[arg(long)]
    sauvola_k: Option<f64>,

    /// Downscale oversized scans before processing.
    #[arg(long)]
    subsample: bool,

    /// Split background and foreground before binarization.
    #[arg(long)]
    fg_extraction: bool,

    /// Maximum foreground object area for the split (default: auto).
    #[arg(long)]
    lambda: Option<usize>,

    /// Rotate by the estimated page skew.
    #[arg(long)]
    deskew: bool,

    /// Disable foreground denoising.
    #[arg(long)]
    no_denoise: bool,

    /// Disable vertical separator detection.
    #[arg(long)]
    no_line_seps: bool,

    /// Disable whitespace separator detection.
    #[arg(long)]
    no_whitespace_seps: bool,

    /// Vertical-line structuring element length.
    #[arg(long)]
    vertical_sep_len: Option<usize>,

    /// Bbox height-ratio above which object links are rejected.
    #[arg(long)]
    hratio: Option<f64>,

    /// Write per-stage debug artifacts into this directory.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Load options from a JSON file; command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("pagetext: {e:#}");
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<Error>() {
        Some(Error::OcrBackend(_)) => ExitCode::from(4),
        _ => ExitCode::from(3),
    }
}

fn run(args: Args) -> anyhow::Result<String> {
    let mut opts = match &args.config {
        Some(path) => load_options(path)?,
        None => Options::default(),
    };

    opts.ocr_language = args.lang;
    if let Some(algo) = args.algo {
        opts.binarization_algo = algo;
    }
    if let Some(win) = args.sauvola_win {
        opts.sauvola_win = win;
    }
    if let Some(k) = args.sauvola_k {
        opts.sauvola_k = k;
    }
    if args.subsample {
        opts.enable_subsample = true;
    }
    if args.fg_extraction {
        opts.enable_fg_extraction = true;
    }
    if args.lambda.is_some() {
        opts.lambda = args.lambda;
    }
    if args.deskew {
        opts.enable_deskew = true;
    }
    if args.no_denoise {
        opts.enable_denoising = false;
    }
    if args.no_line_seps {
        opts.enable_line_seps = false;
    }
    if args.no_whitespace_seps {
        opts.enable_whitespace_seps = false;
    }
    if let Some(len) = args.vertical_sep_len {
        opts.vertical_sep_len = len;
    }
    if let Some(ratio) = args.hratio {
        opts.hratio_threshold = ratio;
    }
    if args.debug_dir.is_some() {
        opts.debug_dir = args.debug_dir;
    }

    if args.input.starts_with("http://") || args.input.starts_with("https://") {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let text = runtime.block_on(async {
            ExtractionJob::spawn(args.input.clone(), opts).wait().await
        })?;
        Ok(text)
    } else {
        let path = args.input.strip_prefix("file://").unwrap_or(&args.input);
        let bytes = std::fs::read(path)
            .map_err(|e| Error::InvalidImage(format!("cannot read {path}: {e}")))?;
        Ok(extract_text(&bytes, &opts)?)
    }
}
