use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Options;
use crate::error::{Error, Result};
use crate::ocr::tesseract::TesseractRecognizer;
use crate::ocr::Recognizer;
use crate::pipeline::{extract_text_with, CancelFlag, NoProgress};

// ── Extraction job ────────────────────────────────────────────────────────
//
// Asynchronous wrapper around the pipeline: resolve a URI to a local
// file, decode, run extraction on a blocking thread, clean up. Remote
// downloads land in a named temp file that is deleted on every exit
// path, including panics and cancellation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Downloading,
    Running,
    Done,
    Failed,
    Canceled,
}

#[derive(Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        StateCell(Arc::new(AtomicU8::new(JobState::Pending as u8)))
    }

    fn set(&self, state: JobState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> JobState {
        match self.0.load(Ordering::Acquire) {
            0 => JobState::Pending,
            1 => JobState::Downloading,
            2 => JobState::Running,
            3 => JobState::Done,
            4 => JobState::Failed,
            _ => JobState::Canceled,
        }
    }
}

/// A running text-extraction job. Dropping the handle detaches the job;
/// cancellation is cooperative and best-effort.
pub struct ExtractionJob {
    state: StateCell,
    cancel: CancelFlag,
    handle: JoinHandle<Result<String>>,
}

impl ExtractionJob {
    /// Start extraction for a file path, `file://` URI or `http(s)://`
    /// URL, with the default Tesseract backend.
    pub fn spawn(uri: String, opts: Options) -> ExtractionJob {
        Self::spawn_with_recognizer(uri, opts, Arc::new(TesseractRecognizer::default()))
    }

    pub fn spawn_with_recognizer(
        uri: String,
        opts: Options,
        recognizer: Arc<dyn Recognizer>,
    ) -> ExtractionJob {
        let state = StateCell::new();
        let cancel = CancelFlag::new();
        let handle = tokio::spawn(run_job(uri, opts, recognizer, state.clone(), cancel.clone()));
        ExtractionJob { state, cancel, handle }
    }

    /// Current state snapshot.
    pub fn state(&self) -> JobState {
        self.state.get()
    }

    /// Request abandonment; the pipeline stops at the next stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for completion. Cancellation surfaces as an empty result with
    /// `state() == Canceled`, not as an error.
    pub async fn wait(self) -> Result<String> {
        self.handle
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

async fn run_job(
    uri: String,
    opts: Options,
    recognizer: Arc<dyn Recognizer>,
    state: StateCell,
    cancel: CancelFlag,
) -> Result<String> {
    match run_job_inner(uri, opts, recognizer, &state, &cancel).await {
        Ok(text) => {
            state.set(JobState::Done);
            Ok(text)
        }
        Err(Error::Cancelled) => {
            info!("extraction job cancelled");
            state.set(JobState::Canceled);
            Ok(String::new())
        }
        Err(e) => {
            state.set(JobState::Failed);
            Err(e)
        }
    }
}

async fn run_job_inner(
    uri: String,
    opts: Options,
    recognizer: Arc<dyn Recognizer>,
    state: &StateCell,
    cancel: &CancelFlag,
) -> Result<String> {
    state.set(JobState::Downloading);
    let source = resolve_uri(&uri).await?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    state.set(JobState::Running);
    let bytes = tokio::fs::read(source.path()).await?;
    debug!(uri, len = bytes.len(), "image resolved, starting pipeline");

    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || {
        extract_text_with(&bytes, &opts, recognizer.as_ref(), &NoProgress, &cancel)
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))?
    // `source` lives to this point, so a downloaded temp file survives
    // exactly as long as the pipeline needs it.
}

enum Source {
    Local(PathBuf),
    Temp(NamedTempFile),
}

impl Source {
    fn path(&self) -> &Path {
        match self {
            Source::Local(path) => path,
            Source::Temp(tmp) => tmp.path(),
        }
    }
}

async fn resolve_uri(uri: &str) -> Result<Source> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        let response = reqwest::get(uri).await?.error_for_status()?;
        let bytes = response.bytes().await?;
        let mut tmp = NamedTempFile::new()?;
        std::io::Write::write_all(&mut tmp, &bytes)?;
        debug!(uri, path = %tmp.path().display(), "downloaded to temp file");
        Ok(Source::Temp(tmp))
    } else if let Some(path) = uri.strip_prefix("file://") {
        Ok(Source::Local(PathBuf::from(path)))
    } else {
        Ok(Source::Local(PathBuf::from(uri)))
    }
}
