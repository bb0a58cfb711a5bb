use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Input could not be decoded or has a zero dimension. Fatal for the
    /// document.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Decoded image is neither RGB nor grayscale.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The OCR backend could not be initialized or failed mid-call.
    #[error("OCR backend error: {0}")]
    OcrBackend(String),

    /// The pipeline was abandoned between stages.
    #[error("extraction cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encode error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
