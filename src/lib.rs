//! Text extraction from document images.
//!
//! A raster page is preprocessed, binarized with multi-scale Sauvola
//! thresholding, segmented into connected components, grouped into text
//! lines and handed to an OCR backend; a plausibility filter turns pages
//! without real writing into the empty string.

pub mod binarize;
pub mod components;
pub mod config;
pub mod debug;
pub mod document;
pub mod error;
pub mod image2d;
pub mod integral;
pub mod job;
pub mod lines;
pub mod links;
pub mod ocr;
pub mod pipeline;
pub mod preprocess;
pub mod separators;
pub mod unionfind;

pub use config::{load_options, save_options, BinarizationAlgo, Options};
pub use error::{Error, Result};
pub use job::{ExtractionJob, JobState};
pub use pipeline::{extract_text, extract_text_with, process_document, CancelFlag, NoProgress, Progress};
