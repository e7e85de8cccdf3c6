//! Error types for picture sort

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for picture sort operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for picture sort
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The directory provided does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("Failed to read EXIF data from {path}: {message}")]
    ExifRead { path: PathBuf, message: String },

    #[error("Failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode recognition view: {0}")]
    ImageEncode(#[from] image::ImageError),

    #[error("Text recognition failed: {0}")]
    Recognition(String),

    #[error("Text recognizer '{0}' not found. Install Tesseract and ensure it is in PATH")]
    RecognizerNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
