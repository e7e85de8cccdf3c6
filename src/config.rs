//! Configuration types for picture sort

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File operation mode for resolved images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    /// Copy files to destination
    #[default]
    Copy,
    /// Move files to destination
    Move,
}

/// Configuration for picture sort
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory to scan for images
    pub source_dir: PathBuf,

    /// Root of the sorted year/month tree
    pub destination_dir: PathBuf,

    /// Descend into child directories
    pub recursive: bool,

    /// Copy or move resolved images. Unresolved images are always copied.
    pub operation: FileOperation,

    /// Rename placed files to `<date>_(<time>)<ext>`
    pub rename: bool,

    /// Try to read a date stamp burned into the pixels (slow)
    pub optical: bool,

    /// Upper bound on optical recovery for one file, in seconds
    pub optical_timeout_secs: u64,

    /// Tesseract executable used for optical recovery
    pub tesseract_command: PathBuf,

    /// Tesseract language pack
    pub ocr_language: String,

    /// Number of worker threads (1 = sequential, 0 = one per CPU)
    pub jobs: usize,

    /// Verbose output
    pub verbose: bool,

    /// Extensions treated as images without sniffing the content
    pub image_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::new(),
            destination_dir: PathBuf::new(),
            recursive: true,
            operation: FileOperation::default(),
            rename: false,
            optical: false,
            optical_timeout_secs: 60,
            tesseract_command: PathBuf::from("tesseract"),
            ocr_language: "eng".into(),
            jobs: 1,
            verbose: false,
            image_extensions: vec![
                "jpg".into(), "jpeg".into(), "png".into(), "gif".into(),
                "bmp".into(), "webp".into(), "tiff".into(), "tif".into(),
            ],
        }
    }
}

impl Config {
    /// Check if a file extension is a known image format
    pub fn is_image_extension(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.image_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Optical recovery budget for a single file
    pub fn optical_timeout(&self) -> Duration {
        Duration::from_secs(self.optical_timeout_secs)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# Picture Sort Configuration File
# This file uses TOML format (https://toml.io)
# Every key is optional; command line flags override these values.

# Directory to scan for images
source_dir = "D:/Photos"

# Root of the sorted tree: <destination_dir>/<year>/<Month>/
destination_dir = "D:/Sorted"

# Descend into child directories
recursive = true

# File operation for dated images: "copy" or "move"
# Images without a date are always copied to <destination_dir>/unsorted
operation = "copy"

# Rename placed files to 2021-03-04_(10:15:30).jpg
rename = false

# Read date stamps burned into the picture (slow, requires tesseract)
optical = false

# Give up on the date stamp of a single file after this many seconds
optical_timeout_secs = 60

# Tesseract executable and language pack
tesseract_command = "tesseract"
ocr_language = "eng"

# Worker threads: 1 = sequential, 0 = one per CPU
jobs = 1

# Verbose output - show per-file decisions
verbose = false

# Extensions treated as images without inspecting the content
image_extensions = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"]
"#
        .to_string()
    }
}

/// Errors that can occur when loading configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}
