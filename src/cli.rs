//! CLI argument parsing with clap

use crate::config::{Config, FileOperation};
use clap::Parser;
use std::path::PathBuf;

/// Picture Sort - sort photos into year/month folders by capture date
///
/// The capture date is read from EXIF metadata, then from the file name,
/// and optionally from a date stamp printed on the picture itself.
/// Pictures without a date are copied to DESTINATION/unsorted.
#[derive(Parser, Debug)]
#[command(name = "picture-sort")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory containing the pictures to sort
    pub source: Option<PathBuf>,

    /// Root of the sorted year/month tree
    pub destination: Option<PathBuf>,

    /// Path to configuration file (TOML format)
    ///
    /// When specified, settings from the config file are used as defaults.
    /// CLI arguments will override config file settings.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Descend into child directories (default)
    #[arg(short, long, overrides_with = "no_recursive")]
    pub recursive: bool,

    /// Only sort pictures directly inside SOURCE
    #[arg(long)]
    pub no_recursive: bool,

    /// Move dated pictures instead of copying them
    #[arg(short, long = "move")]
    pub move_files: bool,

    /// Rename placed pictures to <YYYY-MM-DD>_(<HH:MM:SS>).<ext>
    #[arg(short = 'n', long)]
    pub rename: bool,

    /// Read date stamps printed on the picture (slow, experimental)
    #[arg(long)]
    pub optical: bool,

    /// Give up on one picture's date stamp after this many seconds (0 = never)
    #[arg(long, value_name = "SECS")]
    pub optical_timeout: Option<u64>,

    /// Tesseract executable
    #[arg(long, value_name = "PATH", env = "PICTURE_SORT_TESSERACT")]
    pub tesseract: Option<PathBuf>,

    /// Tesseract language pack
    #[arg(long, value_name = "LANG")]
    pub ocr_lang: Option<String>,

    /// Number of worker threads (1 = sequential, 0 = one per CPU)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write the log to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Output log format as JSON
    #[arg(long)]
    pub json_log: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        if let Some(ref source) = self.source {
            config.source_dir = source.clone();
        }
        if let Some(ref destination) = self.destination {
            config.destination_dir = destination.clone();
        }
        if self.no_recursive {
            config.recursive = false;
        } else if self.recursive {
            config.recursive = true;
        }
        if self.move_files {
            config.operation = FileOperation::Move;
        }
        if self.rename {
            config.rename = true;
        }
        if self.optical {
            config.optical = true;
        }
        if let Some(secs) = self.optical_timeout {
            config.optical_timeout_secs = secs;
        }
        if let Some(ref tesseract) = self.tesseract {
            config.tesseract_command = tesseract.clone();
        }
        if let Some(ref lang) = self.ocr_lang {
            config.ocr_language = lang.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if self.verbose {
            config.verbose = true;
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}
