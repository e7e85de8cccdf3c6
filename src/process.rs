//! Main file processor with Rayon parallel processing
//!
//! Handles the core logic of:
//! - Scanning the source directory for images
//! - Resolving capture times
//! - Placing files into the destination tree

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{EventSink, TracingSink};
use crate::placement::{
    PlacementOptions, PlacementResult, Placer, RunTally, TallySummary, UNSORTED_DIR,
};
use crate::time::optical::OpticalExtractor;
use crate::time::{Cascade, ImageReference, OpticalStage};
use rayon::prelude::*;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, debug, info, span, warn};
use walkdir::{DirEntry, WalkDir};

/// Bytes read when sniffing files without a known extension
const SNIFF_LEN: usize = 64;

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub results: Vec<PlacementResult>,
    pub summary: TallySummary,
}

/// Main processor for sorting images
pub struct Processor {
    config: Config,
    cascade: Cascade,
    sink: Arc<dyn EventSink>,
}

impl Processor {
    /// Create a processor that reports through `tracing`
    pub fn new(config: Config) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a processor with a custom event sink
    pub fn with_sink(config: Config, sink: Arc<dyn EventSink>) -> Self {
        let mut cascade = Cascade::new(Arc::clone(&sink));
        if config.optical {
            cascade = cascade.with_optical(optical_stage(&config), config.optical_timeout());
        }
        Self {
            config,
            cascade,
            sink,
        }
    }

    /// Replace the optical stage, enabling it regardless of configuration
    pub fn with_optical_stage(mut self, stage: Arc<dyn OpticalStage>) -> Self {
        self.cascade = Cascade::new(Arc::clone(&self.sink))
            .with_optical(stage, self.config.optical_timeout());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the processing pipeline
    pub fn run(&self) -> Result<RunReport> {
        let _span = span!(Level::INFO, "processor_run").entered();

        self.validate()?;

        info!(source = ?self.config.source_dir, "Scanning source directory...");
        let files = self.collect_files()?;
        info!(count = files.len(), "Found images");

        let tally = Arc::new(RunTally::new());
        let placer = Placer::new(
            &self.config.destination_dir,
            PlacementOptions::from(&self.config),
            Arc::clone(&tally),
            Arc::clone(&self.sink),
        );

        let results: Vec<PlacementResult> = if self.config.jobs == 1 {
            files
                .iter()
                .map(|path| self.process_file(path, &placer))
                .collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.jobs)
                .build()
                .map_err(|e| Error::Config(format!("Failed to start worker pool: {e}")))?;
            pool.install(|| {
                files
                    .par_iter()
                    .map(|path| self.process_file(path, &placer))
                    .collect()
            })
        };

        info!("{}", tally.summary());

        Ok(RunReport {
            results,
            summary: tally.snapshot(),
        })
    }

    /// Fatal preconditions, checked before any file is touched
    fn validate(&self) -> Result<()> {
        let source = &self.config.source_dir;
        if !source.is_dir() {
            return Err(Error::SourceNotFound(source.clone()));
        }
        Ok(())
    }

    fn process_file(&self, path: &Path, placer: &Placer) -> PlacementResult {
        let _file_span = span!(Level::DEBUG, "process_file", ?path).entered();

        let image = ImageReference::new(path);
        let outcome = self.cascade.resolve(&image);
        placer.place(&image, &outcome)
    }

    /// Collect all images from the source directory, sorted by path.
    /// Output already written under the destination is never collected.
    fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let source = std::path::absolute(&self.config.source_dir)?;
        let destination = std::path::absolute(&self.config.destination_dir)?;

        let mut walker = WalkDir::new(&source).follow_links(true);
        if !self.config.recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        let entries = walker.into_iter().filter_entry(|e| {
            let output = is_output_dir(e, &source, &destination);
            if output {
                debug!(path = ?e.path(), "Skipping destination directory");
            }
            !output
        });
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_file() && self.is_image(path) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Known extension, or content recognized as an image format
    fn is_image(&self, path: &Path) -> bool {
        if let Some(ext) = path.extension().and_then(|e| e.to_str())
            && self.config.is_image_extension(ext)
        {
            return true;
        }

        let sniffed = sniff_image(path);
        if sniffed {
            debug!(?path, "Recognized image by content");
        }
        sniffed
    }
}

/// Whether a walked directory holds output of this tool.
///
/// A destination nested in the source is skipped as a whole. When sorting in
/// place only the generated year and unsorted folders are skipped.
fn is_output_dir(entry: &DirEntry, source: &Path, destination: &Path) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }

    if source == destination {
        return entry.depth() == 1
            && entry
                .file_name()
                .to_str()
                .is_some_and(is_generated_dir_name);
    }

    destination.starts_with(source) && entry.path().starts_with(destination)
}

/// `unsorted` or a year folder such as `2019`
fn is_generated_dir_name(name: &str) -> bool {
    name == UNSORTED_DIR || (!name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
}

/// Check the leading bytes against known image signatures
fn sniff_image(path: &Path) -> bool {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    let read = File::open(path).and_then(|f| f.take(SNIFF_LEN as u64).read_to_end(&mut header));
    read.is_ok() && image::guess_format(&header).is_ok()
}

/// Build the optical stage for the configured backend
fn optical_stage(config: &Config) -> Arc<dyn OpticalStage> {
    #[cfg(feature = "tesseract-lib")]
    {
        use crate::time::optical::recognizer::TesseractLib;
        Arc::new(OpticalExtractor::new(TesseractLib::new(&config.ocr_language)))
    }
    #[cfg(not(feature = "tesseract-lib"))]
    {
        use crate::time::optical::recognizer::TesseractCli;
        let recognizer = TesseractCli::new(&config.tesseract_command, &config.ocr_language);
        // Probe once up front so a missing install is reported before the run
        recognizer.is_available();
        Arc::new(OpticalExtractor::new(recognizer))
    }
}
