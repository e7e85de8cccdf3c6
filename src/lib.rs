//! Picture Sort - sort photos into year/month folders by capture date
//!
//! This library resolves when a picture was taken and files it accordingly:
//! - EXIF metadata extraction
//! - Filename date parsing
//! - Optional recovery of date stamps printed on the picture
//! - No-clobber copy or move into `<year>/<Month>/`
//! - Parallel processing with Rayon

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod placement;
pub mod process;
pub mod time;

pub use cli::Cli;
pub use config::{Config, ConfigError, FileOperation};
pub use error::{Error, Result};
pub use event::{EventSink, FileEvent, TracingSink};
pub use placement::{PlacementResult, PlacementStatus, Placer, RunTally, TallySummary};
pub use process::{Processor, RunReport};
pub use time::{CancellationToken, Cascade, CaptureTimestamp, ImageReference, OpticalStage, ResolutionOutcome, TimeSource};
