//! Capture time resolution
//!
//! This module determines when a picture was taken, trying in order:
//! - EXIF metadata
//! - a date in the file name
//! - a date stamp burned into the pixels (optional, slow)

pub mod detect;
pub mod exif;
pub mod filename;
pub mod optical;

use crate::error::{Error, Result};
use crate::event::{EventSink, FileEvent};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use image::{DynamicImage, ImageReader};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{trace, warn};

/// Source of the resolved timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeSource {
    /// Read from EXIF metadata
    Metadata,
    /// Parsed from the file name
    Filename,
    /// Recognized from a stamp in the pixels
    Optical,
}

/// A complete, valid calendar date and time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureTimestamp(NaiveDateTime);

impl CaptureTimestamp {
    /// Build a timestamp, rejecting zero fields and impossible dates or times
    pub fn from_parts(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Option<Self> {
        if year <= 0 || month == 0 || day == 0 {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(hour, minute, second)
            .map(Self)
    }

    /// Wrap a parsed datetime, dropping sub-second precision
    pub fn from_datetime(datetime: NaiveDateTime) -> Option<Self> {
        Self::from_parts(
            datetime.year(),
            datetime.month(),
            datetime.day(),
            datetime.hour(),
            datetime.minute(),
            datetime.second(),
        )
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Full English month name, e.g. `March`
    pub fn month_name(&self) -> String {
        self.0.format("%B").to_string()
    }

    /// `2021-03-04`
    pub fn iso_date(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// `10:15:30`
    pub fn clock(&self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }
}

impl fmt::Display for CaptureTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Result of running the cascade on one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Resolved {
        timestamp: CaptureTimestamp,
        source: TimeSource,
    },
    Unresolved,
}

impl ResolutionOutcome {
    pub fn timestamp(&self) -> Option<CaptureTimestamp> {
        match self {
            ResolutionOutcome::Resolved { timestamp, .. } => Some(*timestamp),
            ResolutionOutcome::Unresolved => None,
        }
    }
}

/// An image file whose pixels are decoded on first use
#[derive(Debug)]
pub struct ImageReference {
    path: PathBuf,
    pixels: OnceLock<Option<DynamicImage>>,
}

impl ImageReference {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pixels: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name including the extension
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|f| f.to_str())
    }

    /// Decoded pixels, or `None` if the file cannot be decoded
    pub fn pixels(&self) -> Option<&DynamicImage> {
        self.pixels
            .get_or_init(|| match load_pixels(&self.path) {
                Ok(img) => Some(img),
                Err(e) => {
                    warn!(path = ?self.path, error = %e, "Failed to decode image");
                    None
                }
            })
            .as_ref()
    }
}

/// Decode an image, sniffing the format from content so extension-less files work
pub fn load_pixels(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| Error::ImageDecode {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Shared flag telling a running optical stage to stop
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Pluggable last stage of the cascade.
///
/// Implementations should check `cancel` between units of work and return
/// `None` promptly once it is set.
pub trait OpticalStage: Send + Sync {
    fn extract(&self, pixels: &DynamicImage, cancel: &CancellationToken) -> Option<CaptureTimestamp>;
}

/// Tries each date source in order of cost until one succeeds
pub struct Cascade {
    optical: Option<Arc<dyn OpticalStage>>,
    optical_timeout: Duration,
    sink: Arc<dyn EventSink>,
}

impl Cascade {
    /// Metadata and filename stages only
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            optical: None,
            optical_timeout: Duration::ZERO,
            sink,
        }
    }

    /// Enable the optical stage. A zero timeout waits indefinitely.
    pub fn with_optical(mut self, stage: Arc<dyn OpticalStage>, timeout: Duration) -> Self {
        self.optical = Some(stage);
        self.optical_timeout = timeout;
        self
    }

    pub fn optical_enabled(&self) -> bool {
        self.optical.is_some()
    }

    /// Resolve the capture time of one image
    pub fn resolve(&self, image: &ImageReference) -> ResolutionOutcome {
        let path = image.path();

        let timestamp = exif::read_capture_time(path);
        self.report(path, TimeSource::Metadata, timestamp);
        if let Some(timestamp) = timestamp {
            return ResolutionOutcome::Resolved {
                timestamp,
                source: TimeSource::Metadata,
            };
        }

        let timestamp = image.file_name().and_then(filename::extract);
        self.report(path, TimeSource::Filename, timestamp);
        if let Some(timestamp) = timestamp {
            return ResolutionOutcome::Resolved {
                timestamp,
                source: TimeSource::Filename,
            };
        }

        if let Some(stage) = &self.optical {
            let timestamp = self.run_optical(stage, image);
            self.report(path, TimeSource::Optical, timestamp);
            if let Some(timestamp) = timestamp {
                return ResolutionOutcome::Resolved {
                    timestamp,
                    source: TimeSource::Optical,
                };
            }
        }

        ResolutionOutcome::Unresolved
    }

    /// Run the optical stage on a helper thread, cancelling it once the budget is spent
    fn run_optical(
        &self,
        stage: &Arc<dyn OpticalStage>,
        image: &ImageReference,
    ) -> Option<CaptureTimestamp> {
        let pixels = image.pixels()?.clone();
        let cancel = CancellationToken::new();

        if self.optical_timeout.is_zero() {
            return stage.extract(&pixels, &cancel);
        }

        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(stage);
        let worker_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name("optical".into())
            .spawn(move || {
                let _ = tx.send(worker.extract(&pixels, &worker_cancel));
            });
        if let Err(e) = spawned {
            warn!(path = ?image.path(), error = %e, "Could not start optical worker");
            return None;
        }

        match rx.recv_timeout(self.optical_timeout) {
            Ok(timestamp) => timestamp,
            Err(RecvTimeoutError::Timeout) => {
                // The worker stops at its next check and kills any running recognizer
                cancel.cancel();
                self.sink.emit(&FileEvent::StageTimedOut {
                    path: image.path().to_path_buf(),
                    source: TimeSource::Optical,
                });
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                trace!(path = ?image.path(), "Optical worker exited without a result");
                None
            }
        }
    }

    fn report(&self, path: &Path, source: TimeSource, timestamp: Option<CaptureTimestamp>) {
        self.sink.emit(&FileEvent::StageFinished {
            path: path.to_path_buf(),
            source,
            timestamp,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::testing::RecordingSink;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::sync::atomic::AtomicUsize;

    struct FixedStage {
        result: Option<CaptureTimestamp>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedStage {
        fn new(result: Option<CaptureTimestamp>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                result,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl OpticalStage for FixedStage {
        fn extract(&self, _pixels: &DynamicImage, _cancel: &CancellationToken) -> Option<CaptureTimestamp> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.result
        }
    }

    /// Works in small steps until cancelled, recording whether it saw the flag
    #[derive(Default)]
    struct PatientStage {
        steps: AtomicUsize,
        stopped: AtomicBool,
    }

    impl OpticalStage for PatientStage {
        fn extract(&self, _pixels: &DynamicImage, cancel: &CancellationToken) -> Option<CaptureTimestamp> {
            for _ in 0..100 {
                if cancel.is_cancelled() {
                    self.stopped.store(true, Ordering::SeqCst);
                    return None;
                }
                self.steps.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
            }
            Some(stamp())
        }
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(8, 8, Rgb([90, 90, 90]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    fn stamp() -> CaptureTimestamp {
        CaptureTimestamp::from_parts(1998, 12, 25, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_capture_timestamp_validation() {
        assert!(CaptureTimestamp::from_parts(2021, 3, 4, 10, 15, 30).is_some());
        assert!(CaptureTimestamp::from_parts(0, 3, 4, 0, 0, 0).is_none());
        assert!(CaptureTimestamp::from_parts(2021, 0, 4, 0, 0, 0).is_none());
        assert!(CaptureTimestamp::from_parts(2021, 3, 0, 0, 0, 0).is_none());
        assert!(CaptureTimestamp::from_parts(2021, 2, 29, 0, 0, 0).is_none());
        assert!(CaptureTimestamp::from_parts(2021, 3, 4, 24, 0, 0).is_none());
    }

    #[test]
    fn test_capture_timestamp_formatting() {
        let ts = CaptureTimestamp::from_parts(2021, 3, 4, 10, 15, 30).unwrap();
        assert_eq!(ts.year(), 2021);
        assert_eq!(ts.month_name(), "March");
        assert_eq!(ts.iso_date(), "2021-03-04");
        assert_eq!(ts.clock(), "10:15:30");
        assert_eq!(ts.to_string(), "2021-03-04 10:15:30");
    }

    #[test]
    fn test_filename_stage_wins_before_optical() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "IMG_20240115_143000.png");
        let stage = FixedStage::new(Some(stamp()), Duration::ZERO);
        let cascade = Cascade::new(Arc::new(RecordingSink::default()))
            .with_optical(stage.clone(), Duration::from_secs(5));

        let outcome = cascade.resolve(&ImageReference::new(path));
        assert_eq!(
            outcome,
            ResolutionOutcome::Resolved {
                timestamp: CaptureTimestamp::from_parts(2024, 1, 15, 14, 30, 0).unwrap(),
                source: TimeSource::Filename,
            }
        );
        assert_eq!(stage.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_optical_stage_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "scan.png");

        let sink = Arc::new(RecordingSink::default());
        let disabled = Cascade::new(sink.clone());
        assert!(!disabled.optical_enabled());
        assert_eq!(
            disabled.resolve(&ImageReference::new(&path)),
            ResolutionOutcome::Unresolved
        );
        let sources: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                FileEvent::StageFinished { source, .. } => Some(source),
                _ => None,
            })
            .collect();
        assert_eq!(sources, vec![TimeSource::Metadata, TimeSource::Filename]);

        let stage = FixedStage::new(Some(stamp()), Duration::ZERO);
        let enabled = Cascade::new(Arc::new(RecordingSink::default()))
            .with_optical(stage.clone(), Duration::from_secs(5));
        assert_eq!(
            enabled.resolve(&ImageReference::new(&path)),
            ResolutionOutcome::Resolved {
                timestamp: stamp(),
                source: TimeSource::Optical,
            }
        );
        assert_eq!(stage.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_optical_timeout_counts_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "slow.png");
        let sink = Arc::new(RecordingSink::default());
        let stage = FixedStage::new(Some(stamp()), Duration::from_millis(500));
        let cascade =
            Cascade::new(sink.clone()).with_optical(stage, Duration::from_millis(20));

        assert_eq!(
            cascade.resolve(&ImageReference::new(&path)),
            ResolutionOutcome::Unresolved
        );
        assert!(sink.events().contains(&FileEvent::StageTimedOut {
            path: path.clone(),
            source: TimeSource::Optical,
        }));
    }

    #[test]
    fn test_timeout_cancels_optical_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "hung.png");
        let stage = Arc::new(PatientStage::default());
        let cascade = Cascade::new(Arc::new(RecordingSink::default()))
            .with_optical(stage.clone(), Duration::from_millis(30));

        assert_eq!(
            cascade.resolve(&ImageReference::new(&path)),
            ResolutionOutcome::Unresolved
        );
        thread::sleep(Duration::from_millis(200));
        assert!(stage.stopped.load(Ordering::SeqCst));
        let steps = stage.steps.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(stage.steps.load(Ordering::SeqCst), steps);
        assert!(steps < 100);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_undecodable_file_skips_optical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let stage = FixedStage::new(Some(stamp()), Duration::ZERO);
        let cascade = Cascade::new(Arc::new(RecordingSink::default()))
            .with_optical(stage.clone(), Duration::ZERO);

        let image = ImageReference::new(&path);
        assert!(image.pixels().is_none());
        assert_eq!(cascade.resolve(&image), ResolutionOutcome::Unresolved);
        assert_eq!(stage.calls.load(Ordering::SeqCst), 0);
    }
}
