//! Placement of images into the dated tree
//!
//! Resolved images go to `<root>/<year>/<MonthName>/`, unresolved ones are
//! copied to `<root>/unsorted/`. A sorted destination is never overwritten.

use crate::config::{Config, FileOperation};
use crate::event::{EventSink, FileEvent};
use crate::time::{CaptureTimestamp, ImageReference, ResolutionOutcome};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;
use tracing::trace;

/// Folder for images without a capture time
pub const UNSORTED_DIR: &str = "unsorted";

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStatus {
    /// Copied or moved into the dated tree
    Placed,
    /// Destination already existed
    Skipped,
    /// No capture time, copied to the unsorted folder
    Unsorted,
    /// I/O error while placing
    Failed,
}

/// Result of placing a single file
#[derive(Debug, Clone)]
pub struct PlacementResult {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub outcome: ResolutionOutcome,
    pub status: PlacementStatus,
    pub error: Option<String>,
}

/// Run counters. Every examined file lands in exactly one of the other four.
#[derive(Debug, Default)]
pub struct RunTally {
    pub examined: AtomicUsize,
    pub placed: AtomicUsize,
    pub skipped: AtomicUsize,
    pub unresolved: AtomicUsize,
    pub failed: AtomicUsize,
}

/// Plain copy of the counters at one point in time
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TallySummary {
    pub examined: usize,
    pub placed: usize,
    pub skipped: usize,
    pub unresolved: usize,
    pub failed: usize,
}

impl RunTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TallySummary {
        TallySummary {
            examined: self.examined.load(Ordering::Relaxed),
            placed: self.placed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Total: {}, Placed: {}, Skipped: {}, Unsorted: {}, Failed: {}",
            s.examined, s.placed, s.skipped, s.unresolved, s.failed
        )
    }
}

/// How resolved files are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlacementOptions {
    pub operation: FileOperation,
    pub rename: bool,
}

impl From<&Config> for PlacementOptions {
    fn from(config: &Config) -> Self {
        Self {
            operation: config.operation,
            rename: config.rename,
        }
    }
}

/// Computes destinations and performs the copy or move
pub struct Placer {
    root: PathBuf,
    options: PlacementOptions,
    tally: Arc<RunTally>,
    sink: Arc<dyn EventSink>,
}

impl Placer {
    pub fn new(
        root: impl Into<PathBuf>,
        options: PlacementOptions,
        tally: Arc<RunTally>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            root: root.into(),
            options,
            tally,
            sink,
        }
    }

    pub fn tally(&self) -> &RunTally {
        &self.tally
    }

    /// `<root>/<year>/<MonthName>`
    pub fn target_dir(&self, timestamp: &CaptureTimestamp) -> PathBuf {
        self.root
            .join(timestamp.year().to_string())
            .join(timestamp.month_name())
    }

    /// Original name, or `<YYYY-MM-DD>_(<HH:MM:SS>)<.ext>` when renaming
    pub fn target_name(&self, source: &Path, timestamp: &CaptureTimestamp) -> Option<OsString> {
        if !self.options.rename {
            return source.file_name().map(|n| n.to_os_string());
        }

        let mut name = OsString::from(format!("{}_({})", timestamp.iso_date(), timestamp.clock()));
        if let Some(ext) = source.extension() {
            name.push(".");
            name.push(ext);
        }
        Some(name)
    }

    /// Place one file according to its resolution outcome
    pub fn place(&self, image: &ImageReference, outcome: &ResolutionOutcome) -> PlacementResult {
        self.tally.examined.fetch_add(1, Ordering::Relaxed);

        let result = match outcome.timestamp() {
            Some(timestamp) => self.place_sorted(image.path(), &timestamp),
            None => self.place_unsorted(image.path()),
        };

        let (status, destination, error) = match result {
            Ok((status, destination)) => (status, Some(destination), None),
            Err((destination, e)) => {
                let error = e.to_string();
                self.sink.emit(&FileEvent::Failed {
                    source: image.path().to_path_buf(),
                    error: error.clone(),
                });
                (PlacementStatus::Failed, destination, Some(error))
            }
        };

        let counter = match status {
            PlacementStatus::Placed => &self.tally.placed,
            PlacementStatus::Skipped => &self.tally.skipped,
            PlacementStatus::Unsorted => &self.tally.unresolved,
            PlacementStatus::Failed => &self.tally.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        PlacementResult {
            source: image.path().to_path_buf(),
            destination,
            outcome: *outcome,
            status,
            error,
        }
    }

    fn place_sorted(
        &self,
        source: &Path,
        timestamp: &CaptureTimestamp,
    ) -> Result<(PlacementStatus, PathBuf), (Option<PathBuf>, io::Error)> {
        let year_dir = self.root.join(timestamp.year().to_string());
        let month_dir = self.target_dir(timestamp);
        for dir in [&self.root, &year_dir, &month_dir] {
            self.ensure_dir(dir).map_err(|e| (None, e))?;
        }

        let name = self.target_name(source, timestamp).ok_or_else(|| {
            (
                None,
                io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
            )
        })?;
        let dest = month_dir.join(name);

        if dest.exists() {
            self.skip(source, &dest);
            return Ok((PlacementStatus::Skipped, dest));
        }

        let written = match self.options.operation {
            FileOperation::Copy => copy_new(source, &dest),
            FileOperation::Move => move_new(source, &dest),
        }
        .map_err(|e| (Some(dest.clone()), e))?;

        // Lost a race against another worker for the same name
        if !written {
            self.skip(source, &dest);
            return Ok((PlacementStatus::Skipped, dest));
        }

        self.sink.emit(&FileEvent::Placed {
            source: source.to_path_buf(),
            destination: dest.clone(),
            operation: self.options.operation,
        });
        Ok((PlacementStatus::Placed, dest))
    }

    /// Unresolved files are always copied; same-named files in `unsorted` are overwritten
    fn place_unsorted(
        &self,
        source: &Path,
    ) -> Result<(PlacementStatus, PathBuf), (Option<PathBuf>, io::Error)> {
        let dir = self.root.join(UNSORTED_DIR);
        self.ensure_dir(&dir).map_err(|e| (None, e))?;

        let name = source.file_name().ok_or_else(|| {
            (
                None,
                io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
            )
        })?;
        let dest = dir.join(name);

        replace_file(source, &dest).map_err(|e| (Some(dest.clone()), e))?;

        self.sink.emit(&FileEvent::Unsorted {
            source: source.to_path_buf(),
            destination: dest.clone(),
        });
        Ok((PlacementStatus::Unsorted, dest))
    }

    fn skip(&self, source: &Path, existing: &Path) {
        self.sink.emit(&FileEvent::Skipped {
            source: source.to_path_buf(),
            existing: existing.to_path_buf(),
        });
    }

    /// Create a directory if missing; an existing directory is not an error
    fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        if dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(dir)?;
        self.sink.emit(&FileEvent::DirectoryCreated {
            path: dir.to_path_buf(),
        });
        Ok(())
    }
}

/// Copy into a file that must not exist yet. Returns `false` if it already does.
fn copy_new(source: &Path, dest: &Path) -> io::Result<bool> {
    let dest_file = match OpenOptions::new().write(true).create_new(true).open(dest) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e),
    };

    if let Err(e) = copy_contents(source, dest_file) {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    preserve_mtime(source, dest);
    Ok(true)
}

/// Move without clobbering. Returns `false` if the destination already exists.
fn move_new(source: &Path, dest: &Path) -> io::Result<bool> {
    move_new_with(source, dest, |path: &Path| fs::remove_file(path))
}

/// A move that cannot remove its source takes the new entry back, leaving
/// the source as the only copy.
fn move_new_with(
    source: &Path,
    dest: &Path,
    remove_source: impl Fn(&Path) -> io::Result<()>,
) -> io::Result<bool> {
    let placed = match fs::hard_link(source, dest) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => false,
        Err(e) => {
            // Different filesystem or no link support: copy then delete
            trace!(?source, ?dest, error = %e, "Hard link failed, falling back to copy");
            copy_new(source, dest)?
        }
    };
    if !placed {
        return Ok(false);
    }

    if let Err(e) = remove_source(source) {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    Ok(true)
}

/// Copy into a staged file beside `dest`, then rename it over any existing
/// destination. Concurrent writers of the same name never mix their bytes.
fn replace_file(source: &Path, dest: &Path) -> io::Result<()> {
    let dir = dest.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent")
    })?;

    let mut staged = NamedTempFile::new_in(dir)?;
    copy_contents(source, staged.as_file_mut())?;
    if let Ok(metadata) = fs::metadata(source) {
        let _ = fs::set_permissions(staged.path(), metadata.permissions());
    }
    preserve_mtime(source, staged.path());

    staged.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

fn copy_contents(source: &Path, dest_file: impl Write) -> io::Result<()> {
    let src_file = File::open(source)?;

    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, src_file);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dest_file);

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
    }

    writer.flush()
}

/// Preserve modification time
fn preserve_mtime(source: &Path, dest: &Path) {
    if let Ok(metadata) = fs::metadata(source)
        && let Ok(mtime) = metadata.modified()
    {
        let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
    }
}
