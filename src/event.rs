//! Structured per-file events
//!
//! The cascade and the placement engine report what they do through an
//! [`EventSink`] instead of printing. The binary installs [`TracingSink`];
//! tests install sinks that record events.

use crate::config::FileOperation;
use crate::time::{CaptureTimestamp, TimeSource};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Something that happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// A date source was consulted
    StageFinished {
        path: PathBuf,
        source: TimeSource,
        timestamp: Option<CaptureTimestamp>,
    },
    /// The optical stage ran past its time budget
    StageTimedOut { path: PathBuf, source: TimeSource },
    /// A destination directory did not exist and was created
    DirectoryCreated { path: PathBuf },
    /// The file was copied or moved into the sorted tree
    Placed {
        source: PathBuf,
        destination: PathBuf,
        operation: FileOperation,
    },
    /// The computed destination already exists
    Skipped { source: PathBuf, existing: PathBuf },
    /// No date found, copied to the unsorted folder
    Unsorted { source: PathBuf, destination: PathBuf },
    /// Placement failed with an I/O error
    Failed { source: PathBuf, error: String },
}

/// Receiver of per-file events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &FileEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &FileEvent) {
        match event {
            FileEvent::StageFinished {
                path,
                source,
                timestamp: Some(timestamp),
            } => debug!(?path, ?source, %timestamp, "Resolved capture time"),
            FileEvent::StageFinished {
                path,
                source,
                timestamp: None,
            } => debug!(?path, ?source, "No capture time"),
            FileEvent::StageTimedOut { path, source } => {
                warn!(?path, ?source, "Date recovery timed out")
            }
            FileEvent::DirectoryCreated { path } => debug!(?path, "Created directory"),
            FileEvent::Placed {
                source,
                destination,
                operation,
            } => debug!(?source, ?destination, ?operation, "Placed file"),
            FileEvent::Skipped { source, existing } => {
                debug!(?source, ?existing, "File already exists, skipping")
            }
            FileEvent::Unsorted {
                source,
                destination,
            } => info!(?source, ?destination, "No capture time found, copied to unsorted"),
            FileEvent::Failed { source, error } => warn!(?source, error = %error, "Failed to place file"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every event for later assertions
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<FileEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<FileEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &FileEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
