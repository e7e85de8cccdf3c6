//! EXIF capture time

use super::CaptureTimestamp;
use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::trace;

/// EXIF tags to try for date extraction, in priority order
const DATE_TAGS: &[Tag] = &[
    Tag::DateTimeOriginal,    // When the original image was taken
    Tag::DateTimeDigitized,   // When the image was digitized
    Tag::DateTime,            // File modification date/time
];

/// Fixed EXIF datetime format
const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Capture time from EXIF metadata, or `None` when absent or unparsable
pub fn read_capture_time(path: &Path) -> Option<CaptureTimestamp> {
    match extract_exif_time(path) {
        Ok(timestamp) => Some(timestamp),
        Err(e) => {
            trace!(?path, error = %e, "No EXIF capture time");
            None
        }
    }
}

/// Extract creation time from EXIF metadata
pub fn extract_exif_time(path: &Path) -> Result<CaptureTimestamp> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let exif = Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| Error::ExifRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    // Try each date tag in priority order
    for tag in DATE_TAGS {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY) {
            if let Value::Ascii(ref values) = field.value
                && let Some(raw) = values.first()
                && let Some(timestamp) = parse_exif_datetime(&String::from_utf8_lossy(raw))
            {
                trace!(?path, ?tag, "Found EXIF date");
                return Ok(timestamp);
            }
            trace!(?path, ?tag, "EXIF date present but unparsable");
        }
    }

    Err(Error::ExifRead {
        path: path.to_path_buf(),
        message: "No valid date tag found in EXIF data".to_string(),
    })
}

/// Parse EXIF datetime string format: "YYYY:MM:DD HH:MM:SS"
fn parse_exif_datetime(s: &str) -> Option<CaptureTimestamp> {
    // Some writers pad with NULs or wrap the value in quotes
    let s = s.trim_matches(|c: char| c == '\0' || c == '"' || c.is_whitespace());

    NaiveDateTime::parse_from_str(s, EXIF_FORMAT)
        .ok()
        .and_then(CaptureTimestamp::from_datetime)
}
