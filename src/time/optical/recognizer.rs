//! Single-line text recognition backends
//!
//! The default backend runs the `tesseract` executable; enabling the
//! `tesseract-lib` feature links libtesseract instead.

use crate::error::{Error, Result};
use crate::time::CancellationToken;
use image::{DynamicImage, ImageFormat};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Tesseract page segmentation mode: treat the image as a single text line
pub const SINGLE_LINE_PSM: &str = "7";

/// How often a running recognizer process is checked for exit or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Turns an image of one short line of text into a string
pub trait TextRecognizer: Send + Sync {
    /// Recognized text, trimmed. An image without text yields an empty string.
    /// Work in progress is abandoned once `cancel` is set.
    fn recognize_line(&self, image: &DynamicImage, cancel: &CancellationToken) -> Result<String>;
}

/// Wait for `child` to exit, killing it if cancellation is requested first.
/// Returns `None` when the process was killed.
fn wait_or_cancel(child: &mut Child, cancel: &CancellationToken) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if cancel.is_cancelled() {
            // Exited between the two checks: kill reports an error we can ignore
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Encode a view losslessly for the recognizer
fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Recognition through the `tesseract` command line tool
#[derive(Debug)]
pub struct TesseractCli {
    command: PathBuf,
    language: String,
    available: OnceLock<bool>,
}

impl TesseractCli {
    pub fn new(command: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
            available: OnceLock::new(),
        }
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Check if the executable can be started (cached)
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let ok = Command::new(&self.command)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok();
            if !ok {
                warn!(command = ?self.command, "Tesseract not found, optical recovery will find nothing");
            }
            ok
        })
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize_line(&self, image: &DynamicImage, cancel: &CancellationToken) -> Result<String> {
        if !self.is_available() {
            return Err(Error::RecognizerNotFound(self.command.display().to_string()));
        }

        let png = encode_png(image)?;

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "--psm", SINGLE_LINE_PSM, "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Tesseract reads the whole image before writing anything
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png)?;
        }

        // Single-line output stays well below the pipe buffer, so polling cannot deadlock
        let Some(status) = wait_or_cancel(&mut child, cancel)? else {
            debug!(command = ?self.command, "Killed tesseract after cancellation");
            return Err(Error::Recognition("cancelled".into()));
        };

        let mut stdout = Vec::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_end(&mut stdout)?;
        }
        let mut stderr = Vec::new();
        if let Some(mut err) = child.stderr.take() {
            err.read_to_end(&mut stderr)?;
        }

        if !status.success() {
            return Err(Error::Recognition(format!(
                "tesseract exited with {}: {}",
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&stdout).trim().to_string();
        trace!(text = %text, "Tesseract output");
        Ok(text)
    }
}

/// Recognition through libtesseract
#[cfg(feature = "tesseract-lib")]
#[derive(Debug, Clone)]
pub struct TesseractLib {
    language: String,
}

#[cfg(feature = "tesseract-lib")]
impl TesseractLib {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

#[cfg(feature = "tesseract-lib")]
impl TextRecognizer for TesseractLib {
    fn recognize_line(&self, image: &DynamicImage, cancel: &CancellationToken) -> Result<String> {
        // libtesseract cannot be interrupted mid-call; only check before starting
        if cancel.is_cancelled() {
            return Err(Error::Recognition("cancelled".into()));
        }
        let png = encode_png(image)?;

        let mut engine = tesseract::Tesseract::new(None, Some(&self.language))
            .map_err(|e| Error::Recognition(format!("initialization failed: {e}")))?
            .set_variable("tessedit_pageseg_mode", SINGLE_LINE_PSM)
            .map_err(|e| Error::Recognition(format!("failed to set page mode: {e}")))?
            .set_image_from_mem(&png)
            .map_err(|e| Error::Recognition(format!("failed to set image: {e}")))?;

        let text = engine
            .get_text()
            .map_err(|e| Error::Recognition(format!("extraction failed: {e}")))?;
        Ok(text.trim().to_string())
    }
}
