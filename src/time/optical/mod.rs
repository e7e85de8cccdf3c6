//! Date stamp recovery from pixels
//!
//! Older compact cameras burn the capture date into the picture in an orange
//! font. The stamp is isolated by color, read from two complementary views
//! and accepted only when the two readings agree or exactly one of them
//! yields a date. Otherwise both views are turned a quarter and read again,
//! at most [`MAX_ROTATIONS`] times.

pub mod mask;
pub mod recognizer;

use super::detect::detect;
use super::{CancellationToken, CaptureTimestamp, OpticalStage};
use image::DynamicImage;
use mask::{RecognitionViews, WarmBand};
use recognizer::TextRecognizer;
use tracing::{debug, trace};

/// Quarter turns tried before giving up
pub const MAX_ROTATIONS: usize = 4;

/// Outcome of one reading of both views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<T> {
    Accept(T),
    Rotate,
}

/// Consensus rule for one attempt.
///
/// Equal readings are accepted, a single reading is accepted, two different
/// readings or no reading at all ask for the next rotation.
pub fn judge<T: PartialEq>(masked: Option<T>, inverted: Option<T>) -> Verdict<T> {
    match (masked, inverted) {
        (Some(a), Some(b)) if a == b => Verdict::Accept(a),
        (Some(_), Some(_)) => Verdict::Rotate,
        (Some(a), None) | (None, Some(a)) => Verdict::Accept(a),
        (None, None) => Verdict::Rotate,
    }
}

/// First accepted value over at most [`MAX_ROTATIONS`] attempts.
///
/// Attempts are pulled lazily, so nothing past the accepted one is evaluated.
pub fn consensus<T, I>(attempts: I) -> Option<T>
where
    T: PartialEq,
    I: IntoIterator<Item = (Option<T>, Option<T>)>,
{
    attempts
        .into_iter()
        .take(MAX_ROTATIONS)
        .find_map(|(masked, inverted)| match judge(masked, inverted) {
            Verdict::Accept(value) => Some(value),
            Verdict::Rotate => None,
        })
}

/// Both readings of one rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpticalCandidate {
    pub quarter_turns: usize,
    pub masked_text: Option<String>,
    pub inverted_text: Option<String>,
    pub masked: Option<CaptureTimestamp>,
    pub inverted: Option<CaptureTimestamp>,
}

/// Reads a burned-in date stamp using any [`TextRecognizer`]
pub struct OpticalExtractor<R> {
    recognizer: R,
    band: WarmBand,
}

impl<R: TextRecognizer> OpticalExtractor<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            band: WarmBand::default(),
        }
    }

    pub fn with_band(mut self, band: WarmBand) -> Self {
        self.band = band;
        self
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Recover the stamp, giving up early once `cancel` is set
    pub fn extract(&self, pixels: &DynamicImage, cancel: &CancellationToken) -> Option<CaptureTimestamp> {
        let views = RecognitionViews::from_image(pixels, &self.band);
        if views.is_blank() {
            debug!("No stamp-colored pixels");
            return None;
        }

        let found = consensus(
            self.attempts(&views, cancel)
                .map(|candidate| (candidate.masked, candidate.inverted)),
        );
        match found {
            Some(timestamp) => debug!(%timestamp, "Recovered date stamp"),
            None => debug!("No agreement on a date stamp after all rotations"),
        }
        found
    }

    /// Readings for each rotation, produced on demand until cancelled
    pub fn attempts<'a>(
        &'a self,
        views: &'a RecognitionViews,
        cancel: &'a CancellationToken,
    ) -> impl Iterator<Item = OpticalCandidate> + 'a {
        (0..MAX_ROTATIONS)
            .take_while(move |_| !cancel.is_cancelled())
            .map(move |quarter_turns| self.read(&views.rotated(quarter_turns), quarter_turns, cancel))
    }

    fn read(
        &self,
        views: &RecognitionViews,
        quarter_turns: usize,
        cancel: &CancellationToken,
    ) -> OpticalCandidate {
        let masked_text =
            self.recognize(DynamicImage::ImageRgb8(views.masked.clone()), "masked", cancel);
        let inverted_text =
            self.recognize(DynamicImage::ImageLuma8(views.inverted.clone()), "inverted", cancel);

        let candidate = OpticalCandidate {
            quarter_turns,
            masked: masked_text.as_deref().and_then(detect),
            inverted: inverted_text.as_deref().and_then(detect),
            masked_text,
            inverted_text,
        };
        trace!(?candidate, "Optical attempt");
        candidate
    }

    /// A failing recognizer counts as no text for this view
    fn recognize(&self, image: DynamicImage, view: &str, cancel: &CancellationToken) -> Option<String> {
        if cancel.is_cancelled() {
            return None;
        }
        match self.recognizer.recognize_line(&image, cancel) {
            Ok(text) if text.is_empty() => None,
            Ok(text) => Some(text),
            Err(e) => {
                debug!(view, error = %e, "Text recognition failed");
                None
            }
        }
    }
}

impl<R: TextRecognizer> OpticalStage for OpticalExtractor<R> {
    fn extract(&self, pixels: &DynamicImage, cancel: &CancellationToken) -> Option<CaptureTimestamp> {
        OpticalExtractor::extract(self, pixels, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::event::testing::RecordingSink;
    use crate::time::{Cascade, ImageReference, ResolutionOutcome};
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    /// Replays canned answers and remembers the shape of every view it saw
    #[derive(Default)]
    struct ScriptedRecognizer {
        answers: Mutex<VecDeque<Result<String>>>,
        seen: Mutex<Vec<(u32, u32)>>,
    }

    impl ScriptedRecognizer {
        fn new(answers: Vec<Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                seen: Mutex::default(),
            }
        }

        fn text(answers: &[&str]) -> Self {
            Self::new(answers.iter().map(|a| Ok(a.to_string())).collect())
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn recognize_line(&self, image: &DynamicImage, _cancel: &CancellationToken) -> Result<String> {
            self.seen.lock().unwrap().push(image.dimensions());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    /// Never finds text and takes a while doing so
    struct SlowRecognizer {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl TextRecognizer for SlowRecognizer {
        fn recognize_line(&self, _image: &DynamicImage, _cancel: &CancellationToken) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(String::new())
        }
    }

    fn stamped_image() -> DynamicImage {
        let mut img = RgbImage::from_pixel(40, 10, Rgb([60, 60, 60]));
        for x in 30..38 {
            for y in 6..9 {
                img.put_pixel(x, y, Rgb([255, 140, 0]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    fn ts(y: i32, mo: u32, d: u32) -> CaptureTimestamp {
        CaptureTimestamp::from_parts(y, mo, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_judge() {
        assert_eq!(judge(Some(1), Some(1)), Verdict::Accept(1));
        assert_eq!(judge(Some(1), None), Verdict::Accept(1));
        assert_eq!(judge(None, Some(2)), Verdict::Accept(2));
        assert_eq!(judge(Some(1), Some(2)), Verdict::Rotate);
        assert_eq!(judge::<i32>(None, None), Verdict::Rotate);
    }

    #[test]
    fn test_consensus_accepts_without_rotating() {
        let pulled = Cell::new(0);
        let attempts = [(Some(7), Some(7)), (Some(1), None)]
            .into_iter()
            .inspect(|_| pulled.set(pulled.get() + 1));
        assert_eq!(consensus(attempts), Some(7));
        assert_eq!(pulled.get(), 1);
    }

    #[test]
    fn test_consensus_rotates_on_conflict() {
        let attempts = vec![(Some(1), Some(2)), (None, None), (None, Some(3))];
        assert_eq!(consensus(attempts), Some(3));
    }

    #[test]
    fn test_consensus_gives_up_after_four() {
        let pulled = Cell::new(0);
        let attempts = std::iter::repeat((Some(1), Some(2)))
            .chain(std::iter::once((Some(5), Some(5))))
            .inspect(|_| pulled.set(pulled.get() + 1));
        assert_eq!(consensus(attempts), None);
        assert_eq!(pulled.get(), MAX_ROTATIONS);

        let late = vec![(None, None), (None, None), (None, None), (None, None), (Some(9), None)];
        assert_eq!(consensus(late), None);
    }

    #[test]
    fn test_extract_agreeing_views() {
        let recognizer = ScriptedRecognizer::text(&["'98 12 25", "12 25 '98"]);
        let extractor = OpticalExtractor::new(recognizer);
        assert_eq!(extractor.extract(&stamped_image(), &CancellationToken::new()), Some(ts(1998, 12, 25)));
        assert_eq!(extractor.recognizer().calls(), 2);
    }

    #[test]
    fn test_extract_single_reading_accepted() {
        let recognizer = ScriptedRecognizer::text(&["~#@!", "2005-06-12"]);
        let extractor = OpticalExtractor::new(recognizer);
        assert_eq!(extractor.extract(&stamped_image(), &CancellationToken::new()), Some(ts(2005, 6, 12)));
        assert_eq!(extractor.recognizer().calls(), 2);
    }

    #[test]
    fn test_extract_conflict_then_rotation() {
        let recognizer = ScriptedRecognizer::text(&[
            "2005-06-12",
            "2005-06-13",
            "",
            "",
            "2001-01-02",
            "2001-01-02",
        ]);
        let extractor = OpticalExtractor::new(recognizer);
        assert_eq!(extractor.extract(&stamped_image(), &CancellationToken::new()), Some(ts(2001, 1, 2)));

        // Both views of each attempt share a rotation; odd turns swap the sides
        let seen = extractor.recognizer().seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(40, 10), (40, 10), (10, 40), (10, 40), (40, 10), (40, 10)]
        );
    }

    #[test]
    fn test_extract_gives_up_after_all_rotations() {
        let recognizer = ScriptedRecognizer::text(&[
            "2005-06-12", "2005-06-13",
            "2005-06-12", "2005-06-13",
            "2005-06-12", "2005-06-13",
            "2005-06-12", "2005-06-13",
            "2005-06-12", "2005-06-12",
        ]);
        let extractor = OpticalExtractor::new(recognizer);
        assert_eq!(extractor.extract(&stamped_image(), &CancellationToken::new()), None);
        assert_eq!(extractor.recognizer().calls(), 2 * MAX_ROTATIONS);
    }

    #[test]
    fn test_recognizer_failure_counts_as_absent() {
        let recognizer = ScriptedRecognizer::new(vec![
            Err(Error::Recognition("engine crashed".into())),
            Ok("2010-10-10".into()),
        ]);
        let extractor = OpticalExtractor::new(recognizer);
        assert_eq!(extractor.extract(&stamped_image(), &CancellationToken::new()), Some(ts(2010, 10, 10)));
    }

    #[test]
    fn test_blank_mask_skips_recognition() {
        let plain = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([30, 30, 200])));
        let extractor = OpticalExtractor::new(ScriptedRecognizer::text(&["2010-10-10"]));
        assert_eq!(extractor.extract(&plain, &CancellationToken::new()), None);
        assert_eq!(extractor.recognizer().calls(), 0);
    }

    #[test]
    fn test_attempt_texts_are_kept() {
        let extractor = OpticalExtractor::new(ScriptedRecognizer::text(&["noise", "2010-10-10"]));
        let views = RecognitionViews::from_image(&stamped_image(), &WarmBand::default());
        let cancel = CancellationToken::new();
        let first = extractor.attempts(&views, &cancel).next().unwrap();
        assert_eq!(first.quarter_turns, 0);
        assert_eq!(first.masked_text.as_deref(), Some("noise"));
        assert_eq!(first.masked, None);
        assert_eq!(first.inverted, Some(ts(2010, 10, 10)));
    }

    #[test]
    fn test_cancelled_before_start_reads_nothing() {
        let extractor = OpticalExtractor::new(ScriptedRecognizer::text(&["2010-10-10"]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(extractor.extract(&stamped_image(), &cancel), None);
        assert_eq!(extractor.recognizer().calls(), 0);
    }

    #[test]
    fn test_no_recognition_after_cascade_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamped.png");
        stamped_image().save_with_format(&path, ImageFormat::Png).unwrap();

        let extractor = Arc::new(OpticalExtractor::new(SlowRecognizer {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(100),
        }));
        let cascade = Cascade::new(Arc::new(RecordingSink::default()))
            .with_optical(extractor.clone(), Duration::from_millis(30));

        assert_eq!(
            cascade.resolve(&ImageReference::new(&path)),
            ResolutionOutcome::Unresolved
        );
        // Only the call in flight at the deadline ever ran
        thread::sleep(Duration::from_millis(400));
        assert!(extractor.recognizer().calls.load(Ordering::SeqCst) <= 1);
    }
}
