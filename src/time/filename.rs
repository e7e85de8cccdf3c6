//! Filename timestamp parsing

use super::CaptureTimestamp;
use super::detect::detect;
use std::borrow::Cow;
use tracing::trace;

/// Separators rewritten before detection; `10;15;30` is how some tools store `10:15:30`
const MAX_SEMICOLON_REWRITES: usize = 2;

/// Parse a capture time from a file's base name
pub fn extract(basename: &str) -> Option<CaptureTimestamp> {
    let normalized = normalize_separators(basename);
    let found = detect(&normalized);
    if let Some(timestamp) = found {
        trace!(basename, %timestamp, "Matched date in filename");
    }
    found
}

/// Replace the first two `;` with `:`, leaving any later ones alone
pub fn normalize_separators(basename: &str) -> Cow<'_, str> {
    if basename.contains(';') {
        Cow::Owned(basename.replacen(';', ":", MAX_SEMICOLON_REWRITES))
    } else {
        Cow::Borrowed(basename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_separators() {
        assert_eq!(normalize_separators("a;b"), "a:b");
        assert_eq!(normalize_separators("10;15;30"), "10:15:30");
        assert_eq!(normalize_separators("IMG;2019;07;21"), "IMG:2019:07;21");
        assert_eq!(normalize_separators("a;b;c;d;e"), "a:b:c;d;e");
        assert!(matches!(normalize_separators("plain.jpg"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_extract_common_names() {
        let ts = extract("IMG_20240115_143000.jpg").unwrap();
        assert_eq!(ts.to_string(), "2024-01-15 14:30:00");

        let ts = extract("2021-03-04 10;15;30.jpg").unwrap();
        assert_eq!(ts.to_string(), "2021-03-04 10:15:30");

        let ts = extract("Birthday March 4, 2021.png").unwrap();
        assert_eq!(ts.to_string(), "2021-03-04 00:00:00");
    }

    #[test]
    fn test_extract_rejects() {
        assert!(extract("IMG;2019;07;21").is_none());
        assert!(extract("random_file.jpg").is_none());
        assert!(extract("photo.jpg").is_none());
        assert!(extract("2021-00-00.jpg").is_none());
    }

    #[test]
    fn test_third_semicolon_untouched() {
        // Only the time separators are rewritten; the trailing `;` stays
        let ts = extract("2021-03-04 10;15;30;draft.jpg").unwrap();
        assert_eq!(ts.clock(), "10:15:30");
    }
}
