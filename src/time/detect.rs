//! Strict date/time detection in free text
//!
//! Used for file names and for recognized stamp text. Every date-looking
//! fragment in the input becomes a candidate; candidates are tried left to
//! right and the first one that forms a real calendar date wins. Fragments
//! with a zero day, month or year are skipped rather than ending the scan.

use super::CaptureTimestamp;
use regex::{Captures, Regex};
use std::cmp::Reverse;
use std::sync::LazyLock;
use tracing::trace;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Full and abbreviated English month names; the first three letters identify the month
const MONTH_NAME: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

/// Optional time of day following a date: `10:15`, `10:15:30`, `(10.15.30)`, `9:05 pm`
const TIME: &str = r"(?:[\sT_@,\-]+\(?(?P<hour>\d{1,2})[:.h_\-](?P<minute>\d{2})(?:[:.m_\-](?P<second>\d{2}))?\s*(?P<meridiem>[ap]\.?m\.?)?\)?)?";

/// How the date fields of a pattern are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// 2021-03-04, 2021:03:04, 2021 3 4
    YearFirst,
    /// 20210304, 20210304_101530
    Compact,
    /// 03/04/2021 (month first unless the first field exceeds 12), 3 4 '21
    MonthOrDayFirst,
    /// '21 3 4 (camera stamps)
    ShortYearFirst,
    /// 4 March 2021, Mar 4th 2021
    MonthName,
}

struct DatePattern {
    regex: &'static LazyLock<Regex>,
    layout: Layout,
}

static RE_YEAR_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|[^\d])(?P<year>\d{{4}})(?P<sep1>[\-/._: ])(?P<month>\d{{1,2}})(?P<sep2>[\-/._: ])(?P<day>\d{{1,2}})(?P<end>){TIME}"
    ))
    .unwrap()
});

static RE_COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[^\d])(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})(?P<end>)(?:[_\-T ]?(?P<hour>\d{2})(?P<minute>\d{2})(?P<second>\d{2}))?",
    )
    .unwrap()
});

static RE_MONTH_OR_DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|[^\d'])(?P<first>\d{{1,2}})(?P<sep1>[\-/. ])(?P<second_field>\d{{1,2}})(?P<sep2>[\-/. ])(?P<year>\d{{4}}|'\d{{2}})(?P<end>){TIME}"
    ))
    .unwrap()
});

static RE_SHORT_YEAR_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|[^\d])(?P<year>'\d{{2}})(?P<sep1>[\-/. ])(?P<month>\d{{1,2}})(?P<sep2>[\-/. ])(?P<day>\d{{1,2}})(?P<end>){TIME}"
    ))
    .unwrap()
});

static RE_DAY_MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|[^a-z\d])(?P<day>\d{{1,2}})(?:st|nd|rd|th)?[\s\-./_]*(?P<month>{MONTH_NAME})\.?[\s\-./,_]*(?P<year>\d{{4}})(?P<end>){TIME}"
    ))
    .unwrap()
});

static RE_MONTH_NAME_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|[^a-z])(?P<month>{MONTH_NAME})\.?[\s\-./_]*(?P<day>\d{{1,2}})(?:st|nd|rd|th)?[\s\-./,_]+(?P<year>\d{{4}})(?P<end>){TIME}"
    ))
    .unwrap()
});

static PATTERNS: &[DatePattern] = &[
    DatePattern { regex: &RE_YEAR_FIRST, layout: Layout::YearFirst },
    DatePattern { regex: &RE_COMPACT, layout: Layout::Compact },
    DatePattern { regex: &RE_MONTH_OR_DAY_FIRST, layout: Layout::MonthOrDayFirst },
    DatePattern { regex: &RE_SHORT_YEAR_FIRST, layout: Layout::ShortYearFirst },
    DatePattern { regex: &RE_DAY_MONTH_NAME, layout: Layout::MonthName },
    DatePattern { regex: &RE_MONTH_NAME_DAY, layout: Layout::MonthName },
];

/// A date-looking fragment of the input, not yet validated
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Byte offset of the fragment in the input
    pub start: usize,
    /// Matched text
    pub text: String,
    year: i32,
    month: u32,
    day: u32,
    time: Option<(u32, u32, u32)>,
    time_valid: bool,
}

impl Candidate {
    /// Validate the fragment as a full timestamp. A missing time means midnight.
    pub fn resolve(&self) -> Option<CaptureTimestamp> {
        if !self.time_valid {
            return None;
        }
        let (hour, minute, second) = self.time.unwrap_or((0, 0, 0));
        CaptureTimestamp::from_parts(self.year, self.month, self.day, hour, minute, second)
    }
}

/// Find the first valid date (and time, when present) in `text`
pub fn detect(text: &str) -> Option<CaptureTimestamp> {
    for candidate in candidates(text) {
        match candidate.resolve() {
            Some(timestamp) => {
                trace!(text, fragment = %candidate.text, %timestamp, "Accepted date candidate");
                return Some(timestamp);
            }
            None => {
                trace!(text, fragment = %candidate.text, "Rejected date candidate");
            }
        }
    }
    None
}

/// All date-looking fragments of `text`, leftmost first, longer first on ties
pub fn candidates(text: &str) -> Vec<Candidate> {
    let mut found = Vec::new();

    for pattern in PATTERNS {
        for caps in pattern.regex.captures_iter(text) {
            if let Some(candidate) = build_candidate(text, &caps, pattern.layout) {
                found.push(candidate);
            }
        }
    }

    found.sort_by_key(|c| (c.start, Reverse(c.text.len())));
    found
}

fn build_candidate(text: &str, caps: &Captures<'_>, layout: Layout) -> Option<Candidate> {
    let whole = caps.get(0)?;

    // Separators must agree: 2021-03-04 yes, 2019:07;21 no
    if let (Some(a), Some(b)) = (caps.name("sep1"), caps.name("sep2"))
        && a.as_str() != b.as_str()
    {
        return None;
    }

    // The date must not run into further digits (2021-03-045, 1705329000)
    let date_end = caps.name("end")?.end();
    if text[date_end..].starts_with(|c: char| c.is_ascii_digit()) && caps.name("hour").is_none() {
        return None;
    }
    if text[whole.end()..].starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let (year, month, day) = match layout {
        Layout::YearFirst | Layout::Compact | Layout::ShortYearFirst => (
            parse_year(caps.name("year")?.as_str())?,
            caps.name("month")?.as_str().parse().ok()?,
            caps.name("day")?.as_str().parse().ok()?,
        ),
        Layout::MonthOrDayFirst => {
            let first: u32 = caps.name("first")?.as_str().parse().ok()?;
            let second: u32 = caps.name("second_field")?.as_str().parse().ok()?;
            let (month, day) = if first > 12 { (second, first) } else { (first, second) };
            (parse_year(caps.name("year")?.as_str())?, month, day)
        }
        Layout::MonthName => (
            parse_year(caps.name("year")?.as_str())?,
            month_number(caps.name("month")?.as_str())?,
            caps.name("day")?.as_str().parse().ok()?,
        ),
    };

    let (time, time_valid) = match caps.name("hour") {
        Some(hour) => {
            let time = parse_time(
                hour.as_str(),
                caps.name("minute").map(|m| m.as_str()),
                caps.name("second").map(|m| m.as_str()),
                caps.name("meridiem").map(|m| m.as_str()),
            );
            (time, time.is_some())
        }
        None => (None, true),
    };

    Some(Candidate {
        start: whole.start(),
        text: whole.as_str().to_string(),
        year,
        month,
        day,
        time,
        time_valid,
    })
}

/// `2021` as is, `'21` pivoted like strptime's `%y`
fn parse_year(s: &str) -> Option<i32> {
    match s.strip_prefix('\'') {
        Some(short) => {
            let short: i32 = short.parse().ok()?;
            Some(if short < 69 { 2000 + short } else { 1900 + short })
        }
        None => s.parse().ok(),
    }
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

fn parse_time(
    hour: &str,
    minute: Option<&str>,
    second: Option<&str>,
    meridiem: Option<&str>,
) -> Option<(u32, u32, u32)> {
    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute?.parse().ok()?;
    let second: u32 = match second {
        Some(s) => s.parse().ok()?,
        None => 0,
    };

    if let Some(meridiem) = meridiem {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = meridiem.to_ascii_lowercase().starts_with('p');
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }

    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }
    Some((hour, minute, second))
}
