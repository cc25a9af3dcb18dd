// Tolerant parsing of the date strings civic platforms emit.
// The format table below covers everything observed in the field; anything
// outside it returns None -- a missing date is recoverable, a guessed one
// is not.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Formats carrying both a date and a time.
const DATETIME_FORMATS: &[&str] = &[
    "%b %d, %Y %I:%M %p",      // Jul 22, 2025 6:30 PM
    "%B %d, %Y %I:%M %p",      // July 22, 2025 6:30 PM
    "%b %d, %Y %I:%M%p",       // Jul 22, 2025 6:30PM
    "%A, %B %d, %Y %I:%M %p",  // Tuesday, July 22, 2025 6:30 PM
    "%m/%d/%Y %I:%M %p",       // 07/22/2025 6:30 PM
    "%m/%d/%Y %I:%M:%S %p",    // 07/22/2025 6:30:00 PM
    "%m/%d/%Y %H:%M",          // 07/22/2025 18:30
    "%m/%d/%y %I:%M %p",       // 07/22/25 6:30 PM
    "%Y-%m-%dT%H:%M:%S",       // 2025-07-22T18:30:00
    "%Y-%m-%dT%H:%M:%S%.f",    // 2025-07-22T18:30:00.000
    "%Y-%m-%d %H:%M:%S",       // 2025-07-22 18:30:00
    "%Y-%m-%d %H:%M",          // 2025-07-22 18:30
    "%d %b %Y %I:%M %p",       // 22 Jul 2025 6:30 PM
];

/// Date-only formats; these get a midnight time.
const DATE_FORMATS: &[&str] = &[
    "%b %d, %Y",     // Jul 22, 2025
    "%B %d, %Y",     // July 22, 2025
    "%A, %B %d, %Y", // Tuesday, July 22, 2025
    "%m/%d/%Y",      // 07/22/2025
    "%m/%d/%y",      // 07/22/25
    "%Y-%m-%d",      // 2025-07-22
    "%d %b %Y",      // 22 Jul 2025
    "%d %B %Y",      // 22 July 2025
];

/// ASP.NET JSON wire dates: /Date(1753224600000)/
static ASPNET_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Date\((-?\d+)(?:[+-]\d{4})?\)/").expect("aspnet regex compiles"));

/// Ordinal day suffixes: July 22nd, 2025
static ORDINAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("ordinal regex compiles"));

/// Parse a vendor date string. Vendor-local wall-clock time is kept
/// naive; explicit UTC markers (trailing Z, epoch dates) are converted to
/// UTC wall-clock before the timezone is dropped.
pub fn parse_vendor_date(raw: &str) -> Option<NaiveDateTime> {
    let cleaned = clean(raw);
    if cleaned.is_empty() {
        return None;
    }

    if let Some(captures) = ASPNET_DATE.captures(&cleaned) {
        let millis: i64 = captures[1].parse().ok()?;
        return DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.naive_utc());
    }

    // RFC 3339 with an explicit offset or Z.
    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Combine separately-published date and time strings (Legistar splits
/// them). A missing or unparseable time degrades to the date alone.
pub fn combine_date_and_time(date: NaiveDateTime, time: Option<&str>) -> NaiveDateTime {
    let Some(raw) = time else {
        return date;
    };
    let cleaned = clean(raw);
    for format in ["%I:%M %p", "%I:%M%p", "%H:%M", "%I:%M:%S %p"] {
        if let Ok(t) = NaiveTime::parse_from_str(&cleaned, format) {
            return date.date().and_time(t);
        }
    }
    date
}

/// Normalise whitespace and strip decorations that break strptime:
/// ordinal suffixes, "at" separators, lowercase meridiems with dots.
fn clean(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_at = collapsed
        .replace(" at ", " ")
        .replace(" @ ", " ")
        .replace("a.m.", "AM")
        .replace("p.m.", "PM")
        .replace("A.M.", "AM")
        .replace("P.M.", "PM")
        .replace("am", "AM")
        .replace("pm", "PM")
        .replace("Am", "AM")
        .replace("Pm", "PM");
    ORDINAL_SUFFIX.replace_all(&without_at, "$1").into_owned()
}
