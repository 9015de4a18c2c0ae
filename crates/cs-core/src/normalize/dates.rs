//! Date parsing and digit-packed timestamp encoding.
//!
//! A parsed timestamp is encoded as the number whose decimal digits are
//! `YYYYMMDDHHMMSS`. Differences between two encodings are not elapsed
//! time; they are kept exactly as the subtraction yields them.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y", "%Y/%m/%d"];

/// Parse a text cell into a timestamp. `None` for anything unrecognised.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return parse_compact(s);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Read a numeric cell as a compact `YYYYMMDD` or `YYYYMMDDHHMMSS` value.
pub fn timestamp_from_number(value: f64) -> Option<NaiveDateTime> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value >= 1e14 {
        return None;
    }
    parse_compact(&format!("{:.0}", value))
}

fn parse_compact(digits: &str) -> Option<NaiveDateTime> {
    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<u32>().ok();
    let date = NaiveDate::from_ymd_opt(field(0..4)? as i32, field(4..6)?, field(6..8)?)?;
    match digits.len() {
        8 => date.and_hms_opt(0, 0, 0),
        14 => date.and_hms_opt(field(8..10)?, field(10..12)?, field(12..14)?),
        _ => None,
    }
}

/// Digit-packed encoding `YYYYMMDDHHMMSS` as a float.
pub fn encode_timestamp(ts: &NaiveDateTime) -> f64 {
    ts.year() as f64 * 1e10
        + ts.month() as f64 * 1e8
        + ts.day() as f64 * 1e6
        + ts.hour() as f64 * 1e4
        + ts.minute() as f64 * 1e2
        + ts.second() as f64
}
