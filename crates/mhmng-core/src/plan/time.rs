//! Timestamp and date handling for plan payloads and searches.
//!
//! Timestamps without an explicit offset are read in the hub time zone
//! (a fixed UTC offset from configuration).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

use super::input::ValidationError;

/// Layouts carrying an explicit offset, tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M%:z",
    "%Y/%m/%d %H:%M:%S%:z",
    "%Y/%m/%d %H:%M%:z",
];

/// Layouts without an offset.
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse an optional timestamp field.
///
/// `None` and the empty string mean "no value" and yield `Ok(None)`; any other
/// string that matches none of the accepted layouts is an error.
pub fn parse_timestamp(
    field: &'static str,
    raw: Option<&str>,
    tz: FixedOffset,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(s) => s,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if raw.ends_with('Z') || raw.ends_with('z') {
        let trimmed = &raw[..raw.len() - 1];
        if let Some(naive) = parse_naive(trimmed) {
            return Ok(Some(naive.and_utc()));
        }
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
    }
    if let Some(naive) = parse_naive(raw) {
        // a wall-clock value at the edge of the calendar may have no UTC form
        if let Some(dt) = local_to_utc(naive, tz) {
            return Ok(Some(dt));
        }
    }

    Err(ValidationError::BadTimestamp {
        field,
        value: raw.to_owned(),
    })
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Interpret a wall-clock time in `tz` and convert it to UTC, or `None` if
/// the result falls outside the representable range.
fn local_to_utc(naive: NaiveDateTime, tz: FixedOffset) -> Option<DateTime<Utc>> {
    naive
        .checked_sub_signed(TimeDelta::seconds(i64::from(tz.local_minus_utc())))
        .map(|utc| utc.and_utc())
}

/// Parse the `date` search parameter (`YYYYMMDD`).
pub fn parse_search_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let raw = raw.trim();
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::BadDate(raw.to_owned()));
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| ValidationError::BadDate(raw.to_owned()))
}

/// The half-open UTC interval covering `date` from local midnight to the next
/// local midnight in `tz`.
pub fn day_window(
    date: NaiveDate,
    tz: FixedOffset,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ValidationError> {
    let out_of_range = || ValidationError::BadDate(date.format("%Y%m%d").to_string());
    let start = local_to_utc(date.and_time(NaiveTime::MIN), tz).ok_or_else(out_of_range)?;
    let end = start
        .checked_add_signed(TimeDelta::days(1))
        .ok_or_else(out_of_range)?;
    Ok((start, end))
}

/// Parse a UTC offset such as `+09:00`, `-0530`, `Z` or `UTC`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
