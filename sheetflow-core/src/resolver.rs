//! Cell value resolution
//!
//! Combines a cell's declared type code, its raw value text, the number format
//! of its style and the shared string table into a [`ResolvedValue`].

use chrono::{Datelike, Days, NaiveDate, NaiveTime};

use crate::error::{DecodeError, Result};
use crate::format::is_date_format;
use crate::value::{CellTypeCode, ResolvedValue, SerialDateTime};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Serial day 60 is the 1900-02-29 that the 1900 date system pretends exists
const PHANTOM_LEAP_DAY: i64 = 60;

/// Serials past 9999-12-31 are not valid dates
const MAX_YEAR: i32 = 9999;

/// Read-only lookup of deduplicated strings by index
pub trait SharedStringTable {
    fn get(&self, index: u32) -> Option<&str>;
}

/// Read-only lookup of number format codes by cell style index
pub trait StylesTable {
    fn format_for_style(&self, style_index: u32) -> Option<&str>;
}

impl<S: AsRef<str>> SharedStringTable for [S] {
    fn get(&self, index: u32) -> Option<&str> {
        <[S]>::get(self, index as usize).map(AsRef::as_ref)
    }
}

impl<S: AsRef<str>> SharedStringTable for Vec<S> {
    fn get(&self, index: u32) -> Option<&str> {
        self.as_slice().get(index as usize).map(AsRef::as_ref)
    }
}

impl<S: AsRef<str>> StylesTable for [S] {
    fn format_for_style(&self, style_index: u32) -> Option<&str> {
        <[S]>::get(self, style_index as usize).map(AsRef::as_ref)
    }
}

impl<S: AsRef<str>> StylesTable for Vec<S> {
    fn format_for_style(&self, style_index: u32) -> Option<&str> {
        self.as_slice().get(style_index as usize).map(AsRef::as_ref)
    }
}

/// Resolve one cell's value text according to its declared type
pub fn resolve(
    type_code: CellTypeCode,
    text: &str,
    style_format: Option<&str>,
    shared_strings: &dyn SharedStringTable,
) -> Result<ResolvedValue> {
    match type_code {
        CellTypeCode::Boolean => Ok(ResolvedValue::Bool(text == "1")),
        CellTypeCode::Error => Ok(ResolvedValue::Error(text.to_string())),
        CellTypeCode::InlineString => Ok(ResolvedValue::Str(text.to_string())),
        CellTypeCode::SharedStringIndex => {
            let index = text
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid_number(text))?;
            shared_strings
                .get(index)
                .map(|s| ResolvedValue::Str(s.to_string()))
                .ok_or(DecodeError::SharedStringIndexOutOfRange { index })
        }
        CellTypeCode::Null | CellTypeCode::Number => resolve_number(text, style_format),
        CellTypeCode::Date => Ok(parse_iso_datetime(text)
            .map(ResolvedValue::Date)
            .unwrap_or_else(|| ResolvedValue::Str(text.to_string()))),
        CellTypeCode::Formula => Ok(ResolvedValue::Str(text.to_string())),
    }
}

/// Wrap an already resolved value in a formula carrier
pub fn wrap_formula(source: impl Into<String>, cached: ResolvedValue) -> ResolvedValue {
    ResolvedValue::formula(source, cached)
}

fn resolve_number(text: &str, style_format: Option<&str>) -> Result<ResolvedValue> {
    let literal = text.trim();
    if literal.is_empty() {
        return Ok(ResolvedValue::Null);
    }

    if style_format.is_some_and(is_date_format) {
        let serial = parse_finite(literal).ok_or_else(|| invalid_number(text))?;
        return serial_to_datetime(serial).map(ResolvedValue::Date);
    }

    if !literal.contains(['.', 'e', 'E'])
        && let Ok(i) = literal.parse::<i64>()
    {
        return Ok(ResolvedValue::Int(i));
    }
    parse_finite(literal)
        .map(ResolvedValue::Decimal)
        .ok_or_else(|| invalid_number(text))
}

fn parse_finite(literal: &str) -> Option<f64> {
    literal.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn invalid_number(text: &str) -> DecodeError {
    DecodeError::InvalidNumberLiteral {
        literal: text.to_string(),
    }
}

/// Convert a 1900-system serial day number to a date time
///
/// Serials below 60 count from 1899-12-31 so that serial 1 is 1900-01-01,
/// serial 60 is the phantom 1900-02-29, and serials from 61 on count from
/// 1899-12-30. The fraction is the time of day, rounded to the millisecond.
pub fn serial_to_datetime(serial: f64) -> Result<SerialDateTime> {
    let out_of_range = || invalid_number(&serial.to_string());
    if !serial.is_finite() || serial < 0.0 {
        return Err(out_of_range());
    }

    let mut days = serial.floor() as i64;
    let mut millis = ((serial - serial.floor()) * MILLIS_PER_DAY as f64).round() as i64;
    if millis >= MILLIS_PER_DAY {
        days += 1;
        millis -= MILLIS_PER_DAY;
    }

    let time = NaiveTime::from_num_seconds_from_midnight_opt(
        (millis / 1000) as u32,
        ((millis % 1000) * 1_000_000) as u32,
    )
    .ok_or_else(out_of_range)?;

    let epoch = match days {
        PHANTOM_LEAP_DAY => return Ok(SerialDateTime::phantom(time)),
        d if d < PHANTOM_LEAP_DAY => NaiveDate::from_ymd_opt(1899, 12, 31),
        _ => NaiveDate::from_ymd_opt(1899, 12, 30),
    }
    .ok_or_else(out_of_range)?;

    let date = epoch
        .checked_add_days(Days::new(days as u64))
        .filter(|d| d.year() <= MAX_YEAR)
        .ok_or_else(out_of_range)?;
    Ok(SerialDateTime::new(date.and_time(time)))
}

/// `t="d"` cells carry ISO 8601 text, either a full date time or a date
fn parse_iso_datetime(text: &str) -> Option<SerialDateTime> {
    let text = text.trim();
    let text = text.strip_suffix('Z').unwrap_or(text);
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(text, pattern) {
            return Some(SerialDateTime::new(dt));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(SerialDateTime::new)
}
