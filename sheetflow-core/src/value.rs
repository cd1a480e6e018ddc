//! Cell type codes and resolved cell values

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{DecodeError, Result};

/// Declared type of a cell (`t` attribute)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellTypeCode {
    Boolean,
    Error,
    /// `t="str"`: cached string result of a formula
    Formula,
    InlineString,
    SharedStringIndex,
    Number,
    /// `t="d"`: ISO 8601 date text
    Date,
    /// No `t` attribute; upgraded to number or date from the style
    Null,
}

impl CellTypeCode {
    pub fn from_attr(code: Option<&str>) -> Result<Self> {
        let Some(code) = code else {
            return Ok(CellTypeCode::Null);
        };
        match code {
            "b" => Ok(CellTypeCode::Boolean),
            "e" => Ok(CellTypeCode::Error),
            "str" => Ok(CellTypeCode::Formula),
            "inlineStr" => Ok(CellTypeCode::InlineString),
            "s" => Ok(CellTypeCode::SharedStringIndex),
            "n" => Ok(CellTypeCode::Number),
            "d" => Ok(CellTypeCode::Date),
            "" => Ok(CellTypeCode::Null),
            other => Err(DecodeError::UnknownTypeCode(other.to_string())),
        }
    }
}

/// A fully typed cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResolvedValue {
    Bool(bool),
    Error(String),
    Str(String),
    Int(i64),
    Decimal(f64),
    Date(SerialDateTime),
    /// Formula source text with its last cached result; never re-evaluated
    Formula {
        source: String,
        cached: Box<ResolvedValue>,
    },
    Null,
}

impl ResolvedValue {
    pub fn formula(source: impl Into<String>, cached: ResolvedValue) -> Self {
        ResolvedValue::Formula {
            source: source.into(),
            cached: Box::new(cached),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ResolvedValue::Null)
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, ResolvedValue::Formula { .. })
    }

    /// The value itself, or the cached result for formulas
    pub fn cached(&self) -> &ResolvedValue {
        match self {
            ResolvedValue::Formula { cached, .. } => cached.cached(),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.cached() {
            ResolvedValue::Int(i) => Some(*i as f64),
            ResolvedValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Bool(true) => f.write_str("TRUE"),
            ResolvedValue::Bool(false) => f.write_str("FALSE"),
            ResolvedValue::Error(e) => f.write_str(e),
            ResolvedValue::Str(s) => f.write_str(s),
            ResolvedValue::Int(i) => write!(f, "{}", i),
            ResolvedValue::Decimal(d) => write!(f, "{}", d),
            ResolvedValue::Date(d) => write!(f, "{}", d),
            ResolvedValue::Formula { cached, .. } => write!(f, "{}", cached),
            ResolvedValue::Null => Ok(()),
        }
    }
}

/// Date/time decoded from a serial day number
///
/// Serial day 60 is the 1900 leap day that never existed. `chrono` cannot
/// represent it, so it is carried as 1900-02-28 with `phantom_leap_day` set and
/// displayed as `1900-02-29`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SerialDateTime {
    datetime: NaiveDateTime,
    phantom_leap_day: bool,
}

impl SerialDateTime {
    pub fn new(datetime: NaiveDateTime) -> Self {
        Self {
            datetime,
            phantom_leap_day: false,
        }
    }

    pub(crate) fn phantom(time_of_day: chrono::NaiveTime) -> Self {
        let feb_28 = NaiveDate::from_ymd_opt(1900, 2, 28).unwrap_or_default();
        Self {
            datetime: feb_28.and_time(time_of_day),
            phantom_leap_day: true,
        }
    }

    /// Closest representable date time (1900-02-28 for the phantom leap day)
    pub fn datetime(&self) -> NaiveDateTime {
        self.datetime
    }

    pub fn is_phantom_leap_day(&self) -> bool {
        self.phantom_leap_day
    }
}

impl From<NaiveDateTime> for SerialDateTime {
    fn from(datetime: NaiveDateTime) -> Self {
        Self::new(datetime)
    }
}

impl fmt::Display for SerialDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.phantom_leap_day {
            write!(f, "1900-02-29 {}", self.datetime.format("%H:%M:%S"))
        } else {
            write!(f, "{}", self.datetime.format("%Y-%m-%d %H:%M:%S"))
        }
    }
}

impl Serialize for SerialDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
