//! A1-style cell coordinates and column gap arithmetic

use std::fmt;

use crate::error::{DecodeError, Result};

/// Zero-based index of column `XFD`, the widest a worksheet may be
pub const MAX_COLUMN: u32 = 16_383;

/// Zero-based cell position parsed from an A1 reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub column: u32,
    pub row: u64,
}

impl Coordinate {
    pub fn new(column: u32, row: u64) -> Self {
        Self { column, row }
    }

    /// Parse a reference like "AA23" into (column 26, row 22)
    ///
    /// Letters are accepted in either case. Anything other than a letter run
    /// followed by a digit run is rejected, as are columns past `XFD`.
    pub fn parse(cell_ref: &str) -> Result<Self> {
        let invalid = || DecodeError::InvalidCoordinate(cell_ref.to_string());

        let split = cell_ref
            .find(|ch: char| !ch.is_ascii_alphabetic())
            .ok_or_else(invalid)?;
        let (letters, digits) = cell_ref.split_at(split);
        if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut col = 0u64;
        for ch in letters.bytes() {
            col = col * 26 + u64::from(ch.to_ascii_uppercase() - b'A' + 1);
            if col > u64::from(MAX_COLUMN) + 1 {
                return Err(invalid());
            }
        }

        let row = digits.parse::<u64>().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }

        // Convert to 0-based
        Ok(Self {
            column: (col - 1) as u32,
            row: row - 1,
        })
    }

    /// Encode back to an upper-case A1 reference
    pub fn to_a1(&self) -> String {
        format!("{}{}", column_name(self.column), self.row + 1)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_name(self.column), self.row + 1)
    }
}

impl std::str::FromStr for Coordinate {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Convert column number to letters (0 -> A, 25 -> Z, 26 -> AA)
pub fn column_name(col: u32) -> String {
    let mut n = u64::from(col) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Position of the last cell placed in a row
///
/// `BeforeFirst` stands in for column -1 (the `@` column), so the first real
/// cell of a row at column `c` is preceded by exactly `c` gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    BeforeFirst,
    At(Coordinate),
}

impl Cursor {
    pub fn column(&self) -> Option<u32> {
        match self {
            Cursor::BeforeFirst => None,
            Cursor::At(coord) => Some(coord.column),
        }
    }
}

/// Number of missing columns strictly between `prev` and `cur`
///
/// Clamped to zero when `cur` does not advance past `prev`.
pub fn gap_count(prev: Cursor, cur: &Coordinate) -> u32 {
    match prev {
        Cursor::BeforeFirst => cur.column,
        Cursor::At(prev) if cur.column > prev.column => cur.column - prev.column - 1,
        Cursor::At(_) => 0,
    }
}
