//! Error types for the decoding engine

use thiserror::Error;

/// Errors raised while turning sheet events into rows
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Coordinate string does not match `[A-Z]+[0-9]+`
    #[error("invalid cell coordinate '{0}'")]
    InvalidCoordinate(String),

    #[error("shared string index {index} out of range")]
    SharedStringIndexOutOfRange { index: u32 },

    #[error("style index {index} does not resolve to a number format")]
    StyleIndexOutOfRange { index: u32 },

    #[error("invalid number literal '{literal}'")]
    InvalidNumberLiteral { literal: String },

    #[error("unknown cell type code '{0}'")]
    UnknownTypeCode(String),

    /// Cells in a row must arrive in strictly increasing column order
    #[error("column {column} is not after previous column {previous}")]
    OutOfOrderColumn { previous: u32, column: u32 },

    /// Event nesting violation; cannot be localised to a single row
    #[error("malformed event sequence: {0}")]
    MalformedEventSequence(String),

    /// A row-scoped failure in strict mode
    #[error(transparent)]
    Row(#[from] RowError),
}

impl DecodeError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        DecodeError::MalformedEventSequence(message.into())
    }

    /// Whether this error is confined to a single row
    pub fn is_row_scoped(&self) -> bool {
        !matches!(self, DecodeError::MalformedEventSequence(_))
    }
}

/// A resolution or assembly failure tied to the row (and column, when known) it occurred in
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}: {source}", location(.row, .column))]
pub struct RowError {
    pub row: u64,
    pub column: Option<u32>,
    pub source: Box<DecodeError>,
}

impl RowError {
    pub fn new(row: u64, column: Option<u32>, source: DecodeError) -> Self {
        Self {
            row,
            column,
            source: Box::new(source),
        }
    }
}

/// "row 5" or "row 5, cell AB5", 1-based
fn location(row: &u64, column: &Option<u32>) -> String {
    match column {
        Some(col) => format!(
            "row {}, cell {}{}",
            row + 1,
            crate::coordinate::column_name(*col),
            row + 1
        ),
        None => format!("row {}", row + 1),
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
