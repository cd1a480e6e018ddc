//! Per-row accumulation of resolved cells into a dense, gap-filled buffer

use crate::coordinate::{Coordinate, Cursor, gap_count};
use crate::error::{DecodeError, Result};
use crate::value::ResolvedValue;

/// One completed row: 0-based index and its cells, `None` where the source omitted a cell
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowBuffer {
    pub row_index: u64,
    pub cells: Vec<Option<ResolvedValue>>,
}

impl RowBuffer {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, column: u32) -> Option<&ResolvedValue> {
        self.cells.get(column as usize).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&ResolvedValue>> {
        self.cells.iter().map(Option::as_ref)
    }

    /// Number of cells that were present in the source
    pub fn non_empty_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn into_cells(self) -> Vec<Option<ResolvedValue>> {
        self.cells
    }
}

/// Builds one [`RowBuffer`] at a time
///
/// The first non-empty row finished fixes the reference width; later rows can
/// be padded against it.
#[derive(Debug, Default)]
pub struct RowAssembler {
    row_index: u64,
    cursor: Cursor,
    cells: Vec<Option<ResolvedValue>>,
    reference_width: Option<usize>,
}

impl RowAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_row(&mut self, row_index: u64) {
        self.row_index = row_index;
        self.cursor = Cursor::BeforeFirst;
        self.cells.clear();
    }

    /// Override the index of the row in progress
    pub fn set_row_index(&mut self, row_index: u64) {
        self.row_index = row_index;
    }

    pub fn row_index(&self) -> u64 {
        self.row_index
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Cells placed so far in the current row, gaps included
    pub fn width(&self) -> usize {
        self.cells.len()
    }

    pub fn reference_width(&self) -> Option<usize> {
        self.reference_width
    }

    /// Check that `coord` lies to the right of the last placed cell
    pub fn accepts(&self, coord: &Coordinate) -> Result<()> {
        match self.cursor {
            Cursor::At(prev) if coord.column <= prev.column => Err(DecodeError::OutOfOrderColumn {
                previous: prev.column,
                column: coord.column,
            }),
            _ => Ok(()),
        }
    }

    /// Place a value at `coord`, filling skipped columns with `None`
    pub fn put(&mut self, coord: Coordinate, value: ResolvedValue) -> Result<()> {
        self.accepts(&coord)?;

        let gap = gap_count(self.cursor, &coord) as usize;
        self.cells.reserve(gap + 1);
        self.cells.extend(std::iter::repeat_n(None, gap));
        self.cells.push(Some(value));
        self.cursor = Cursor::At(coord);
        Ok(())
    }

    /// Finish the current row and hand its buffer out
    ///
    /// When padding, rows after the reference row are extended with trailing
    /// `None` to one past the reference width. Wider rows are left alone.
    pub fn end_row(&mut self, pad_to_reference_width: bool) -> RowBuffer {
        let mut cells = std::mem::take(&mut self.cells);

        match self.reference_width {
            None if !cells.is_empty() => {
                self.reference_width = Some(cells.len());
                log::debug!(
                    "Reference width {} set by row {}",
                    cells.len(),
                    self.row_index
                );
            }
            Some(width) if pad_to_reference_width && cells.len() < width + 1 => {
                cells.resize(width + 1, None);
            }
            _ => {}
        }

        self.cursor = Cursor::BeforeFirst;
        RowBuffer {
            row_index: self.row_index,
            cells,
        }
    }

    /// Drop the row in progress without emitting it
    pub fn reset_row(&mut self) {
        self.cells.clear();
        self.cursor = Cursor::BeforeFirst;
    }
}
