//! Receivers of decoded cells and rows

use std::ops::ControlFlow;

use crate::error::RowError;
use crate::row::RowBuffer;
use crate::value::ResolvedValue;

/// Index of a sheet within its workbook (0-based, in workbook order)
pub type SheetId = u32;

/// Callbacks fired by the decoder as it streams through a sheet
pub trait SheetSink {
    /// A single cell, fired as soon as the cell closes and before its row completes
    fn on_cell(
        &mut self,
        _sheet_id: SheetId,
        _row_index: u64,
        _column_index: u32,
        _value: ResolvedValue,
        _style_index: Option<u32>,
    ) {
    }

    /// A completed row. Returning `ControlFlow::Break` stops decoding.
    fn on_row(&mut self, sheet_id: SheetId, row_index: u64, row: RowBuffer) -> ControlFlow<()>;

    /// A row skipped under the best-effort policy
    fn on_row_error(&mut self, _sheet_id: SheetId, _error: &RowError) {}

    /// End of the sheet's data
    fn on_finish(&mut self, _sheet_id: SheetId) {}
}

impl<S: SheetSink + ?Sized> SheetSink for &mut S {
    fn on_cell(
        &mut self,
        sheet_id: SheetId,
        row_index: u64,
        column_index: u32,
        value: ResolvedValue,
        style_index: Option<u32>,
    ) {
        (**self).on_cell(sheet_id, row_index, column_index, value, style_index)
    }

    fn on_row(&mut self, sheet_id: SheetId, row_index: u64, row: RowBuffer) -> ControlFlow<()> {
        (**self).on_row(sheet_id, row_index, row)
    }

    fn on_row_error(&mut self, sheet_id: SheetId, error: &RowError) {
        (**self).on_row_error(sheet_id, error)
    }

    fn on_finish(&mut self, sheet_id: SheetId) {
        (**self).on_finish(sheet_id)
    }
}

/// Sink that keeps every row in memory, optionally stopping after `limit` rows
#[derive(Debug, Default)]
pub struct CollectRows {
    pub rows: Vec<RowBuffer>,
    pub errors: Vec<RowError>,
    pub limit: Option<usize>,
    pub finished: bool,
}

impl CollectRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl SheetSink for CollectRows {
    fn on_row(&mut self, _sheet_id: SheetId, _row_index: u64, row: RowBuffer) -> ControlFlow<()> {
        self.rows.push(row);
        match self.limit {
            Some(limit) if self.rows.len() >= limit => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }

    fn on_row_error(&mut self, _sheet_id: SheetId, error: &RowError) {
        self.errors.push(error.clone());
    }

    fn on_finish(&mut self, _sheet_id: SheetId) {
        self.finished = true;
    }
}
