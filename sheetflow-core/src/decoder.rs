//! Streaming state machine turning sheet events into rows
//!
//! The decoder is a synchronous fold over [`SheetEvent`]s. It holds at most one
//! row of cells plus the text of the cell being read, so memory stays bounded
//! by the widest row regardless of sheet length.

use std::mem;
use std::ops::ControlFlow;

use crate::config::{DecoderConfig, ErrorPolicy};
use crate::coordinate::Coordinate;
use crate::error::{DecodeError, Result, RowError};
use crate::resolver::{SharedStringTable, StylesTable, resolve, wrap_formula};
use crate::row::RowAssembler;
use crate::sink::{SheetId, SheetSink};
use crate::value::{CellTypeCode, ResolvedValue};

/// Structural events from a worksheet body, in document order
#[derive(Debug, Clone, PartialEq)]
pub enum SheetEvent {
    SheetDataStart,
    SheetDataEnd,
    /// `row_index` is the 1-based `r` attribute, if present
    RowStart {
        row_index: Option<u64>,
    },
    RowEnd,
    CellStart {
        coordinate: String,
        type_code: Option<String>,
        style_index: Option<u32>,
    },
    CellEnd,
    /// Text already known to belong to the cell value
    ValueText(String),
    /// Text already known to belong to the cell formula
    FormulaText(String),
    ValueStart,
    ValueEnd,
    FormulaStart,
    FormulaEnd,
    /// Character data routed by whichever sub-element is open
    Text(String),
}

/// Which accumulator raw text goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    /// No `<v>` or `<f>` open; text still counts as value text
    Loose,
    Value,
    Formula,
}

#[derive(Debug, Clone)]
struct PendingCell {
    coord: Coordinate,
    type_code: CellTypeCode,
    style_index: Option<u32>,
}

#[derive(Debug)]
enum State {
    Idle,
    InSheetData,
    InRow,
    InCell { cell: PendingCell, target: TextTarget },
    /// Discarding the rest of a failed row until its `RowEnd`
    Skipping,
    Finished,
}

/// Counters and skipped rows for one decoded sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeSummary {
    pub sheet_id: SheetId,
    pub rows_emitted: u64,
    pub cells_emitted: u64,
    pub skipped_rows: Vec<RowError>,
    /// The sink asked to stop before the end of the sheet
    pub cancelled: bool,
    /// `SheetDataEnd` was reached
    pub completed: bool,
}

/// Decoder for a single sheet stream
pub struct SheetStreamDecoder<'t, S: SheetSink> {
    sheet_id: SheetId,
    config: DecoderConfig,
    shared_strings: &'t dyn SharedStringTable,
    styles: &'t dyn StylesTable,
    sink: S,
    state: State,
    assembler: RowAssembler,
    /// Declared or inferred index of the row in progress
    row_index: Option<u64>,
    last_row_index: Option<u64>,
    value_text: String,
    formula_text: String,
    summary: DecodeSummary,
}

impl<'t, S: SheetSink> SheetStreamDecoder<'t, S> {
    pub fn new(
        sheet_id: SheetId,
        config: DecoderConfig,
        shared_strings: &'t dyn SharedStringTable,
        styles: &'t dyn StylesTable,
        sink: S,
    ) -> Self {
        Self {
            sheet_id,
            config,
            shared_strings,
            styles,
            sink,
            state: State::Idle,
            assembler: RowAssembler::new(),
            row_index: None,
            last_row_index: None,
            value_text: String::new(),
            formula_text: String::new(),
            summary: DecodeSummary {
                sheet_id,
                ..DecodeSummary::default()
            },
        }
    }

    /// No further events will be interpreted
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    pub fn summary(&self) -> &DecodeSummary {
        &self.summary
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Feed every event from `events`, stopping once the sheet is done or cancelled
    pub fn decode<I>(mut self, events: I) -> Result<DecodeSummary>
    where
        I: IntoIterator<Item = SheetEvent>,
    {
        for event in events {
            self.handle(event)?;
            if self.is_finished() {
                break;
            }
        }
        self.finish()
    }

    /// Check the stream did not end in the middle of a row and return the summary
    pub fn finish(self) -> Result<DecodeSummary> {
        match self.state {
            State::InRow | State::InCell { .. } | State::Skipping => Err(DecodeError::malformed(
                "event stream ended inside a row",
            )),
            State::Idle | State::InSheetData | State::Finished => Ok(self.summary),
        }
    }

    /// Apply one event
    pub fn handle(&mut self, event: SheetEvent) -> Result<()> {
        match mem::replace(&mut self.state, State::Finished) {
            State::Finished => Ok(()),
            State::Idle => {
                self.state = match event {
                    SheetEvent::SheetDataStart => {
                        log::debug!("Decoding sheet {}", self.sheet_id);
                        State::InSheetData
                    }
                    _ => State::Idle,
                };
                Ok(())
            }
            State::InSheetData => self.on_sheet_data_event(event),
            State::InRow => self.on_row_event(event),
            State::InCell { cell, target } => self.on_cell_event(cell, target, event),
            State::Skipping => {
                self.state = match event {
                    SheetEvent::RowEnd => {
                        self.last_row_index = Some(self.current_row_index());
                        self.row_index = None;
                        State::InSheetData
                    }
                    SheetEvent::SheetDataEnd => {
                        return Err(DecodeError::malformed("sheet data ended inside a row"));
                    }
                    _ => State::Skipping,
                };
                Ok(())
            }
        }
    }

    fn on_sheet_data_event(&mut self, event: SheetEvent) -> Result<()> {
        match event {
            SheetEvent::RowStart { row_index } => {
                self.row_index = match row_index {
                    Some(0) => {
                        return Err(DecodeError::malformed("row index 0 is not valid"));
                    }
                    Some(r) => Some(r - 1),
                    None if self.last_row_index.is_some_and(|r| r >= u64::MAX - 1) => {
                        return Err(DecodeError::malformed(
                            "row index overflows after the last numbered row",
                        ));
                    }
                    None => None,
                };
                let row = self.current_row_index();
                self.assembler.begin_row(row);
                self.state = State::InRow;
                Ok(())
            }
            SheetEvent::SheetDataEnd => {
                log::debug!(
                    "Sheet {} done: {} rows, {} cells, {} skipped",
                    self.sheet_id,
                    self.summary.rows_emitted,
                    self.summary.cells_emitted,
                    self.summary.skipped_rows.len()
                );
                self.summary.completed = true;
                self.sink.on_finish(self.sheet_id);
                Ok(())
            }
            SheetEvent::Text(_) | SheetEvent::ValueText(_) | SheetEvent::FormulaText(_) => {
                self.state = State::InSheetData;
                Ok(())
            }
            other => Err(DecodeError::malformed(format!(
                "{:?} outside of a row",
                other
            ))),
        }
    }

    fn on_row_event(&mut self, event: SheetEvent) -> Result<()> {
        match event {
            SheetEvent::CellStart {
                coordinate,
                type_code,
                style_index,
            } => {
                self.value_text.clear();
                self.formula_text.clear();
                let coord = match Coordinate::parse(&coordinate) {
                    Ok(coord) => coord,
                    Err(err) => return self.fail_row(err, None),
                };
                self.place_in_row(&coord);
                match CellTypeCode::from_attr(type_code.as_deref()) {
                    Ok(type_code) => {
                        self.state = State::InCell {
                            cell: PendingCell {
                                coord,
                                type_code,
                                style_index,
                            },
                            target: TextTarget::Loose,
                        };
                        Ok(())
                    }
                    Err(err) => self.fail_row(err, Some(coord.column)),
                }
            }
            SheetEvent::RowEnd => self.end_row(),
            SheetEvent::Text(_) => {
                self.state = State::InRow;
                Ok(())
            }
            other => Err(DecodeError::malformed(format!(
                "{:?} inside a row but outside of a cell",
                other
            ))),
        }
    }

    fn on_cell_event(
        &mut self,
        cell: PendingCell,
        target: TextTarget,
        event: SheetEvent,
    ) -> Result<()> {
        let target = match (event, target) {
            (SheetEvent::CellEnd, TextTarget::Loose) => return self.end_cell(cell),
            (SheetEvent::ValueStart, TextTarget::Loose) => TextTarget::Value,
            (SheetEvent::FormulaStart, TextTarget::Loose) => TextTarget::Formula,
            (SheetEvent::ValueEnd, TextTarget::Value) => TextTarget::Loose,
            (SheetEvent::FormulaEnd, TextTarget::Formula) => TextTarget::Loose,
            (SheetEvent::ValueText(text), t) => {
                self.value_text.push_str(&text);
                t
            }
            (SheetEvent::FormulaText(text), t) => {
                self.formula_text.push_str(&text);
                t
            }
            (SheetEvent::Text(text), TextTarget::Formula) => {
                self.formula_text.push_str(&text);
                TextTarget::Formula
            }
            (SheetEvent::Text(text), t) => {
                if t == TextTarget::Loose {
                    log::trace!("Loose text in cell {}", cell.coord);
                }
                self.value_text.push_str(&text);
                t
            }
            (other, t) => {
                return Err(DecodeError::malformed(format!(
                    "{:?} in cell {} ({:?} open)",
                    other, cell.coord, t
                )));
            }
        };
        self.state = State::InCell { cell, target };
        Ok(())
    }

    /// Unnumbered rows take the row of their first cell; a declared row index wins
    fn place_in_row(&mut self, coord: &Coordinate) {
        match self.row_index {
            None => {
                self.row_index = Some(coord.row);
                self.assembler.set_row_index(coord.row);
            }
            Some(row) if row != coord.row => log::warn!(
                "Cell {} in sheet {} is inside row {}; using the row's index",
                coord,
                self.sheet_id,
                row + 1
            ),
            Some(_) => {}
        }
    }

    fn end_cell(&mut self, cell: PendingCell) -> Result<()> {
        let column = cell.coord.column;
        let value = match self.resolve_cell(&cell) {
            Ok(value) => value,
            Err(err) => return self.fail_row(err, Some(column)),
        };
        let first_gap = self.assembler.cursor().column().map_or(0, |c| c + 1);
        if let Err(err) = self.assembler.put(cell.coord, value.clone()) {
            return self.fail_row(err, Some(column));
        }

        let row = self.current_row_index();
        if self.config.emit_blank_cells {
            for gap in first_gap..column {
                self.sink
                    .on_cell(self.sheet_id, row, gap, ResolvedValue::Null, None);
            }
        }
        self.sink
            .on_cell(self.sheet_id, row, column, value, cell.style_index);
        self.summary.cells_emitted += 1;
        self.state = State::InRow;
        Ok(())
    }

    fn resolve_cell(&mut self, cell: &PendingCell) -> Result<ResolvedValue> {
        let style_format = match (cell.type_code, cell.style_index) {
            (CellTypeCode::Null | CellTypeCode::Number, Some(index)) => Some(
                self.styles
                    .format_for_style(index)
                    .ok_or(DecodeError::StyleIndexOutOfRange { index })?,
            ),
            _ => None,
        };

        let cached = resolve(
            cell.type_code,
            &self.value_text,
            style_format,
            self.shared_strings,
        )?;

        if self.formula_text.is_empty() {
            Ok(cached)
        } else {
            Ok(wrap_formula(mem::take(&mut self.formula_text), cached))
        }
    }

    fn end_row(&mut self) -> Result<()> {
        let row_index = self.current_row_index();
        self.assembler.set_row_index(row_index);
        let row = self.assembler.end_row(self.config.pad_to_reference_width);
        self.last_row_index = Some(row_index);
        self.row_index = None;
        self.summary.rows_emitted += 1;
        log::trace!("Row {} complete with {} cells", row_index, row.len());

        match self.sink.on_row(self.sheet_id, row_index, row) {
            ControlFlow::Continue(()) => self.state = State::InSheetData,
            ControlFlow::Break(()) => {
                log::debug!("Sheet {} cancelled after row {}", self.sheet_id, row_index);
                self.summary.cancelled = true;
                self.state = State::Finished;
            }
        }
        Ok(())
    }

    /// Report a row-scoped failure according to the error policy
    fn fail_row(&mut self, err: DecodeError, column: Option<u32>) -> Result<()> {
        let row_error = RowError::new(self.current_row_index(), column, err);
        match self.config.error_policy {
            ErrorPolicy::Strict => {
                self.state = State::Finished;
                Err(DecodeError::Row(row_error))
            }
            ErrorPolicy::BestEffort => {
                log::warn!("Skipping row in sheet {}: {}", self.sheet_id, row_error);
                self.assembler.reset_row();
                self.sink.on_row_error(self.sheet_id, &row_error);
                self.summary.skipped_rows.push(row_error);
                self.state = State::Skipping;
                Ok(())
            }
        }
    }

    /// Index of the row in progress; unknown rows follow the previous one
    ///
    /// Row starts that would overflow are rejected before this is consulted.
    fn current_row_index(&self) -> u64 {
        self.row_index
            .unwrap_or_else(|| self.last_row_index.map_or(0, |r| r.saturating_add(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectRows;

    fn cell(coord: &str, t: Option<&str>, s: Option<u32>) -> SheetEvent {
        SheetEvent::CellStart {
            coordinate: coord.to_string(),
            type_code: t.map(str::to_string),
            style_index: s,
        }
    }

    fn value_cell(coord: &str, t: Option<&str>, v: &str) -> Vec<SheetEvent> {
        vec![
            cell(coord, t, None),
            SheetEvent::ValueText(v.to_string()),
            SheetEvent::CellEnd,
        ]
    }

    fn row(r: Option<u64>, cells: Vec<Vec<SheetEvent>>) -> Vec<SheetEvent> {
        let mut events = vec![SheetEvent::RowStart { row_index: r }];
        events.extend(cells.into_iter().flatten());
        events.push(SheetEvent::RowEnd);
        events
    }

    fn sheet(rows: Vec<Vec<SheetEvent>>) -> Vec<SheetEvent> {
        let mut events = vec![SheetEvent::SheetDataStart];
        events.extend(rows.into_iter().flatten());
        events.push(SheetEvent::SheetDataEnd);
        events
    }

    fn run(
        config: DecoderConfig,
        events: Vec<SheetEvent>,
    ) -> (Result<DecodeSummary>, CollectRows) {
        let sst: Vec<&str> = vec!["a", "b", "c", "d"];
        let styles: Vec<&str> = vec!["General", "m/d/yy"];
        let mut sink = CollectRows::new();
        let result =
            SheetStreamDecoder::new(0, config, &sst, &styles, &mut sink).decode(events);
        (result, sink)
    }

    #[test]
    fn test_row_index_from_attribute_and_fallbacks() {
        let events = sheet(vec![
            row(Some(3), vec![value_cell("A3", None, "1")]),
            row(None, vec![value_cell("B7", None, "2")]),
            row(None, vec![]),
        ]);
        let (result, sink) = run(DecoderConfig::default(), events);
        let summary = result.unwrap();
        assert_eq!(summary.rows_emitted, 3);
        let indices: Vec<u64> = sink.rows.iter().map(|r| r.row_index).collect();
        assert_eq!(indices, vec![2, 6, 7]);
    }

    #[test]
    fn test_declared_row_index_wins_over_cell_reference() {
        let events = sheet(vec![row(Some(2), vec![value_cell("A5", None, "1")])]);
        let (result, sink) = run(DecoderConfig::default(), events);
        result.unwrap();
        assert_eq!(sink.rows[0].row_index, 1);
        assert_eq!(sink.rows[0].get(0), Some(&ResolvedValue::Int(1)));
    }

    #[test]
    fn test_unnumbered_row_after_last_index_is_fatal() {
        let events = sheet(vec![row(Some(u64::MAX), vec![]), row(None, vec![])]);
        let (result, sink) = run(
            DecoderConfig::default().with_error_policy(ErrorPolicy::BestEffort),
            events,
        );
        assert!(matches!(result, Err(DecodeError::MalformedEventSequence(_))));
        assert_eq!(sink.rows.len(), 1);
        assert_eq!(sink.rows[0].row_index, u64::MAX - 1);
    }

    #[test]
    fn test_text_routing() {
        let events = sheet(vec![row(
            Some(1),
            vec![vec![
                cell("A1", None, None),
                SheetEvent::FormulaStart,
                SheetEvent::Text("SUM(".into()),
                SheetEvent::Text("B1:C1)".into()),
                SheetEvent::FormulaEnd,
                SheetEvent::ValueStart,
                SheetEvent::Text("4".into()),
                SheetEvent::Text("2".into()),
                SheetEvent::ValueEnd,
                SheetEvent::CellEnd,
                cell("B1", Some("inlineStr"), None),
                SheetEvent::Text("loose".into()),
                SheetEvent::CellEnd,
            ]],
        )]);
        let (result, sink) = run(DecoderConfig::default(), events);
        result.unwrap();
        let row = &sink.rows[0];
        assert_eq!(
            row.get(0),
            Some(&ResolvedValue::formula("SUM(B1:C1)", ResolvedValue::Int(42)))
        );
        assert_eq!(row.get(1), Some(&ResolvedValue::Str("loose".into())));
    }

    #[test]
    fn test_style_upgrade_and_unresolvable_style() {
        let events = sheet(vec![row(
            Some(1),
            vec![vec![
                cell("A1", None, Some(1)),
                SheetEvent::ValueText("61".into()),
                SheetEvent::CellEnd,
            ]],
        )]);
        let (result, sink) = run(DecoderConfig::default(), events);
        result.unwrap();
        assert_eq!(
            sink.rows[0].get(0).map(|v| v.to_string()),
            Some("1900-03-01 00:00:00".to_string())
        );

        let events = sheet(vec![row(
            Some(1),
            vec![vec![
                cell("A1", None, Some(9)),
                SheetEvent::ValueText("1".into()),
                SheetEvent::CellEnd,
            ]],
        )]);
        let (result, _) = run(DecoderConfig::default(), events);
        match result {
            Err(DecodeError::Row(err)) => {
                assert_eq!(err.row, 0);
                assert_eq!(err.column, Some(0));
                assert_eq!(*err.source, DecodeError::StyleIndexOutOfRange { index: 9 });
            }
            other => panic!("expected row error, got {:?}", other),
        }
    }

    #[test]
    fn test_events_outside_sheet_data_are_ignored() {
        let mut events = vec![
            SheetEvent::Text("header".into()),
            SheetEvent::RowEnd,
            SheetEvent::CellEnd,
        ];
        events.extend(sheet(vec![row(Some(1), vec![value_cell("A1", None, "1")])]));
        events.extend(row(Some(2), vec![value_cell("A2", None, "2")]));
        let (result, sink) = run(DecoderConfig::default(), events);
        let summary = result.unwrap();
        assert!(summary.completed);
        assert!(sink.finished);
        assert_eq!(sink.rows.len(), 1);
    }

    #[test]
    fn test_malformed_nesting_is_fatal() {
        let events = vec![
            SheetEvent::SheetDataStart,
            cell("A1", None, None),
            SheetEvent::CellEnd,
        ];
        let (result, _) = run(
            DecoderConfig::default().with_error_policy(ErrorPolicy::BestEffort),
            events,
        );
        assert!(matches!(result, Err(DecodeError::MalformedEventSequence(_))));

        let events = vec![
            SheetEvent::SheetDataStart,
            SheetEvent::RowStart { row_index: Some(1) },
            cell("A1", None, None),
            SheetEvent::ValueStart,
            SheetEvent::FormulaStart,
        ];
        let (result, _) = run(DecoderConfig::default(), events);
        assert!(matches!(result, Err(DecodeError::MalformedEventSequence(_))));

        let events = vec![
            SheetEvent::SheetDataStart,
            SheetEvent::RowStart { row_index: Some(1) },
        ];
        let (result, _) = run(DecoderConfig::default(), events);
        assert!(matches!(result, Err(DecodeError::MalformedEventSequence(_))));
    }

    #[test]
    fn test_blank_cell_notifications() {
        #[derive(Default)]
        struct Cells(Vec<(u64, u32, ResolvedValue)>);
        impl SheetSink for Cells {
            fn on_cell(&mut self, _: SheetId, row: u64, col: u32, v: ResolvedValue, _: Option<u32>) {
                self.0.push((row, col, v));
            }
            fn on_row(&mut self, _: SheetId, _: u64, _: crate::row::RowBuffer) -> ControlFlow<()> {
                ControlFlow::Continue(())
            }
        }

        let events = sheet(vec![row(
            Some(2),
            vec![value_cell("B2", None, "1"), value_cell("D2", None, "2")],
        )]);
        let sst: Vec<&str> = vec![];
        let styles: Vec<&str> = vec![];

        let mut cells = Cells::default();
        SheetStreamDecoder::new(0, DecoderConfig::default(), &sst, &styles, &mut cells)
            .decode(events.clone())
            .unwrap();
        assert_eq!(
            cells.0,
            vec![(1, 1, ResolvedValue::Int(1)), (1, 3, ResolvedValue::Int(2))]
        );

        let mut cells = Cells::default();
        let config = DecoderConfig::default().with_blank_cells(true);
        SheetStreamDecoder::new(0, config, &sst, &styles, &mut cells)
            .decode(events)
            .unwrap();
        let columns: Vec<u32> = cells.0.iter().map(|(_, c, _)| *c).collect();
        assert_eq!(columns, vec![0, 1, 2, 3]);
        assert_eq!(cells.0[2].2, ResolvedValue::Null);
    }

    #[test]
    fn test_cancellation() {
        let events = sheet(vec![
            row(Some(1), vec![value_cell("A1", None, "1")]),
            row(Some(2), vec![value_cell("A2", None, "2")]),
            row(Some(3), vec![value_cell("A3", None, "3")]),
        ]);
        let sst: Vec<&str> = vec![];
        let styles: Vec<&str> = vec![];
        let mut sink = CollectRows::with_limit(2);
        let summary = SheetStreamDecoder::new(0, DecoderConfig::default(), &sst, &styles, &mut sink)
            .decode(events)
            .unwrap();
        assert!(summary.cancelled);
        assert!(!summary.completed);
        assert_eq!(sink.rows.len(), 2);
        assert!(!sink.finished);
    }
}
