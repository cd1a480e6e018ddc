//! Worksheet XML to [`SheetEvent`] translation
//!
//! Only the parts of a worksheet body the decoder cares about are turned into
//! events. Everything else (`<cols>`, `<mergeCells>`, `<extLst>`, ...) is dropped.

use anyhow::{Result, anyhow};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::VecDeque;
use std::io::BufRead;

use crate::coordinate::Coordinate;
use crate::decoder::SheetEvent;

/// Text-bearing element currently open inside a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenText {
    None,
    Value,
    Formula,
    InlineString,
}

/// Pull iterator of sheet events over a worksheet XML stream
pub struct XmlSheetEvents<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    pending: VecDeque<SheetEvent>,
    in_sheet_data: bool,
    in_cell: bool,
    in_inline_string: bool,
    phonetic_depth: usize,
    open_text: OpenText,
    /// 1-based number of the row in progress
    current_row: u64,
    next_col: u32,
    done: bool,
}

impl<R: BufRead> XmlSheetEvents<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            pending: VecDeque::new(),
            in_sheet_data: false,
            in_cell: false,
            in_inline_string: false,
            phonetic_depth: 0,
            open_text: OpenText::None,
            current_row: 0,
            next_col: 0,
            done: false,
        }
    }

    /// Read one XML event and queue whatever sheet events it produces
    fn pump(&mut self) -> Result<()> {
        let mut buf = std::mem::take(&mut self.buf);
        let result = match self.reader.read_event_into(&mut buf) {
            Ok(event) => self.translate(event),
            Err(e) => Err(anyhow!(
                "XML error at position {}: {}",
                self.reader.buffer_position(),
                e
            )),
        };
        buf.clear();
        self.buf = buf;
        result
    }

    fn translate(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::Start(e) => self.on_start(&e, false)?,
            Event::Empty(e) => self.on_start(&e, true)?,
            Event::End(e) => self.on_end(e.local_name().as_ref()),
            Event::Text(e) => {
                let text = e.unescape()?;
                self.on_text(&text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                self.on_text(&text);
            }
            Event::Eof => self.done = true,
            _ => {}
        }
        Ok(())
    }

    fn on_start(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<()> {
        let name = e.local_name();
        let name = name.as_ref();
        if name == b"sheetData" {
            self.in_sheet_data = true;
            self.pending.push_back(SheetEvent::SheetDataStart);
            if empty {
                self.on_end(name);
            }
            return Ok(());
        }
        if !self.in_sheet_data {
            return Ok(());
        }

        match name {
            b"row" => {
                let mut row_index = None;
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"r" {
                        let value = attr.unescape_value()?;
                        row_index = Some(value.trim().parse::<u64>().map_err(|_| {
                            anyhow!("Invalid row number '{}' in sheet data", value)
                        })?);
                    }
                }
                self.current_row = match row_index {
                    Some(r) => r,
                    None => self.current_row.checked_add(1).ok_or_else(|| {
                        anyhow!("Row number overflows after row {}", self.current_row)
                    })?,
                };
                self.next_col = 0;
                self.pending.push_back(SheetEvent::RowStart { row_index });
            }
            b"c" => {
                let mut cell_ref = None;
                let mut type_code = None;
                let mut style_index = None;
                for attr in e.attributes().flatten() {
                    match attr.key.local_name().as_ref() {
                        b"r" => cell_ref = Some(attr.unescape_value()?.to_string()),
                        b"t" => type_code = Some(attr.unescape_value()?.to_string()),
                        b"s" => {
                            let value = attr.unescape_value()?;
                            style_index = Some(value.trim().parse::<u32>().map_err(|_| {
                                anyhow!("Invalid style index '{}' in sheet data", value)
                            })?);
                        }
                        _ => {}
                    }
                }

                let coordinate = match cell_ref {
                    Some(r) => {
                        if let Ok(coord) = Coordinate::parse(&r) {
                            self.next_col = coord.column.saturating_add(1);
                        }
                        r
                    }
                    None => {
                        let coord =
                            Coordinate::new(self.next_col, self.current_row.saturating_sub(1));
                        self.next_col = self.next_col.saturating_add(1);
                        coord.to_a1()
                    }
                };

                self.in_cell = true;
                self.pending.push_back(SheetEvent::CellStart {
                    coordinate,
                    type_code,
                    style_index,
                });
            }
            b"v" if self.in_cell => {
                self.open_text = OpenText::Value;
                self.pending.push_back(SheetEvent::ValueStart);
            }
            b"f" if self.in_cell => {
                self.open_text = OpenText::Formula;
                self.pending.push_back(SheetEvent::FormulaStart);
            }
            b"is" if self.in_cell => self.in_inline_string = true,
            b"rPh" if self.in_inline_string => self.phonetic_depth += 1,
            b"t" if self.in_inline_string && self.phonetic_depth == 0 => {
                self.open_text = OpenText::InlineString;
            }
            _ => {}
        }

        if empty {
            self.on_end(name);
        }
        Ok(())
    }

    fn on_end(&mut self, name: &[u8]) {
        match name {
            b"sheetData" if self.in_sheet_data => {
                self.in_sheet_data = false;
                self.pending.push_back(SheetEvent::SheetDataEnd);
            }
            _ if !self.in_sheet_data => {}
            b"row" => self.pending.push_back(SheetEvent::RowEnd),
            b"c" if self.in_cell => {
                self.in_cell = false;
                self.in_inline_string = false;
                self.phonetic_depth = 0;
                self.open_text = OpenText::None;
                self.pending.push_back(SheetEvent::CellEnd);
            }
            b"v" if self.open_text == OpenText::Value => {
                self.open_text = OpenText::None;
                self.pending.push_back(SheetEvent::ValueEnd);
            }
            b"f" if self.open_text == OpenText::Formula => {
                self.open_text = OpenText::None;
                self.pending.push_back(SheetEvent::FormulaEnd);
            }
            b"t" if self.open_text == OpenText::InlineString => self.open_text = OpenText::None,
            b"rPh" if self.in_inline_string => {
                self.phonetic_depth = self.phonetic_depth.saturating_sub(1)
            }
            b"is" => self.in_inline_string = false,
            _ => {}
        }
    }

    fn on_text(&mut self, text: &str) {
        let keep = match self.open_text {
            OpenText::Value | OpenText::Formula | OpenText::InlineString => true,
            OpenText::None => {
                self.in_cell && !self.in_inline_string && !text.trim().is_empty()
            }
        };
        if keep && !text.is_empty() {
            self.pending.push_back(SheetEvent::Text(text.to_string()));
        }
    }
}

impl<R: BufRead> Iterator for XmlSheetEvents<R> {
    type Item = Result<SheetEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.pump() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}
