//! Row writers for CSV, JSON lines and per-cell output

use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use sheetflow_core::{
    ResolvedValue, RowBuffer, RowError, SheetId, SheetSink, column_name,
};
use std::io::{self, Write};
use std::ops::ControlFlow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One comma-separated line per row
    Csv,
    /// One JSON object per row
    Json,
    /// One JSON object per cell, fired as cells are read
    Cells,
}

#[derive(Serialize)]
struct JsonRow<'a> {
    sheet: &'a str,
    row: u64,
    cells: Vec<Option<&'a ResolvedValue>>,
}

#[derive(Serialize)]
struct JsonCell<'a> {
    sheet: &'a str,
    cell: String,
    value: &'a ResolvedValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<u32>,
}

enum Output<W: Write> {
    Csv(csv::Writer<W>),
    Lines(W),
}

/// Sink writing decoded rows to an output stream
///
/// The first write error is kept and stops decoding.
pub struct RowWriter<W: Write> {
    out: Output<W>,
    format: OutputFormat,
    sheet_names: Vec<String>,
    prefix_sheet: bool,
    skipped: usize,
    error: Option<io::Error>,
}

impl<W: Write> RowWriter<W> {
    pub fn new(out: W, format: OutputFormat, sheet_names: Vec<String>) -> Self {
        let out = match format {
            // rows differ in width unless padded
            OutputFormat::Csv => Output::Csv(
                csv::WriterBuilder::new()
                    .flexible(true)
                    .terminator(csv::Terminator::Any(b'\n'))
                    .from_writer(out),
            ),
            OutputFormat::Json | OutputFormat::Cells => Output::Lines(out),
        };
        Self {
            out,
            format,
            sheet_names,
            prefix_sheet: false,
            skipped: 0,
            error: None,
        }
    }

    /// Lead every CSV line with the sheet name
    pub fn with_sheet_column(mut self, prefix: bool) -> Self {
        self.prefix_sheet = prefix;
        self
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Flush and hand back the writer, or the first write error
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        match self.out {
            Output::Csv(writer) => {
                let mut out = writer.into_inner().map_err(|err| err.into_error())?;
                out.flush()?;
                Ok(out)
            }
            Output::Lines(mut out) => {
                out.flush()?;
                Ok(out)
            }
        }
    }

    fn write_row(&mut self, sheet_id: SheetId, row_index: u64, row: &RowBuffer) -> io::Result<()> {
        let sheet = sheet_name(&self.sheet_names, sheet_id);
        match &mut self.out {
            Output::Csv(writer) => {
                let mut record = Vec::with_capacity(row.len() + 1);
                if self.prefix_sheet {
                    record.push(sheet.to_string());
                }
                record.extend(
                    row.iter()
                        .map(|cell| cell.map(ToString::to_string).unwrap_or_default()),
                );
                writer.write_record(&record).map_err(csv_io_error)
            }
            Output::Lines(out) if self.format == OutputFormat::Json => {
                let line = JsonRow {
                    sheet,
                    row: row_index + 1,
                    cells: row.iter().collect(),
                };
                let json = serde_json::to_string(&line).map_err(io::Error::other)?;
                writeln!(out, "{}", json)
            }
            Output::Lines(_) => Ok(()),
        }
    }
}

impl<W: Write> SheetSink for RowWriter<W> {
    fn on_cell(
        &mut self,
        sheet_id: SheetId,
        row_index: u64,
        column_index: u32,
        value: ResolvedValue,
        style_index: Option<u32>,
    ) {
        if self.format != OutputFormat::Cells || self.error.is_some() {
            return;
        }
        let sheet = sheet_name(&self.sheet_names, sheet_id);
        let Output::Lines(out) = &mut self.out else {
            return;
        };
        let line = JsonCell {
            sheet,
            cell: format!("{}{}", column_name(column_index), row_index + 1),
            value: &value,
            style: style_index,
        };
        let result = serde_json::to_string(&line)
            .map_err(io::Error::other)
            .and_then(|json| writeln!(out, "{}", json));
        if let Err(err) = result {
            self.error = Some(err);
        }
    }

    fn on_row(&mut self, sheet_id: SheetId, row_index: u64, row: RowBuffer) -> ControlFlow<()> {
        if self.error.is_none()
            && let Err(err) = self.write_row(sheet_id, row_index, &row)
        {
            self.error = Some(err);
        }
        if self.error.is_some() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn on_row_error(&mut self, sheet_id: SheetId, error: &RowError) {
        self.skipped += 1;
        eprintln!(
            "{} [{}] {}",
            "SKIPPED".yellow().bold(),
            sheet_name(&self.sheet_names, sheet_id).cyan(),
            error
        );
    }
}

fn sheet_name(names: &[String], sheet_id: SheetId) -> &str {
    names
        .get(sheet_id as usize)
        .map(String::as_str)
        .unwrap_or("")
}

/// Keep the I/O error underneath so a closed pipe is still recognisable
fn csv_io_error(err: csv::Error) -> io::Error {
    match err.into_kind() {
        csv::ErrorKind::Io(err) => err,
        kind => io::Error::other(format!("CSV write failed: {:?}", kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: Vec<Option<ResolvedValue>>) -> RowBuffer {
        RowBuffer {
            row_index: 1,
            cells,
        }
    }

    #[test]
    fn test_csv_rows() {
        let mut writer = RowWriter::new(Vec::new(), OutputFormat::Csv, vec!["Data".into()])
            .with_sheet_column(true);
        let flow = writer.on_row(
            0,
            1,
            row(vec![
                Some(ResolvedValue::Str("x, y".into())),
                None,
                Some(ResolvedValue::Bool(true)),
            ]),
        );
        assert_eq!(flow, ControlFlow::Continue(()));
        let _ = writer.on_row(
            0,
            2,
            row(vec![
                Some(ResolvedValue::Str("say \"hi\"".into())),
                Some(ResolvedValue::Str("two\nlines".into())),
            ]),
        );
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(
            out,
            "Data,\"x, y\",,TRUE\nData,\"say \"\"hi\"\"\",\"two\nlines\"\n"
        );
    }

    #[test]
    fn test_json_rows_and_cells() {
        let mut writer = RowWriter::new(Vec::new(), OutputFormat::Json, vec!["S".into()]);
        let _ = writer.on_row(0, 1, row(vec![Some(ResolvedValue::Int(3)), None]));
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(parsed["sheet"], "S");
        assert_eq!(parsed["row"], 2);
        assert_eq!(parsed["cells"][0]["type"], "int");
        assert_eq!(parsed["cells"][0]["value"], 3);
        assert!(parsed["cells"][1].is_null());

        let mut writer = RowWriter::new(Vec::new(), OutputFormat::Cells, vec!["S".into()]);
        writer.on_cell(0, 0, 27, ResolvedValue::Null, Some(4));
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(parsed["cell"], "AB1");
        assert_eq!(parsed["style"], 4);
    }
}
