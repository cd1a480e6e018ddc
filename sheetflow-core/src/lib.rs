//! sheetflow-core: streaming row/cell reconstruction for spreadsheet sheet data
//!
//! Sheet XML is turned into a flat stream of structural events which a
//! per-sheet state machine folds into typed cells and dense rows. Rows are
//! handed to a [`SheetSink`] as soon as they close, so memory stays bounded by
//! the widest row rather than by the sheet.

pub mod config;
pub mod coordinate;
pub mod decoder;
pub mod error;
pub mod format;
pub mod reader;
pub mod resolver;
pub mod row;
pub mod sink;
pub mod value;

pub use config::{DecoderConfig, ErrorPolicy, ReaderConfig, SheetOverride};
pub use coordinate::{Coordinate, Cursor, column_name, gap_count};
pub use decoder::{DecodeSummary, SheetEvent, SheetStreamDecoder};
pub use error::{DecodeError, RowError};
pub use format::is_date_format;
pub use reader::{SheetInfo, XlsxStreamReader, decode_events};
pub use resolver::{SharedStringTable, StylesTable, resolve, serial_to_datetime};
pub use row::{RowAssembler, RowBuffer};
pub use sink::{CollectRows, SheetId, SheetSink};
pub use value::{CellTypeCode, ResolvedValue, SerialDateTime};
