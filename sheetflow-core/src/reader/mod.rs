//! XLSX adapter: feeds worksheet XML through the sheet decoder

pub mod events;
pub mod shared_strings;
pub mod styles;
pub mod workbook;

pub use events::XmlSheetEvents;
pub use shared_strings::SharedStrings;
pub use styles::Styles;
pub use workbook::{SheetInfo, XlsxStreamReader, decode_events};
