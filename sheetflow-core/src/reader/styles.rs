//! Cell style number formats (`xl/styles.xml`)

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Seek};
use zip::ZipArchive;

use crate::format::builtin_format_code;
use crate::resolver::StylesTable;

pub const STYLES_PART: &str = "xl/styles.xml";

/// Number format code of every cell style (`<cellXfs>/<xf>`), by style index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Styles {
    formats: Vec<String>,
}

impl Styles {
    pub fn new(formats: Vec<String>) -> Self {
        Self { formats }
    }

    /// Load styles from an archive; a workbook without them gets an empty table
    pub fn load(archive: &mut ZipArchive<impl Read + Seek>) -> Result<Self> {
        let part = match archive.by_name(STYLES_PART) {
            Ok(file) => file,
            Err(_) => return Ok(Self::default()),
        };
        Self::from_reader(BufReader::new(part)).context("Failed to parse styles")
    }

    /// Parse `<styleSheet>` XML, merging custom `<numFmt>` codes over the built-in table
    pub fn from_reader<R: BufRead>(source: R) -> Result<Self> {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut custom: HashMap<u32, String> = HashMap::new();
        let mut xf_format_ids = Vec::new();
        let mut in_cell_xfs = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"numFmt" => {
                        if let Some((id, code)) = parse_num_fmt(&e)? {
                            custom.insert(id, code);
                        }
                    }
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => {
                        let mut num_fmt_id = 0u32;
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"numFmtId"
                                && let Ok(val) = attr.unescape_value()?.parse::<u32>()
                            {
                                num_fmt_id = val;
                            }
                        }
                        xf_format_ids.push(num_fmt_id);
                    }
                    _ => {}
                },
                Event::End(e) => {
                    if e.local_name().as_ref() == b"cellXfs" {
                        in_cell_xfs = false;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let formats = xf_format_ids
            .into_iter()
            .map(|id| {
                custom
                    .get(&id)
                    .cloned()
                    .or_else(|| builtin_format_code(id).map(str::to_string))
                    .unwrap_or_else(|| "General".to_string())
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Loaded {} cell styles ({} custom number formats)",
            formats.len(),
            custom.len()
        );
        Ok(Self { formats })
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

fn parse_num_fmt(e: &BytesStart<'_>) -> Result<Option<(u32, String)>> {
    let mut id = None;
    let mut code = String::new();
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"numFmtId" => id = attr.unescape_value()?.parse::<u32>().ok(),
            b"formatCode" => code = attr.unescape_value()?.to_string(),
            _ => {}
        }
    }
    Ok(id.filter(|_| !code.is_empty()).map(|id| (id, code)))
}

impl StylesTable for Styles {
    fn format_for_style(&self, style_index: u32) -> Option<&str> {
        self.formats.get(style_index as usize).map(String::as_str)
    }
}
