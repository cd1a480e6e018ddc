//! Shared string table (`xl/sharedStrings.xml`)

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{BufRead, BufReader, Read, Seek};
use zip::ZipArchive;

use crate::resolver::SharedStringTable;

pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// All `<si>` entries of a workbook, in index order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedStrings {
    strings: Vec<String>,
}

impl SharedStrings {
    pub fn new(strings: Vec<String>) -> Self {
        Self { strings }
    }

    /// Load the table from an archive; a workbook without one gets an empty table
    pub fn load(archive: &mut ZipArchive<impl Read + Seek>) -> Result<Self> {
        let part = match archive.by_name(SHARED_STRINGS_PART) {
            Ok(file) => file,
            Err(_) => return Ok(Self::default()),
        };
        Self::from_reader(BufReader::new(part)).context("Failed to parse shared strings")
    }

    /// Parse `<sst>` XML. Rich text runs are concatenated; phonetic runs are skipped.
    pub fn from_reader<R: BufRead>(source: R) -> Result<Self> {
        let mut reader = Reader::from_reader(source);
        let mut buf = Vec::new();
        let mut strings = Vec::new();
        let mut current_string = String::new();
        let mut in_text = false;
        let mut phonetic_depth = 0usize;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"t" => in_text = phonetic_depth == 0,
                    b"rPh" => phonetic_depth += 1,
                    b"si" => current_string.clear(),
                    _ => {}
                },
                Event::Empty(e) if e.local_name().as_ref() == b"si" => {
                    strings.push(String::new());
                }
                Event::Text(e) if in_text => current_string.push_str(&e.unescape()?),
                Event::CData(e) if in_text => {
                    current_string.push_str(&String::from_utf8_lossy(&e))
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                    b"si" => strings.push(std::mem::take(&mut current_string)),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        log::debug!("Loaded {} shared strings", strings.len());
        Ok(Self { strings })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl SharedStringTable for SharedStrings {
    fn get(&self, index: u32) -> Option<&str> {
        self.strings.as_slice().get(index as usize).map(String::as_str)
    }
}
