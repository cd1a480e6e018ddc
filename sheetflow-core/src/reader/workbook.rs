//! Streaming XLSX workbook reader

use anyhow::{Context, Result, anyhow};
use quick_xml::Reader;
use quick_xml::events::Event;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use super::events::XmlSheetEvents;
use super::shared_strings::SharedStrings;
use super::styles::Styles;
use crate::config::{DecoderConfig, ReaderConfig};
use crate::decoder::{DecodeSummary, SheetEvent, SheetStreamDecoder};
use crate::sink::{SheetId, SheetSink};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

/// A worksheet declared in `xl/workbook.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    /// Position in workbook order, used as the sheet id in sink callbacks
    pub id: SheetId,
    pub name: String,
    /// Relationship id (`r:id`), e.g. `rId1`
    pub rel_id: String,
    /// Archive path of the worksheet part
    pub path: String,
    /// False for `hidden` and `veryHidden` sheets
    pub visible: bool,
}

/// Reads worksheets one event at a time, never materializing a whole sheet
pub struct XlsxStreamReader<R: Read + Seek> {
    path: Option<PathBuf>,
    archive: ZipArchive<R>,
    sheets: Vec<SheetInfo>,
    shared_strings: SharedStrings,
    styles: Styles,
}

impl XlsxStreamReader<BufReader<File>> {
    /// Open a workbook from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("Failed to open file: {}", path_ref.display()))?;
        let mut reader = Self::from_reader(BufReader::new(file))?;
        reader.path = Some(path_ref.to_path_buf());
        Ok(reader)
    }
}

impl<R: Read + Seek> XlsxStreamReader<R> {
    /// Open a workbook from any seekable byte source
    pub fn from_reader(source: R) -> Result<Self> {
        let mut archive = ZipArchive::new(source).context("Failed to open zip archive")?;
        let sheets = read_sheet_list(&mut archive)?;
        let shared_strings = SharedStrings::load(&mut archive)?;
        let styles = Styles::load(&mut archive)?;
        log::debug!(
            "Opened workbook with {} sheets, {} shared strings, {} styles",
            sheets.len(),
            shared_strings.len(),
            styles.len()
        );
        Ok(Self {
            path: None,
            archive,
            sheets,
            shared_strings,
            styles,
        })
    }

    pub fn sheets(&self) -> &[SheetInfo] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Look a sheet up by name, falling back to its relationship id
    pub fn find_sheet(&self, name: &str) -> Option<&SheetInfo> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.sheets.iter().find(|s| s.rel_id == name))
    }

    pub fn shared_strings(&self) -> &SharedStrings {
        &self.shared_strings
    }

    pub fn styles(&self) -> &Styles {
        &self.styles
    }

    /// Stream one sheet through `sink`
    pub fn read_sheet<S: SheetSink>(
        &mut self,
        sheet_id: SheetId,
        config: &DecoderConfig,
        sink: S,
    ) -> Result<DecodeSummary> {
        let info = self
            .sheets
            .get(sheet_id as usize)
            .ok_or_else(|| anyhow!("Sheet {} does not exist", sheet_id))?;
        let part = self
            .archive
            .by_name(&info.path)
            .with_context(|| format!("Failed to find {} for sheet '{}'", info.path, info.name))?;
        decode_sheet(
            info,
            part,
            config.clone(),
            &self.shared_strings,
            &self.styles,
            sink,
        )
    }

    pub fn read_sheet_by_name<S: SheetSink>(
        &mut self,
        name: &str,
        config: &DecoderConfig,
        sink: S,
    ) -> Result<DecodeSummary> {
        let id = self
            .find_sheet(name)
            .map(|s| s.id)
            .ok_or_else(|| anyhow!("Sheet '{}' not found in workbook", name))?;
        self.read_sheet(id, config, sink)
    }

    /// Stream every sheet in workbook order through one sink
    ///
    /// A sink that cancels a sheet also stops the sheets after it.
    pub fn read_all<S: SheetSink>(
        &mut self,
        config: &ReaderConfig,
        mut sink: S,
    ) -> Result<Vec<DecodeSummary>> {
        let mut summaries = Vec::with_capacity(self.sheets.len());
        for id in 0..self.sheets.len() as SheetId {
            let sheet_config = config.for_sheet(&self.sheets[id as usize].name);
            let summary = self.read_sheet(id, &sheet_config, &mut sink)?;
            let cancelled = summary.cancelled;
            summaries.push(summary);
            if cancelled {
                break;
            }
        }
        Ok(summaries)
    }

    /// Decode all sheets concurrently, one sink per sheet
    ///
    /// Each worker opens its own handle on the workbook file. The string and
    /// style tables are shared read-only. Results come back in workbook order.
    pub fn read_all_parallel<S, F>(
        &self,
        config: &ReaderConfig,
        make_sink: F,
    ) -> Result<Vec<(S, DecodeSummary)>>
    where
        S: SheetSink + Send,
        F: Fn(&SheetInfo) -> S + Sync,
    {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| anyhow!("Parallel reading needs a workbook opened from a file"))?;
        let shared_strings = &self.shared_strings;
        let styles = &self.styles;

        self.sheets
            .par_iter()
            .map(|info| -> Result<(S, DecodeSummary)> {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open file: {}", path.display()))?;
                let mut archive =
                    ZipArchive::new(BufReader::new(file)).context("Failed to open zip archive")?;
                let part = archive.by_name(&info.path).with_context(|| {
                    format!("Failed to find {} for sheet '{}'", info.path, info.name)
                })?;
                let mut sink = make_sink(info);
                let summary = decode_sheet(
                    info,
                    part,
                    config.for_sheet(&info.name),
                    shared_strings,
                    styles,
                    &mut sink,
                )?;
                Ok((sink, summary))
            })
            .collect()
    }
}

fn decode_sheet<S: SheetSink>(
    info: &SheetInfo,
    part: impl Read,
    config: DecoderConfig,
    shared_strings: &SharedStrings,
    styles: &Styles,
    sink: S,
) -> Result<DecodeSummary> {
    log::debug!("Reading sheet '{}' from {}", info.name, info.path);
    let decoder = SheetStreamDecoder::new(info.id, config, shared_strings, styles, sink);
    decode_events(decoder, XmlSheetEvents::new(BufReader::new(part)))
        .with_context(|| format!("Failed to decode sheet '{}'", info.name))
}

/// Drive a decoder from a fallible event source, stopping at the first error
pub fn decode_events<S, I>(
    mut decoder: SheetStreamDecoder<'_, S>,
    events: I,
) -> Result<DecodeSummary>
where
    S: SheetSink,
    I: IntoIterator<Item = Result<SheetEvent>>,
{
    for event in events {
        decoder.handle(event?)?;
        if decoder.is_finished() {
            break;
        }
    }
    Ok(decoder.finish()?)
}

/// Declared sheets in workbook order, with their archive paths resolved
fn read_sheet_list(archive: &mut ZipArchive<impl Read + Seek>) -> Result<Vec<SheetInfo>> {
    let targets = read_relationship_targets(archive)?;

    let workbook_xml = archive
        .by_name(WORKBOOK_PART)
        .with_context(|| format!("Failed to find {}", WORKBOOK_PART))?;
    let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
    reader.config_mut().trim_text(true);

    let mut sheets = Vec::new();
    let mut buf = Vec::new();
    let mut in_sheets = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheets" => in_sheets = true,
                b"sheet" if in_sheets => {
                    let mut name = String::new();
                    let mut rel_id = String::new();
                    let mut state = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"name" => name = attr.unescape_value()?.to_string(),
                            b"id" => rel_id = attr.unescape_value()?.to_string(),
                            b"state" => state = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }
                    let target = targets.get(&rel_id).ok_or_else(|| {
                        anyhow!("Relationship '{}' not found for sheet '{}'", rel_id, name)
                    })?;
                    sheets.push(SheetInfo {
                        id: sheets.len() as SheetId,
                        path: resolve_part_path(target),
                        visible: state != "hidden" && state != "veryHidden",
                        name,
                        rel_id,
                    });
                }
                _ => {}
            },
            Event::End(e) => {
                if e.local_name().as_ref() == b"sheets" {
                    in_sheets = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn read_relationship_targets(
    archive: &mut ZipArchive<impl Read + Seek>,
) -> Result<HashMap<String, String>> {
    let rels_xml = archive
        .by_name(WORKBOOK_RELS_PART)
        .with_context(|| format!("Failed to find {}", WORKBOOK_RELS_PART))?;
    let mut reader = Reader::from_reader(BufReader::new(rels_xml));
    reader.config_mut().trim_text(true);

    let mut targets = HashMap::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut id = String::new();
                    let mut target = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Id" => id = attr.unescape_value()?.to_string(),
                            b"Target" => target = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }
                    if !id.is_empty() {
                        targets.insert(id, target);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// Relationship targets are relative to `xl/` unless they start with `/`
fn resolve_part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_part_path() {
        assert_eq!(
            resolve_part_path("worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_part_path("/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
    }
}
