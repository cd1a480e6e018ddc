use sheetflow_core::{
    CollectRows, DecoderConfig, ReaderConfig, ResolvedValue, XlsxStreamReader,
};
use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="4">
<si><t>name</t></si><si><t>qty</t></si><si><t>when</t></si><si><r><t>Wid</t></r><r><t>get</t></r></si>
</sst>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="1"><numFmt numFmtId="164" formatCode="0.00"/></numFmts>
<cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/><xf numFmtId="164"/></cellXfs>
</styleSheet>"#;

const DATA_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<dimension ref="A1:D4"/>
<sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c></row>
<row r="2"><c r="A2" t="s"><v>3</v></c><c r="B2"><v>12</v></c><c r="C2" s="1"><v>45292</v></c><c r="D2" s="2"><f>B2*2.5</f><v>30</v></c></row>
<row r="4"><c r="B4" t="inlineStr"><is><t>gap</t></is></c></row>
</sheetData>
</worksheet>"#;

const HIDDEN_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="b"><v>1</v></c></row>
<row r="2"><c r="A2" t="e"><v>#DIV/0!</v></c></row>
</sheetData></worksheet>"#;

const BROKEN_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="s"><v>99</v></c></row>
<row r="2"><c r="A2"><v>5</v></c></row>
</sheetData></worksheet>"#;

// name, state, worksheet xml
const SHEETS: [(&str, Option<&str>, &str); 3] = [
    ("Data", None, DATA_SHEET),
    ("Hidden", Some("hidden"), HIDDEN_SHEET),
    ("Broken", None, BROKEN_SHEET),
];

// Helper to write a minimal XLSX package
fn write_workbook<W: Write + Seek>(writer: W) -> anyhow::Result<W> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
</Types>"#)?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#)?;

    let mut workbook_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>"#,
    );
    let mut rels_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (i, (name, state, _)) in SHEETS.iter().enumerate() {
        let state = state.map(|s| format!(r#" state="{}""#, s)).unwrap_or_default();
        workbook_xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}"{} r:id="rId{}"/>"#,
            name,
            i + 1,
            state,
            i + 1
        ));
        // the last sheet uses an absolute target
        let target = if i + 1 == SHEETS.len() {
            format!("/xl/worksheets/sheet{}.xml", i + 1)
        } else {
            format!("worksheets/sheet{}.xml", i + 1)
        };
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="{}"/>"#,
            i + 1,
            target
        ));
    }
    workbook_xml.push_str("</sheets></workbook>");
    rels_xml.push_str("</Relationships>");

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml.as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(rels_xml.as_bytes())?;
    zip.start_file("xl/sharedStrings.xml", options)?;
    zip.write_all(SHARED_STRINGS.as_bytes())?;
    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(STYLES.as_bytes())?;

    for (i, (_, _, xml)) in SHEETS.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(xml.as_bytes())?;
    }

    Ok(zip.finish()?)
}

fn create_workbook_file(path: &Path) -> anyhow::Result<()> {
    write_workbook(File::create(path)?)?;
    Ok(())
}

fn in_memory_reader() -> anyhow::Result<XlsxStreamReader<Cursor<Vec<u8>>>> {
    let mut cursor = write_workbook(Cursor::new(Vec::new()))?;
    cursor.set_position(0);
    XlsxStreamReader::from_reader(cursor)
}

fn text(value: Option<&ResolvedValue>) -> Option<String> {
    value.map(|v| v.to_string())
}

#[test]
fn test_sheet_listing() -> anyhow::Result<()> {
    let reader = in_memory_reader()?;
    assert_eq!(reader.sheet_names(), vec!["Data", "Hidden", "Broken"]);

    let sheets = reader.sheets();
    assert_eq!(sheets[0].path, "xl/worksheets/sheet1.xml");
    assert_eq!(sheets[2].path, "xl/worksheets/sheet3.xml");
    assert!(sheets[0].visible);
    assert!(!sheets[1].visible);
    assert_eq!(sheets[1].id, 1);

    assert_eq!(reader.find_sheet("rId2").map(|s| s.name.as_str()), Some("Hidden"));
    assert!(reader.find_sheet("Missing").is_none());
    assert_eq!(reader.shared_strings().len(), 4);
    assert_eq!(reader.styles().len(), 3);
    Ok(())
}

#[test]
fn test_read_sheet_values() -> anyhow::Result<()> {
    let mut reader = in_memory_reader()?;
    let mut sink = CollectRows::new();
    let summary = reader.read_sheet_by_name(
        "Data",
        &DecoderConfig::default().with_padding(true),
        &mut sink,
    )?;

    assert!(summary.completed);
    assert_eq!(summary.rows_emitted, 3);
    assert_eq!(summary.cells_emitted, 8);

    let indices: Vec<u64> = sink.rows.iter().map(|r| r.row_index).collect();
    assert_eq!(indices, vec![0, 1, 3]);

    let header = &sink.rows[0];
    assert_eq!(header.len(), 3);
    assert_eq!(text(header.get(2)), Some("when".to_string()));

    let data = &sink.rows[1];
    assert_eq!(data.get(0), Some(&ResolvedValue::Str("Widget".to_string())));
    assert_eq!(data.get(1), Some(&ResolvedValue::Int(12)));
    assert_eq!(text(data.get(2)), Some("2024-01-01 00:00:00".to_string()));
    assert_eq!(
        data.get(3),
        Some(&ResolvedValue::formula("B2*2.5", ResolvedValue::Int(30)))
    );

    let last = &sink.rows[2];
    assert_eq!(last.len(), 4);
    assert_eq!(last.get(0), None);
    assert_eq!(last.get(1), Some(&ResolvedValue::Str("gap".to_string())));
    Ok(())
}

#[test]
fn test_read_all_with_sheet_overrides() -> anyhow::Result<()> {
    let config = ReaderConfig::from_toml_str(
        r#"
[global]
error_policy = "strict"

[sheets.Broken]
error_policy = "best-effort"
"#,
    )?;

    let mut reader = in_memory_reader()?;
    let mut sink = CollectRows::new();
    let summaries = reader.read_all(&config, &mut sink)?;

    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[1].rows_emitted, 2);
    assert_eq!(summaries[2].skipped_rows.len(), 1);
    assert_eq!(sink.rows.len(), 3 + 2 + 1);
    assert_eq!(sink.errors.len(), 1);
    assert_eq!(sink.errors[0].row, 0);

    let hidden_first = &sink.rows[3];
    assert_eq!(hidden_first.get(0), Some(&ResolvedValue::Bool(true)));
    assert_eq!(
        sink.rows[4].get(0),
        Some(&ResolvedValue::Error("#DIV/0!".to_string()))
    );
    Ok(())
}

#[test]
fn test_strict_failure_names_sheet_and_cell() -> anyhow::Result<()> {
    let mut reader = in_memory_reader()?;
    let err = reader
        .read_sheet_by_name("Broken", &DecoderConfig::default(), CollectRows::new())
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Broken"), "{}", message);
    assert!(message.contains("row 1, cell A1"), "{}", message);
    Ok(())
}

#[test]
fn test_read_all_stops_on_cancel() -> anyhow::Result<()> {
    let mut reader = in_memory_reader()?;
    let mut sink = CollectRows::with_limit(2);
    let summaries = reader.read_all(&ReaderConfig::default(), &mut sink)?;
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].cancelled);
    assert_eq!(sink.rows.len(), 2);
    Ok(())
}

#[test]
fn test_read_all_parallel() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("workbook.xlsx");
    create_workbook_file(&path)?;

    let config = ReaderConfig::from_toml_str("[global]\nerror_policy = \"best-effort\"\n")?;
    let reader = XlsxStreamReader::open(&path)?;
    let results = reader.read_all_parallel(&config, |_| CollectRows::new())?;

    assert_eq!(results.len(), 3);
    let counts: Vec<usize> = results.iter().map(|(sink, _)| sink.rows.len()).collect();
    assert_eq!(counts, vec![3, 2, 1]);
    let ids: Vec<u32> = results.iter().map(|(_, summary)| summary.sheet_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(results.iter().all(|(sink, _)| sink.finished));

    // in-memory workbooks have no file to reopen
    let memory = in_memory_reader()?;
    assert!(memory
        .read_all_parallel(&config, |_| CollectRows::new())
        .is_err());
    Ok(())
}
