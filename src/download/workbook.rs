//! Minimal reader for the first worksheet of an `.xlsx` workbook

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{Cursor, Read, Seek};
use zip::result::ZipError;
use zip::ZipArchive;

const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
/// Used when the package has no workbook part to list its sheets
const DEFAULT_SHEET: &str = "xl/worksheets/sheet1.xml";

/// Column `XFD`, the widest a worksheet can be
const MAX_COLUMNS: usize = 16_384;

/// True when the bytes look like a zip container
pub fn is_workbook(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

/// Read every row of the first worksheet as text cells.
///
/// The first worksheet is the first `<sheet>` listed in the workbook part,
/// whatever its file is called. Cells omitted by the writer are returned as
/// empty strings so that each value keeps its column position.
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("Failed to open workbook")?;

    let shared = match read_entry(&mut archive, SHARED_STRINGS)? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_path = first_sheet_path(&mut archive)?;
    let sheet = read_entry(&mut archive, &sheet_path)?
        .with_context(|| format!("Workbook has no worksheet {}", sheet_path))?;

    parse_sheet(&sheet, &shared)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", name)),
    };

    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .with_context(|| format!("Failed to decompress {}", name))?;
    Ok(Some(xml))
}

/// Archive path of the first sheet, via the workbook part and its relationships
fn first_sheet_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let Some(workbook) = read_entry(archive, WORKBOOK)? else {
        return Ok(DEFAULT_SHEET.to_string());
    };
    let rel_id = first_sheet_relation(&workbook)?.context("Workbook lists no sheets")?;

    let rels = read_entry(archive, WORKBOOK_RELS)?
        .context("Workbook has no relationships part")?;
    let target = relation_target(&rels, &rel_id)?
        .with_context(|| format!("Workbook relationship {} not found", rel_id))?;

    // Targets are relative to xl/ unless absolute within the package
    Ok(match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    })
}

/// The `r:id` of the first `<sheet>` in `xl/workbook.xml`
fn first_sheet_relation(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().context("Malformed workbook part")? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                for attr in e.attributes() {
                    let attr = attr.context("Malformed sheet attribute")?;
                    if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some() {
                        return Ok(Some(attr.unescape_value()?.into_owned()));
                    }
                }
                return Ok(None);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn relation_target(xml: &str, rel_id: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().context("Malformed workbook relationships")? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes() {
                    let attr = attr.context("Malformed relationship attribute")?;
                    match attr.key.as_ref() {
                        b"Id" => id = Some(attr.unescape_value()?.into_owned()),
                        b"Target" => target = Some(attr.unescape_value()?.into_owned()),
                        _ => {}
                    }
                }
                if id.as_deref() == Some(rel_id) {
                    return Ok(target);
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // Phonetic runs carry their own <t> elements that are not part of the value
    let mut in_phonetic = false;

    loop {
        match reader.read_event().context("Malformed shared strings")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_text && !in_phonetic => current.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

#[derive(Debug, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Plain,
}

struct Cell {
    column: usize,
    kind: CellKind,
}

impl Cell {
    fn from_start(e: &BytesStart, next_column: usize) -> Result<Self> {
        let mut column = next_column;
        let mut kind = CellKind::Plain;

        for attr in e.attributes() {
            let attr = attr.context("Malformed cell attribute")?;
            let value = attr.unescape_value()?;
            match attr.key.as_ref() {
                b"r" => {
                    if let Some(idx) = column_index(&value)? {
                        column = idx;
                    }
                }
                b"t" => {
                    kind = match value.as_ref() {
                        "s" => CellKind::Shared,
                        "inlineStr" => CellKind::Inline,
                        _ => CellKind::Plain,
                    }
                }
                _ => {}
            }
        }

        Ok(Self { column, kind })
    }

    fn resolve(&self, raw: &str, shared: &[String]) -> Result<String> {
        match self.kind {
            CellKind::Shared => {
                let idx: usize = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("Bad shared string index: {}", raw))?;
                shared
                    .get(idx)
                    .cloned()
                    .with_context(|| format!("Shared string {} out of range", idx))
            }
            CellKind::Inline | CellKind::Plain => Ok(raw.to_string()),
        }
    }
}

/// Zero-based column index of a cell reference such as `C5` or `AB12`.
///
/// A reference without letters yields `None`; one past column `XFD` is an
/// error.
fn column_index(reference: &str) -> Result<Option<usize>> {
    let letters = reference.bytes().take_while(|b| b.is_ascii_alphabetic());

    let mut n = 0usize;
    for b in letters {
        n = n
            .checked_mul(26)
            .and_then(|n| n.checked_add(usize::from(b.to_ascii_uppercase() - b'A' + 1)))
            .filter(|&n| n <= MAX_COLUMNS)
            .with_context(|| format!("Cell reference {} is out of range", reference))?;
    }
    Ok(n.checked_sub(1))
}

fn place(row: &mut Vec<String>, column: usize, value: String) {
    if row.len() <= column {
        row.resize(column + 1, String::new());
    }
    row[column] = value;
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<Cell> = None;
    let mut value = String::new();
    let mut in_value = false;

    loop {
        match reader.read_event().context("Malformed worksheet")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell = Some(Cell::from_start(&e, row.len())?);
                    value.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"row" {
                    rows.push(Vec::new());
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"row" => rows.push(std::mem::take(&mut row)),
                b"c" => {
                    if let Some(c) = cell.take() {
                        let resolved = c.resolve(&value, shared)?;
                        place(&mut row, c.column, resolved);
                    }
                }
                b"v" | b"t" => in_value = false,
                _ => {}
            },
            Event::Text(t) if in_value => value.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rows)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn sheet_xml(sheet_rows: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            sheet_rows
        )
    }

    fn zip_parts(parts: &[(&str, String)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, xml) in parts {
            writer.start_file(*name, options).unwrap();
            writer.write_all(xml.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Build an in-memory workbook with the given shared strings and sheet xml
    pub(crate) fn build_workbook(shared: &[&str], sheet_rows: &str) -> Vec<u8> {
        let items: String = shared
            .iter()
            .map(|s| format!("<si><t>{}</t></si>", s))
            .collect();
        let sst = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{}</sst>"#,
            items
        );
        zip_parts(&[(SHARED_STRINGS, sst), (DEFAULT_SHEET, sheet_xml(sheet_rows))])
    }

    /// A workbook whose first listed sheet lives in `sheet2.xml`
    fn reordered_workbook(target: &str) -> Vec<u8> {
        let workbook = r#"<?xml version="1.0" encoding="UTF-8"?>
            <workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
                      xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
              <sheets>
                <sheet name="Table Shells" sheetId="2" r:id="rId2"/>
                <sheet name="Notes" sheetId="1" r:id="rId1"/>
              </sheets>
            </workbook>"#;
        let rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
              <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
              <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="{}"/>
            </Relationships>"#,
            target
        );
        zip_parts(&[
            (WORKBOOK, workbook.to_string()),
            (WORKBOOK_RELS, rels),
            (
                "xl/worksheets/sheet1.xml",
                sheet_xml(r#"<row><c t="inlineStr"><is><t>Notes</t></is></c></row>"#),
            ),
            (
                "xl/worksheets/sheet2.xml",
                sheet_xml(r#"<row><c t="inlineStr"><is><t>Table ID</t></is></c></row>"#),
            ),
        ])
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1").unwrap(), Some(0));
        assert_eq!(column_index("C5").unwrap(), Some(2));
        assert_eq!(column_index("Z9").unwrap(), Some(25));
        assert_eq!(column_index("AA1").unwrap(), Some(26));
        assert_eq!(column_index("XFD1").unwrap(), Some(16_383));
        assert_eq!(column_index("12").unwrap(), None);
    }

    #[test]
    fn test_column_past_xfd_is_rejected() {
        assert!(column_index("XFE1").is_err());
        assert!(column_index("AAAAAAAAAAAAAAAAAAAAAAAA1").is_err());

        let bytes = build_workbook(&[], r#"<row><c r="AAAAAAAAAAAAAAAAAAAAAAAA1"><v>1</v></c></row>"#);
        let err = read_first_sheet(&bytes).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_first_sheet_follows_workbook_order() {
        let rows = read_first_sheet(&reordered_workbook("worksheets/sheet2.xml")).unwrap();
        assert_eq!(rows, vec![vec!["Table ID".to_string()]]);

        let rows = read_first_sheet(&reordered_workbook("/xl/worksheets/sheet2.xml")).unwrap();
        assert_eq!(rows, vec![vec!["Table ID".to_string()]]);
    }

    #[test]
    fn test_reads_shared_inline_and_numeric_cells() {
        let bytes = build_workbook(
            &["Table ID", "Sex &amp; Age"],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="s"><v>1</v></c></row>
               <row r="2"><c r="A2" t="inlineStr"><is><t>B01001</t></is></c><c r="B2"><v>42</v></c></row>"#,
        );
        assert!(is_workbook(&bytes));

        let rows = read_first_sheet(&bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["Table ID", "", "Sex & Age"]);
        assert_eq!(rows[1], vec!["B01001", "42"]);
    }

    #[test]
    fn test_rejects_non_workbook() {
        assert!(!is_workbook(b"<html></html>"));
        assert!(read_first_sheet(b"<html></html>").is_err());
    }
}
