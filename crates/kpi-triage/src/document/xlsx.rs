//! Minimal XLSX reader: workbook sheet order, shared strings and the cell grid.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use quick_xml::events::{BytesRef, BytesStart, BytesText, Event};
use quick_xml::Reader;

use crate::document::{Document, Sheet};
use crate::error::DecodeError;

pub const MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Columns past `XFD` do not exist in a valid workbook.
const MAX_COLUMNS: usize = 16_384;

pub fn decode(filename: &str, bytes: &[u8]) -> Result<Document, DecodeError> {
    let _span = tracing::debug_span!("decode_xlsx").entered();

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DecodeError::Spreadsheet(format!("Failed to open workbook: {}", e)))?;

    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let workbook = read_entry(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| DecodeError::Spreadsheet("Missing xl/workbook.xml".to_string()))?;
    let relationships = match read_entry(&mut archive, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    let mut sheets = Vec::new();
    for (index, (name, rel_id)) in parse_workbook(&workbook)?.into_iter().enumerate() {
        let path = relationships
            .get(&rel_id)
            .map(|target| resolve_target(target))
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", index + 1));

        match read_entry(&mut archive, &path)? {
            Some(xml) => sheets.push(Sheet::new(name, parse_sheet(&xml, &shared)?)),
            None => tracing::warn!("Workbook {} lists sheet '{}' without data", filename, name),
        }
    }

    Ok(Document::sheets(filename, sheets))
}

fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, DecodeError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(DecodeError::Spreadsheet(format!(
                "Failed to read {}: {}",
                name, e
            )))
        }
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| DecodeError::Spreadsheet(format!("Failed to read {}: {}", name, e)))?;
    Ok(Some(content))
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn attribute(element: &BytesStart, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| {
            let raw = String::from_utf8_lossy(&a.value).into_owned();
            quick_xml::escape::unescape(&raw)
                .map(|v| v.into_owned())
                .unwrap_or(raw)
        })
}

fn push_text(out: &mut String, text: &BytesText) {
    if let Ok(decoded) = text.decode() {
        out.push_str(&decoded);
    }
}

/// Entity references arrive as their own events between text chunks.
fn push_reference(out: &mut String, reference: &BytesRef) {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        out.push(ch);
        return;
    }
    if let Ok(name) = reference.decode() {
        match quick_xml::escape::resolve_predefined_entity(&name) {
            Some(value) => out.push_str(value),
            None => {
                out.push('&');
                out.push_str(&name);
                out.push(';');
            }
        }
    }
}

fn xml_error(e: quick_xml::Error) -> DecodeError {
    DecodeError::Spreadsheet(format!("XML parsing error: {}", e))
}

/// Sheet names with their relationship ids, in workbook order.
fn parse_workbook(xml: &str) -> Result<Vec<(String, String)>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut sheets = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                let name = attribute(e, b"name").unwrap_or_default();
                let rel_id = attribute(e, b"r:id").unwrap_or_default();
                sheets.push((name, rel_id));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }

    Ok(sheets)
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut rels = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attribute(e, b"Id"), attribute(e, b"Target")) {
                    rels.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }

    Ok(rels)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => push_text(&mut current, &e),
            Ok(Event::GeneralRef(e)) if in_text => push_reference(&mut current, &e),
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }

    Ok(strings)
}

/// Zero-based column index of a cell reference such as `AB12`.
///
/// `Ok(None)` when the reference carries no column letters.
fn column_index(reference: &str) -> Result<Option<usize>, DecodeError> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return Ok(None);
    }
    let out_of_range =
        || DecodeError::Spreadsheet(format!("Cell reference '{}' is out of range", reference));
    let mut index = 0usize;
    for b in letters {
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add((b.to_ascii_uppercase() - b'A' + 1) as usize))
            .filter(|i| *i <= MAX_COLUMNS)
            .ok_or_else(out_of_range)?;
    }
    Ok(Some(index - 1))
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_col = 0usize;
    let mut cell_type = String::new();
    let mut value = String::new();
    let mut in_value = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell_col = match attribute(e, b"r") {
                        Some(r) => column_index(&r)?.unwrap_or(row.len()),
                        None => row.len(),
                    };
                    if cell_col >= MAX_COLUMNS {
                        return Err(DecodeError::Spreadsheet(format!(
                            "Row has more than {} cells",
                            MAX_COLUMNS
                        )));
                    }
                    cell_type = attribute(e, b"t").unwrap_or_default();
                    value.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"row" => {
                rows.push(Vec::new());
            }
            Ok(Event::Text(e)) if in_value => push_text(&mut value, &e),
            Ok(Event::GeneralRef(e)) if in_value => push_reference(&mut value, &e),
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let resolved = match cell_type.as_str() {
                        "s" => value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                            .unwrap_or_default(),
                        "b" => match value.trim() {
                            "1" => "TRUE".to_string(),
                            _ => "FALSE".to_string(),
                        },
                        _ => value.clone(),
                    };
                    if row.len() <= cell_col {
                        row.resize(cell_col + 1, String::new());
                    }
                    row[cell_col] = resolved;
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn workbook_bytes() -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        let files = [
            (
                "xl/workbook.xml",
                r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Summary" sheetId="1" r:id="rId1"/><sheet name="P&amp;L" sheetId="2" r:id="rId2"/></sheets></workbook>"#,
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<Relationships><Relationship Id="rId1" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Target="/xl/worksheets/sheet2.xml"/></Relationships>"#,
            ),
            (
                "xl/sharedStrings.xml",
                r#"<sst><si><t>Cash Balance</t></si><si><r><t>Ending </t></r><r><t>Cash</t></r></si></sst>"#,
            ),
            (
                "xl/worksheets/sheet1.xml",
                r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1"><v>45000</v></c></row><row r="2"/><row r="3"><c r="B3" t="inlineStr"><is><t>note</t></is></c><c r="C3" t="b"><v>1</v></c></row></sheetData></worksheet>"#,
            ),
            (
                "xl/worksheets/sheet2.xml",
                r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>1</v></c></row></sheetData></worksheet>"#,
            ),
        ];
        for (name, body) in files {
            zip.start_file(name, opts).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_decode_workbook() {
        let doc = decode("cash.xlsx", &workbook_bytes()).unwrap();
        assert_eq!(doc.sheet_names(), vec!["Summary", "P&L"]);

        let crate::document::DocumentContent::Sheets(sheets) = &doc.content else {
            panic!("expected sheets");
        };
        assert_eq!(sheets[0].rows[0], vec!["Cash Balance", "", "45000"]);
        assert!(sheets[0].rows[1].is_empty());
        assert_eq!(sheets[0].rows[2], vec!["", "note", "TRUE"]);
        assert_eq!(sheets[1].rows[0], vec!["Ending Cash"]);
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            decode("x.xlsx", b"plain text"),
            Err(DecodeError::Spreadsheet(_))
        ));
    }

    fn single_sheet(sheet_xml: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        let files = [
            (
                "xl/workbook.xml",
                r#"<workbook><sheets><sheet name="Data" sheetId="1"/></sheets></workbook>"#,
            ),
            ("xl/worksheets/sheet1.xml", sheet_xml),
        ];
        for (name, body) in files {
            zip.start_file(name, opts).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1").unwrap(), Some(0));
        assert_eq!(column_index("C7").unwrap(), Some(2));
        assert_eq!(column_index("AB12").unwrap(), Some(27));
        assert_eq!(column_index("XFD1").unwrap(), Some(16_383));
        assert_eq!(column_index("12").unwrap(), None);
    }

    #[test]
    fn test_column_beyond_xfd_is_rejected() {
        assert!(column_index("XFE1").is_err());
        assert!(column_index("ZZZZZZZZ1").is_err());
        assert!(column_index("ZZZZZZZZZZZZZZZ1").is_err());
    }

    #[test]
    fn test_oversized_cell_reference_is_a_decode_error() {
        for reference in ["ZZZZZZZZZZZZZZZ1", "ZZZZZZZZ1", "XFE1"] {
            let sheet = format!(
                r#"<worksheet><sheetData><row r="1"><c r="{}"><v>1</v></c></row></sheetData></worksheet>"#,
                reference
            );
            let result = decode("bad.xlsx", &single_sheet(&sheet));
            assert!(
                matches!(&result, Err(DecodeError::Spreadsheet(m)) if m.contains(reference)),
                "{} decoded: {}",
                reference,
                result.is_ok()
            );
        }
    }

    #[test]
    fn test_entity_references_in_cells() {
        let sheet = r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>R&amp;D&#36;5</t></is></c></row></sheetData></worksheet>"#;
        let doc = decode("refs.xlsx", &single_sheet(sheet)).unwrap();
        let crate::document::DocumentContent::Sheets(sheets) = &doc.content else {
            panic!("expected sheets");
        };
        assert_eq!(sheets[0].rows[0], vec!["R&D$5"]);
    }
}
