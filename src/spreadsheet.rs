//! XLSX (OOXML) worksheet reader.
//!
//! Reads the first worksheet of a workbook into a rectangular grid of
//! strings. Cells are placed by their `r` reference (`B3`), so sparse rows
//! keep their column alignment. Shared strings, inline strings, booleans and
//! numbers are all returned as text.

use std::io::Read;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::SourceError;

/// Maximum cells to read from a sheet (avoids unbounded memory).
const MAX_CELLS_PER_SHEET: usize = 250_000;
/// Number of columns in a worksheet; the last one is `XFD`.
const MAX_COLUMNS: usize = 16_384;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn parse_error(msg: impl std::fmt::Display) -> SourceError {
    SourceError::fetch("spreadsheet_parse", format!("Failed to read spreadsheet: {}", msg))
}

/// Reads the first worksheet. Trailing empty rows are dropped.
pub fn read_xlsx(bytes: &[u8]) -> Result<Vec<Vec<String>>, SourceError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(parse_error)?;

    let has_shared_strings = archive.file_names().any(|n| n == "xl/sharedStrings.xml");
    let shared_strings = if has_shared_strings {
        let xml = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?;
        read_shared_strings(&xml)?
    } else {
        Vec::new()
    };

    let sheet = match first_sheet_in_tab_order(&mut archive)? {
        Some(sheet) => sheet,
        None => first_worksheet_name(&archive)
            .ok_or_else(|| parse_error("workbook contains no worksheets"))?,
    };
    let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet)?;
    let mut grid = read_sheet_cells(&sheet_xml, &shared_strings, MAX_CELLS_PER_SHEET)?;

    while grid.last().is_some_and(|row| row.iter().all(|c| c.trim().is_empty())) {
        grid.pop();
    }
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut grid {
        row.resize(width, String::new());
    }
    Ok(grid)
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, SourceError> {
    let entry = archive.by_name(name).map_err(parse_error)?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(parse_error)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(parse_error(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Finds the first sheet listed in `xl/workbook.xml` and follows its
/// relationship to the worksheet part. `None` when the workbook has no
/// manifest or the sheet cannot be resolved.
fn first_sheet_in_tab_order(archive: &mut Archive<'_>) -> Result<Option<String>, SourceError> {
    let has_manifest = ["xl/workbook.xml", "xl/_rels/workbook.xml.rels"]
        .iter()
        .all(|part| archive.file_names().any(|n| n == *part));
    if !has_manifest {
        return Ok(None);
    }

    let workbook = read_zip_entry_bounded(archive, "xl/workbook.xml")?;
    let Some(rel_id) = first_attr_of(&workbook, b"sheet", |key| key.ends_with(b":id"))? else {
        return Ok(None);
    };

    let rels = read_zip_entry_bounded(archive, "xl/_rels/workbook.xml.rels")?;
    let mut reader = Reader::from_reader(rels.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let value = attr.unescape_value().map_err(parse_error)?.to_string();
                    match attr.key.as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if id.as_deref() == Some(rel_id.as_str()) {
                    let Some(target) = target else {
                        return Ok(None);
                    };
                    let part = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    };
                    let exists = archive.file_names().any(|n| n == part);
                    return Ok(exists.then_some(part));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
        buf.clear();
    }
}

/// Value of the first attribute matching `key` on the first `element`.
fn first_attr_of(
    xml: &[u8],
    element: &[u8],
    key: impl Fn(&[u8]) -> bool,
) -> Result<Option<String>, SourceError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == element => {
                for attr in e.attributes().flatten() {
                    if key(attr.key.as_ref()) {
                        return Ok(Some(attr.unescape_value().map_err(parse_error)?.to_string()));
                    }
                }
                return Ok(None);
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
        buf.clear();
    }
}

/// Fallback for workbooks without a manifest: lowest-numbered sheet part.
fn first_worksheet_name(archive: &Archive<'_>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(str::to_string)
}

/// Each `<si>` becomes one string; rich-text runs are concatenated.
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, SourceError> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_t = !in_phonetic,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(parse_error)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellType {
    Number,
    SharedString,
    InlineString,
    Boolean,
    Other,
}

fn cell_attrs(e: &BytesStart<'_>) -> Result<(Option<usize>, CellType), SourceError> {
    let mut column = None;
    let mut kind = CellType::Number;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"r" => column = column_index(&String::from_utf8_lossy(&attr.value))?,
            b"t" => {
                kind = match attr.value.as_ref() {
                    b"s" => CellType::SharedString,
                    b"inlineStr" => CellType::InlineString,
                    b"b" => CellType::Boolean,
                    b"n" => CellType::Number,
                    _ => CellType::Other,
                }
            }
            _ => {}
        }
    }
    Ok((column, kind))
}

/// `"C12"` → `Some(2)`. References past `XFD` are an error.
fn column_index(reference: &str) -> Result<Option<usize>, SourceError> {
    let letters: String = reference.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        return Ok(None);
    }
    let mut index = 0usize;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add(digit))
            .filter(|&i| i <= MAX_COLUMNS)
            .ok_or_else(|| parse_error(format!("cell reference '{}' is beyond column XFD", reference)))?;
    }
    Ok(Some(index - 1))
}

/// Column for a cell without an `r` reference: the next one in the row.
fn next_column(row: Option<&Vec<String>>) -> Result<usize, SourceError> {
    let col = row.map(Vec::len).unwrap_or(0);
    if col >= MAX_COLUMNS {
        return Err(parse_error(format!("row has more than {} columns", MAX_COLUMNS)));
    }
    Ok(col)
}

fn read_sheet_cells(
    xml: &[u8],
    shared_strings: &[String],
    max_cells: usize,
) -> Result<Vec<Vec<String>>, SourceError> {
    let mut grid: Vec<Vec<String>> = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row: Option<Vec<String>> = None;
    let mut cell_col = 0usize;
    let mut cell_type = CellType::Number;
    let mut cell_value = String::new();
    let mut in_value = false;
    let mut cell_count = 0usize;

    let mut count_cell = || {
        cell_count += 1;
        if cell_count > max_cells {
            return Err(parse_error(format!("sheet exceeds {} cells", max_cells)));
        }
        Ok(())
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => {
                    let (col, kind) = cell_attrs(&e)?;
                    cell_col = match col {
                        Some(col) => col,
                        None => next_column(row.as_ref())?,
                    };
                    cell_type = kind;
                    cell_value.clear();
                }
                b"v" => in_value = true,
                b"t" if cell_type == CellType::InlineString => in_value = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" => grid.push(Vec::new()),
                b"c" => {
                    count_cell()?;
                    let (col, _) = cell_attrs(&e)?;
                    let col = match col {
                        Some(col) => col,
                        None => next_column(row.as_ref())?,
                    };
                    if let Some(r) = row.as_mut() {
                        if r.len() <= col {
                            r.resize(col + 1, String::new());
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                cell_value.push_str(&te.unescape().map_err(parse_error)?);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let text = resolve_cell(cell_type, cell_value.trim(), shared_strings);
                    if let Some(r) = row.as_mut() {
                        if r.len() <= cell_col {
                            r.resize(cell_col + 1, String::new());
                        }
                        r[cell_col] = text;
                    }
                    count_cell()?;
                }
                b"row" => grid.push(row.take().unwrap_or_default()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(grid)
}

fn resolve_cell(kind: CellType, raw: &str, shared_strings: &[String]) -> String {
    match kind {
        CellType::SharedString => raw
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .cloned()
            .unwrap_or_default(),
        CellType::Boolean => match raw {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        CellType::Number => raw
            .strip_suffix(".0")
            .map(str::to_string)
            .unwrap_or_else(|| raw.to_string()),
        CellType::InlineString | CellType::Other => raw.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a minimal workbook with one worksheet and shared strings.
    pub(crate) fn minimal_xlsx(shared: &[&str], sheet_rows: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("xl/sharedStrings.xml", options).unwrap();
            let items: String = shared.iter().map(|s| format!("<si><t>{}</t></si>", s)).collect();
            write!(
                zip,
                "<?xml version=\"1.0\"?><sst xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">{}</sst>",
                items
            )
            .unwrap();
            zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
            write!(
                zip,
                "<?xml version=\"1.0\"?><worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>{}</sheetData></worksheet>",
                sheet_rows
            )
            .unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            for (name, body) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    fn inline_sheet(text: &str) -> String {
        format!(
            "<worksheet><sheetData><row r=\"1\"><c r=\"A1\" t=\"inlineStr\"><is><t>{}</t></is></c></row></sheetData></worksheet>",
            text
        )
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1").unwrap(), Some(0));
        assert_eq!(column_index("C12").unwrap(), Some(2));
        assert_eq!(column_index("AA3").unwrap(), Some(26));
        assert_eq!(column_index("XFD1").unwrap(), Some(16_383));
        assert_eq!(column_index("12").unwrap(), None);
        assert_eq!(column_index("XFE1").unwrap_err().code, "spreadsheet_parse");
    }

    #[test]
    fn test_oversized_cell_reference_is_an_error() {
        let xlsx = minimal_xlsx(
            &["x"],
            r#"<row r="1"><c r="ZZZZZZZZZZZZZZZZ1" t="s"><v>0</v></c></row>"#,
        );
        let err = read_xlsx(&xlsx).unwrap_err();
        assert_eq!(err.code, "spreadsheet_parse");
        assert!(err.message.contains("XFD"));
    }

    #[test]
    fn test_cell_limit_is_an_error_not_a_truncation() {
        let xml = br#"<worksheet><sheetData>
            <row r="1"><c r="A1"><v>1</v></c><c r="B1"><v>2</v></c></row>
            <row r="2"><c r="A2"><v>3</v></c><c r="B2"/></row>
        </sheetData></worksheet>"#;
        assert_eq!(read_sheet_cells(xml, &[], 4).unwrap().len(), 2);
        let err = read_sheet_cells(xml, &[], 3).unwrap_err();
        assert!(err.message.contains("sheet exceeds 3 cells"));
    }

    #[test]
    fn test_first_sheet_follows_workbook_tab_order() {
        let first = inline_sheet("first tab");
        let second = inline_sheet("second tab");
        let xlsx = zip_of(&[
            (
                "xl/workbook.xml",
                r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>
                     <sheet name="Summary" sheetId="2" r:id="rId2"/>
                     <sheet name="Data" sheetId="1" r:id="rId1"/>
                   </sheets></workbook>"#,
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<Relationships>
                     <Relationship Id="rId1" Target="worksheets/sheet1.xml"/>
                     <Relationship Id="rId2" Target="/xl/worksheets/sheet2.xml"/>
                   </Relationships>"#,
            ),
            ("xl/worksheets/sheet1.xml", second.as_str()),
            ("xl/worksheets/sheet2.xml", first.as_str()),
        ]);
        assert_eq!(read_xlsx(&xlsx).unwrap(), vec![vec!["first tab"]]);
    }

    #[test]
    fn test_reads_shared_inline_and_numbers() {
        let xlsx = minimal_xlsx(
            &["city", "zip", "Springfield"],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
               <row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>11111</v></c></row>
               <row r="3"><c r="A3" t="inlineStr"><is><t>Shelbyville</t></is></c><c r="B3"><v>22222.0</v></c></row>"#,
        );
        let grid = read_xlsx(&xlsx).unwrap();
        assert_eq!(
            grid,
            vec![
                vec!["city", "zip"],
                vec!["Springfield", "11111"],
                vec!["Shelbyville", "22222"],
            ]
        );
    }

    #[test]
    fn test_sparse_cells_keep_alignment() {
        let xlsx = minimal_xlsx(
            &["x"],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="b"><v>1</v></c></row>"#,
        );
        let grid = read_xlsx(&xlsx).unwrap();
        assert_eq!(grid, vec![vec!["x", "", "TRUE"]]);
    }

    #[test]
    fn test_not_a_zip() {
        let err = read_xlsx(b"not a workbook").unwrap_err();
        assert_eq!(err.code, "spreadsheet_parse");
    }
}
