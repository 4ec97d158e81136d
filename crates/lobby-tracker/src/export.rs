//! XLSX export of a search result.
//!
//! The workbook is assembled directly as SpreadsheetML parts in a zip
//! archive: a `Summary` sheet first, then one sheet per queried
//! jurisdiction in result order. Cells use inline strings, so no shared
//! string table is written.

use crate::error::ExportResult;
use crate::types::{JurisdictionOutcome, JurisdictionStatus, Record, SearchResult};
use quick_xml::escape::escape;
use std::collections::{BTreeSet, HashSet};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Longest text a cell may hold (Excel's own limit is 32,767).
pub const MAX_CELL_CHARS: usize = 32_000;
/// Excel's sheet name limit.
pub const MAX_SHEET_NAME: usize = 31;

const RECORD_COLUMNS: [&str; 6] = [
    "Jurisdiction",
    "Entity Name",
    "Entity Type",
    "Financial Range",
    "Meeting Count",
    "Activities",
];
const SUMMARY_COLUMNS: [&str; 6] = ["Jurisdiction", "Name", "Status", "Records", "Detail", "From Cache"];

enum Cell {
    Text(String),
    Number(u64),
    Empty,
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }
}

struct Sheet {
    name: String,
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Download file name for a term: `shell_plc_lobbying.xlsx`.
pub fn export_filename(term: &str) -> String {
    let mut slug = String::new();
    for ch in term.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "search_lobbying.xlsx".to_string()
    } else {
        format!("{slug}_lobbying.xlsx")
    }
}

/// Strip characters Excel forbids in sheet names and cap the length.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, ':' | '\\' | '/' | '?' | '*' | '[' | ']'))
        .take(MAX_SHEET_NAME)
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned
    }
}

/// Cell-safe text: characters XML 1.0 cannot carry are dropped and the
/// result is capped at [`MAX_CELL_CHARS`].
pub fn clean_cell_text(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r')
                || (c >= '\u{20}' && c != '\u{FFFE}' && c != '\u{FFFF}')
        })
        .take(MAX_CELL_CHARS)
        .collect()
}

/// Excel column letters for a zero-based index: 0 → A, 26 → AA.
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// Sorted union of raw field keys across records.
fn raw_keys(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.raw.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn summary_sheet(result: &SearchResult) -> Sheet {
    let rows = result
        .outcomes
        .iter()
        .map(|o| {
            let info = o.jurisdiction.info();
            let detail = match &o.status {
                JurisdictionStatus::Error { reason } => reason.as_str(),
                _ => info.note.unwrap_or(""),
            };
            vec![
                Cell::from(o.jurisdiction.as_str()),
                Cell::from(info.name),
                Cell::from(o.status.label()),
                Cell::Number(o.records.len() as u64),
                Cell::from(detail),
                Cell::from(if o.from_cache { "yes" } else { "no" }),
            ]
        })
        .collect();
    Sheet {
        name: "Summary".to_string(),
        header: SUMMARY_COLUMNS.iter().map(|s| s.to_string()).collect(),
        rows,
    }
}

fn outcome_sheet(outcome: &JurisdictionOutcome) -> Sheet {
    let keys = raw_keys(&outcome.records);
    let mut header: Vec<String> = RECORD_COLUMNS.iter().map(|s| s.to_string()).collect();
    header.extend(keys.iter().cloned());

    let rows = outcome
        .records
        .iter()
        .map(|r| {
            let mut row = vec![
                Cell::from(r.jurisdiction.as_str()),
                Cell::from(r.entity_name.as_str()),
                Cell::from(r.entity_type.map(|t| t.as_str()).unwrap_or("")),
                Cell::from(r.financial_range.as_deref().unwrap_or("")),
                r.meeting_count.map_or(Cell::Empty, |n| Cell::Number(n.into())),
                Cell::from(r.activities.join("\n")),
            ];
            row.extend(
                keys.iter()
                    .map(|k| Cell::from(r.raw.get(k).map(String::as_str).unwrap_or(""))),
            );
            row
        })
        .collect();

    Sheet {
        name: sanitize_sheet_name(outcome.jurisdiction.info().name),
        header,
        rows,
    }
}

/// Build the workbook for `result` as XLSX bytes.
pub fn write_workbook(result: &SearchResult) -> ExportResult<Vec<u8>> {
    let mut sheets = vec![summary_sheet(result)];
    sheets.extend(result.outcomes.iter().map(outcome_sheet));
    make_names_unique(&mut sheets);

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types(sheets.len()).as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;
    zip.start_file("docProps/core.xml", options)?;
    zip.write_all(core_properties(result).as_bytes())?;
    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook(&sheets).as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(workbook_rels(sheets.len()).as_bytes())?;
    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(STYLES.as_bytes())?;
    for (i, sheet) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(worksheet(sheet).as_bytes())?;
    }

    let bytes = zip.finish()?.into_inner();
    tracing::debug!(
        term = %result.term,
        sheets = sheets.len(),
        bytes = bytes.len(),
        "workbook written"
    );
    Ok(bytes)
}

/// Suffix repeated sheet names (Excel compares them case-insensitively).
fn make_names_unique(sheets: &mut [Sheet]) {
    let mut used = HashSet::new();
    for sheet in sheets.iter_mut() {
        let base = sheet.name.clone();
        let mut n = 2;
        while !used.insert(sheet.name.to_lowercase()) {
            let suffix = format!(" ({n})");
            let keep = MAX_SHEET_NAME.saturating_sub(suffix.chars().count());
            sheet.name = format!("{}{suffix}", base.chars().take(keep).collect::<String>());
            n += 1;
        }
    }
}

// ── Parts ──

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment wrapText="1" vertical="top"/></xf></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

const HEADER_STYLE: u8 = 1;
const WRAP_STYLE: u8 = 2;

fn content_types(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn core_properties(result: &SearchResult) -> String {
    let title = clean_cell_text(&format!("Lobbying report: {}", result.term));
    let created = result.searched_at.format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{}</dc:title><dc:creator>lobby-tracker</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{created}</dcterms:created></cp:coreProperties>"#,
        escape(title.as_str())
    )
}

fn workbook(sheets: &[Sheet]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    for (i, sheet) in sheets.iter().enumerate() {
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(sheet.name.as_str()),
            i + 1,
            i + 1
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{i}.xml"/>"#
        ));
    }
    xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        sheet_count + 1
    ));
    xml.push_str("</Relationships>");
    xml
}

fn push_cell(xml: &mut String, reference: &str, cell: &Cell, style: u8) {
    let style_attr = if style == 0 {
        String::new()
    } else {
        format!(r#" s="{style}""#)
    };
    match cell {
        Cell::Empty => {}
        Cell::Number(n) => {
            xml.push_str(&format!(r#"<c r="{reference}"{style_attr}><v>{n}</v></c>"#));
        }
        Cell::Text(text) => {
            let text = clean_cell_text(text);
            xml.push_str(&format!(
                r#"<c r="{reference}" t="inlineStr"{style_attr}><is><t xml:space="preserve">{}</t></is></c>"#,
                escape(text.as_str())
            ));
        }
    }
}

fn worksheet(sheet: &Sheet) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetViews><sheetView workbookViewId="0"><pane ySplit="1" topLeftCell="A2" activePane="bottomLeft" state="frozen"/></sheetView></sheetViews><sheetData>"#,
    );
    let columns: Vec<String> = (0..sheet.header.len()).map(column_name).collect();

    xml.push_str(r#"<row r="1">"#);
    for (col, title) in columns.iter().zip(&sheet.header) {
        push_cell(&mut xml, &format!("{col}1"), &Cell::from(title.as_str()), HEADER_STYLE);
    }
    xml.push_str("</row>");

    for (i, row) in sheet.rows.iter().enumerate() {
        let r = i + 2;
        xml.push_str(&format!(r#"<row r="{r}">"#));
        for (col, cell) in columns.iter().zip(row) {
            let style = match cell {
                Cell::Text(t) if t.contains('\n') => WRAP_STYLE,
                _ => 0,
            };
            push_cell(&mut xml, &format!("{col}{r}"), cell, style);
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}
