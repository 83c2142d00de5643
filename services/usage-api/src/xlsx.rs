//! Minimal XLSX (SpreadsheetML) writer.
//!
//! Produces a single-sheet workbook with inline strings and no styles, which
//! is all the export needs. The package is a zip archive holding five XML
//! parts.

use std::fmt::Write as _;
use std::io::{Cursor, Write};

use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use bikeshare_common::{BikeResult, BikeshareError, UsageRecord};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Rows a single worksheet can hold.
pub const MAX_SHEET_ROWS: u64 = 1_048_576;

/// Data rows that fit below the header row.
pub const MAX_DATA_ROWS: u64 = MAX_SHEET_ROWS - 1;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Empty,
}

impl From<Option<String>> for Cell {
    fn from(value: Option<String>) -> Self {
        value.map(Cell::Text).unwrap_or(Cell::Empty)
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map(Cell::Number).unwrap_or(Cell::Empty)
    }
}

/// A workbook with a single named sheet.
#[derive(Debug, Clone)]
pub struct Workbook {
    sheet_name: String,
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Workbook {
    pub fn new(sheet_name: impl Into<String>, header: &[&str]) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// Serialize the workbook into an XLSX package.
    pub fn to_bytes(&self) -> BikeResult<Vec<u8>> {
        if self.rows.len() as u64 > MAX_DATA_ROWS {
            return Err(BikeshareError::ExportTooLarge {
                rows: self.rows.len() as u64,
                limit: MAX_DATA_ROWS,
            });
        }

        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
            ("_rels/.rels", ROOT_RELS_XML.to_string()),
            ("xl/workbook.xml", self.workbook_xml()),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.to_string()),
            ("xl/worksheets/sheet1.xml", self.sheet_xml()),
        ];

        for (name, content) in parts {
            writer.start_file(name, options).map_err(zip_failed)?;
            writer
                .write_all(content.as_bytes())
                .map_err(|e| BikeshareError::Export(format!("Failed to write {}: {}", name, e)))?;
        }

        let cursor = writer.finish().map_err(zip_failed)?;
        Ok(cursor.into_inner())
    }

    fn workbook_xml(&self) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                "\n",
                r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
                r#"<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
            ),
            escape(&sanitize(&self.sheet_name))
        )
    }

    fn sheet_xml(&self) -> String {
        let mut xml = String::with_capacity(128 + self.rows.len() * 256);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );

        let header: Vec<Cell> = self.header.iter().cloned().map(Cell::Text).collect();
        write_row(&mut xml, 1, &header);
        for (i, row) in self.rows.iter().enumerate() {
            write_row(&mut xml, i + 2, row);
        }

        xml.push_str("</sheetData></worksheet>");
        xml
    }
}

/// Workbook of raw usage records, one row per observation.
pub fn records_workbook(records: &[UsageRecord]) -> Workbook {
    let mut workbook = Workbook::new(
        "data",
        &[
            "station_id",
            "name",
            "latitude",
            "longitude",
            "observed_at",
            "docked",
            "free_docks",
            "overflow",
            "active",
        ],
    );

    for r in records {
        workbook.push_row(vec![
            Cell::Text(r.station_id.to_string()),
            Cell::from(r.name.clone()),
            Cell::from(r.latitude),
            Cell::from(r.longitude),
            Cell::Text(r.observed_at.format(TIMESTAMP_FORMAT).to_string()),
            Cell::Integer(r.docked),
            Cell::Integer(r.free_docks),
            Cell::Integer(r.overflow),
            Cell::Bool(r.active),
        ]);
    }

    workbook
}

fn write_row(xml: &mut String, row_number: usize, cells: &[Cell]) {
    // Writing into a String cannot fail.
    let _ = write!(xml, r#"<row r="{}">"#, row_number);
    for (col, cell) in cells.iter().enumerate() {
        let reference = format!("{}{}", column_name(col), row_number);
        let _ = match cell {
            Cell::Text(s) => write!(
                xml,
                r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                reference,
                escape(&sanitize(s))
            ),
            Cell::Integer(v) => write!(xml, r#"<c r="{}"><v>{}</v></c>"#, reference, v),
            Cell::Number(v) if v.is_finite() => {
                write!(xml, r#"<c r="{}"><v>{}</v></c>"#, reference, v)
            }
            Cell::Bool(v) => write!(xml, r#"<c r="{}" t="b"><v>{}</v></c>"#, reference, *v as u8),
            Cell::Number(_) | Cell::Empty => Ok(()),
        };
    }
    xml.push_str("</row>");
}

/// Spreadsheet column name for a zero-based index (0 -> A, 26 -> AA).
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

/// Drop characters XML 1.0 cannot carry.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

fn zip_failed(e: zip::result::ZipError) -> BikeshareError {
    BikeshareError::Export(format!("Failed to write workbook: {}", e))
}
