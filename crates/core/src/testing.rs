//! Fixture writers: minimal XLSX workbooks and in-memory ZIP bundles.

use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builds a ZIP archive in memory.
pub struct ArchiveBuilder {
    zip: ZipWriter<Cursor<Vec<u8>>>,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    fn options() -> FileOptions {
        FileOptions::default().compression_method(CompressionMethod::Stored)
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.zip
            .add_directory(name, Self::options())
            .expect("add directory");
        self
    }

    pub fn file(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.zip.start_file(name, Self::options()).expect("start file");
        self.zip.write_all(&bytes).expect("write file");
        self
    }

    /// Like [`ArchiveBuilder::file`] but deflate-compressed.
    pub fn deflated_file(mut self, name: &str, bytes: Vec<u8>) -> Self {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(name, options).expect("start file");
        self.zip.write_all(&bytes).expect("write file");
        self
    }

    /// Adds a single-sheet workbook; the first row is the header row.
    pub fn xlsx(self, name: &str, rows: &[&[&str]]) -> Self {
        self.file(name, xlsx_bytes(rows))
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.zip.finish().expect("finish archive").into_inner()
    }
}

pub fn write_xlsx(path: &Path, rows: &[&[&str]]) {
    std::fs::write(path, xlsx_bytes(rows)).expect("write xlsx");
}

/// Cells that parse as numbers are stored as numbers, everything else as
/// inline strings. Empty strings leave the cell out.
pub fn xlsx_bytes(rows: &[&[&str]]) -> Vec<u8> {
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let reference = format!("{}{}", column_letters(c), r + 1);
            if value.parse::<f64>().is_ok() {
                sheet.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#));
            } else {
                sheet.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    escape(value)
                ));
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    ArchiveBuilder::new()
        .file("[Content_Types].xml", CONTENT_TYPES.as_bytes().to_vec())
        .file("_rels/.rels", ROOT_RELS.as_bytes().to_vec())
        .file("xl/workbook.xml", WORKBOOK.as_bytes().to_vec())
        .file("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes().to_vec())
        .file("xl/worksheets/sheet1.xml", sheet.into_bytes())
        .finish()
}

fn column_letters(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;
