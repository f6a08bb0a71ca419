use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use std::path::Path;

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::ConsolidateError;
use crate::model::{Sheet, Workbook};
use crate::normalize::is_unwritable;

/// Name of the single sheet written for a workbook without tables.
pub const PLACEHOLDER_SHEET_NAME: &str = "Vazio";

const CONTENT_TYPES_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

// Style 1 is the bold column-index header.
const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

const XML_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// `0 -> A`, `25 -> Z`, `26 -> AA`.
pub(crate) fn column_letters(index: usize) -> String {
    let mut letters = Vec::new();
    let mut remaining = index + 1;
    while remaining > 0 {
        let digit = (remaining - 1) % 26;
        letters.push(b'A' + u8::try_from(digit).unwrap_or(0));
        remaining = (remaining - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Escapes markup characters and drops the control characters XML 1.0
/// cannot carry.
pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            ch if is_unwritable(ch) => {}
            ch => out.push(ch),
        }
    }
    out
}

#[derive(Default)]
struct SharedStrings {
    index: HashMap<String, usize>,
    values: Vec<String>,
    references: usize,
}

impl SharedStrings {
    fn intern(&mut self, value: &str) -> usize {
        self.references += 1;
        if let Some(position) = self.index.get(value) {
            return *position;
        }
        let position = self.values.len();
        self.index.insert(value.to_string(), position);
        self.values.push(value.to_string());
        position
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"{XML_HEAD}
<sst xmlns="{MAIN_NS}" count="{}" uniqueCount="{}">"#,
            self.references,
            self.values.len()
        );
        for value in &self.values {
            let preserve = if value.trim() == value {
                ""
            } else {
                r#" xml:space="preserve""#
            };
            let _ = write!(xml, "<si><t{preserve}>{}</t></si>", escape_xml(value));
        }
        xml.push_str("</sst>");
        xml
    }
}

fn sheet_xml(sheet: &Sheet, column_header_row: bool, strings: &mut SharedStrings) -> String {
    let header_rows = usize::from(column_header_row);
    let total_rows = sheet.rows.len() + header_rows;
    let dimension = if sheet.columns == 0 || total_rows == 0 {
        "A1".to_string()
    } else {
        format!("A1:{}{}", column_letters(sheet.columns - 1), total_rows)
    };

    let mut xml = format!(
        r#"{XML_HEAD}
<worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><dimension ref="{dimension}"/><sheetData>"#
    );

    if column_header_row && sheet.columns > 0 {
        xml.push_str(r#"<row r="1">"#);
        for column in 0..sheet.columns {
            let _ = write!(
                xml,
                r#"<c r="{}1" s="1"><v>{column}</v></c>"#,
                column_letters(column)
            );
        }
        xml.push_str("</row>");
    }

    for (offset, row) in sheet.rows.iter().enumerate() {
        let row_number = offset + header_rows + 1;
        let _ = write!(xml, r#"<row r="{row_number}">"#);
        for (column, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let _ = write!(
                xml,
                r#"<c r="{}{row_number}" t="s"><v>{}</v></c>"#,
                column_letters(column),
                strings.intern(value)
            );
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn workbook_xml(names: &[&str]) -> String {
    let mut xml = format!(
        r#"{XML_HEAD}
<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#
    );
    for (index, name) in names.iter().enumerate() {
        let id = index + 1;
        let _ = write!(
            xml,
            r#"<sheet name="{}" sheetId="{id}" r:id="rId{id}"/>"#,
            escape_xml(name)
        );
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels_xml(sheet_count: usize) -> String {
    let mut xml = format!(
        r#"{XML_HEAD}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#
    );
    for id in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{id}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{id}.xml"/>"#
        );
    }
    let _ = write!(
        xml,
        r#"<Relationship Id="rId{}" Type="{REL_NS}/styles" Target="styles.xml"/><Relationship Id="rId{}" Type="{REL_NS}/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#,
        sheet_count + 1,
        sheet_count + 2
    );
    xml
}

fn content_types_xml(sheet_count: usize) -> String {
    let mut xml = CONTENT_TYPES_HEAD.to_string();
    for id in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Override PartName="/xl/worksheets/sheet{id}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        );
    }
    xml.push_str("</Types>");
    xml
}

/// Serializes a workbook into `.xlsx` bytes.
///
/// A workbook without sheets is written with one empty `Vazio` sheet.
pub fn workbook_to_xlsx_bytes(
    workbook: &Workbook,
    column_header_row: bool,
) -> Result<Vec<u8>, ConsolidateError> {
    let placeholder = Sheet {
        name: PLACEHOLDER_SHEET_NAME.to_string(),
        columns: 0,
        rows: Vec::new(),
    };
    let sheets = if workbook.sheets.is_empty() {
        vec![&placeholder]
    } else {
        workbook.sheets.iter().collect()
    };

    let mut strings = SharedStrings::default();
    let sheet_parts = sheets
        .iter()
        .map(|sheet| sheet_xml(sheet, column_header_row, &mut strings))
        .collect::<Vec<_>>();
    let names = sheets.iter().map(|sheet| sheet.name.as_str()).collect::<Vec<_>>();

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types_xml(sheets.len()).as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;
    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml(&names).as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(workbook_rels_xml(sheets.len()).as_bytes())?;
    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(STYLES.as_bytes())?;
    zip.start_file("xl/sharedStrings.xml", options)?;
    zip.write_all(strings.to_xml().as_bytes())?;
    for (index, part) in sheet_parts.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", index + 1), options)?;
        zip.write_all(part.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}

pub(crate) fn write_workbook(
    path: &Path,
    workbook: &Workbook,
    column_header_row: bool,
) -> Result<(), ConsolidateError> {
    let bytes = workbook_to_xlsx_bytes(workbook, column_header_row)?;
    std::fs::write(path, bytes).map_err(|source| ConsolidateError::write(path, source))
}
