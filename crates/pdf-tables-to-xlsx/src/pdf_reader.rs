use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use encoding_rs::{BIG5, UTF_16BE};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::error::ConsolidateError;
use crate::model::PageText;
use crate::table_parse::{soft_split_line_into_cells, split_line_into_cells};
use crate::warning::{ConsolidationWarning, WarningCode};

/// Page numbering of a parsed document together with the best text of every
/// page.
pub(crate) struct LoadedPdf {
    pub page_ids: Vec<(u32, ObjectId)>,
    pub pages: Vec<PageText>,
}

impl LoadedPdf {
    /// Non-empty page texts joined with newlines, in page order.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .filter(|page| !page.text.trim().is_empty())
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn split_text_into_pages(raw_text: &str) -> Vec<String> {
    let mut pages = raw_text
        .split('\u{000C}')
        .map(str::to_string)
        .collect::<Vec<_>>();
    if pages.last().is_some_and(String::is_empty) {
        pages.pop();
    }
    pages
}

fn looks_decoding_broken(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    if text.contains("?Identity-H Unimplemented?") {
        return true;
    }

    let total = text.chars().count();
    let replacement = text.matches('\u{FFFD}').count();
    let control = text
        .chars()
        .filter(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
        .count();

    replacement * 8 > total || control * 5 > total
}

pub(crate) fn decode_pdf_bytes(encoding: Option<&str>, bytes: &[u8]) -> String {
    let decoded = Document::decode_text(encoding, bytes);
    if !looks_decoding_broken(&decoded) {
        return decoded;
    }

    if bytes.starts_with(&[0xFE, 0xFF]) || bytes.starts_with(&[0xFF, 0xFE]) {
        let bytes = if bytes.len() > 2 { &bytes[2..] } else { bytes };
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    if let Some(name) = encoding {
        let lower = name.to_ascii_lowercase();

        if lower.contains("utf16")
            || lower.contains("ucs2")
            || lower.contains("identity-h")
            || lower.contains("unicode")
        {
            let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
            if !had_errors && !utf16.is_empty() {
                return utf16.into_owned();
            }
        }

        if lower.contains("big5") || lower.contains("b5") || lower.contains("eten") {
            let (big5, _, had_errors) = BIG5.decode(bytes);
            if !had_errors && !big5.is_empty() {
                return big5.into_owned();
            }
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

/// Higher is better: favours text with many multi-cell lines.
fn extraction_quality_score(text: &str) -> i64 {
    if text.trim().is_empty() {
        return i64::MIN / 4;
    }

    let mut non_empty_lines = 0_i64;
    let mut multi_cell_lines = 0_i64;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        non_empty_lines += 1;
        if split_line_into_cells(line).len() >= 2 || soft_split_line_into_cells(line).len() >= 3 {
            multi_cell_lines += 1;
        }
    }

    let broken_penalty = if looks_decoding_broken(text) { 800 } else { 0 };
    multi_cell_lines * 50 + non_empty_lines - broken_penalty
}

fn choose_best_text(candidates: &[String]) -> String {
    candidates
        .iter()
        .max_by_key(|text| extraction_quality_score(text))
        .cloned()
        .unwrap_or_default()
}

fn extract_text_from_page_content(document: &Document, page_id: ObjectId) -> Option<String> {
    fn collect_text(text: &mut String, encoding: Option<&str>, operands: &[Object]) {
        for operand in operands {
            match operand {
                Object::String(bytes, _) => {
                    text.push_str(&decode_pdf_bytes(encoding, bytes));
                }
                Object::Array(items) => {
                    collect_text(text, encoding, items);
                    text.push(' ');
                }
                Object::Integer(value) => {
                    if *value < -100 {
                        text.push(' ');
                    }
                }
                _ => {}
            }
        }
    }

    let raw_content = document.get_page_content(page_id).ok()?;
    let content = Content::decode(&raw_content).ok()?;
    let encodings = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect::<BTreeMap<Vec<u8>, &str>>();

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_encoding = None;
    for operation in content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                if let Some(font_name) = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                {
                    current_encoding = encodings.get(font_name).copied();
                }
            }
            "Tj" | "TJ" | "'" | "\"" => {
                collect_text(&mut current, current_encoding, &operation.operands);
            }
            "T*" | "Td" | "TD" | "ET" => {
                if !current.trim().is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
            }
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        lines.push(current);
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// `pdf-extract` panics on some malformed fonts; a panic counts as "no text".
///
/// Recovery needs an unwinding panic strategy. The wasm32 worker build aborts
/// on panic, so there a panicking font still fails the whole request.
fn pdf_extract_text(input_pdf: &[u8]) -> Option<String> {
    match catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(input_pdf)
    })) {
        Ok(Ok(text)) => Some(text),
        Ok(Err(error)) => {
            debug!("pdf-extract failed: {error}");
            None
        }
        Err(_) => {
            warn!("pdf-extract panicked; falling back to content stream text");
            None
        }
    }
}

fn collect_page_texts(
    document: &Document,
    page_ids: &[(u32, ObjectId)],
    extracted: Option<String>,
) -> Vec<PageText> {
    let (pdf_extract_pages, pdf_extract_whole) = match extracted {
        Some(text) => {
            let pages = split_text_into_pages(&text);
            if pages.len() == page_ids.len() {
                (Some(pages), None)
            } else {
                (None, Some(text))
            }
        }
        None => (None, None),
    };

    let mut pages = Vec::with_capacity(page_ids.len());
    for (index, (page_no, page_id)) in page_ids.iter().enumerate() {
        let mut candidates = Vec::new();
        if let Some(text) = pdf_extract_pages
            .as_ref()
            .and_then(|fallback| fallback.get(index).cloned())
            .filter(|text| !text.trim().is_empty())
        {
            candidates.push(text);
        }
        if let Some(text) = extract_text_from_page_content(document, *page_id) {
            candidates.push(text);
        }
        if let Some(text) = document
            .extract_text(&[*page_no])
            .ok()
            .filter(|text| !text.trim().is_empty())
        {
            candidates.push(text);
        }

        // Whole-document text only stands in for a single-page document.
        if candidates.is_empty()
            && page_ids.len() == 1
            && let Some(text) = pdf_extract_whole
                .as_ref()
                .filter(|text| !text.trim().is_empty())
                .cloned()
        {
            candidates.push(text);
        }

        pages.push(PageText {
            page_number: *page_no,
            text: choose_best_text(&candidates),
        });
    }

    pages
}

pub(crate) fn load_pdf_from_bytes(
    input_pdf: &[u8],
    warnings: &mut Vec<ConsolidationWarning>,
) -> Result<LoadedPdf, ConsolidateError> {
    let document = Document::load_mem(input_pdf)?;
    let page_ids = document
        .get_pages()
        .into_iter()
        .collect::<Vec<(u32, ObjectId)>>();

    let pages = collect_page_texts(&document, &page_ids, pdf_extract_text(input_pdf));
    for page in pages.iter().filter(|page| page.text.trim().is_empty()) {
        warnings.push(
            ConsolidationWarning::new(
                WarningCode::TextExtractionFailure,
                "page yielded no extractable text",
            )
            .with_page(page.page_number),
        );
    }

    Ok(LoadedPdf {
        page_ids,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::{choose_best_text, decode_pdf_bytes, split_text_into_pages};

    #[test]
    fn splits_form_feed_delimited_pages() {
        let pages = split_text_into_pages("p1\u{000C}p2\u{000C}");
        assert_eq!(pages, vec!["p1", "p2"]);
    }

    #[test]
    fn decodes_big5_when_encoding_hint_is_present() {
        let (bytes, _, had_errors) = encoding_rs::BIG5.encode("測試");
        assert!(!had_errors);
        let decoded = decode_pdf_bytes(Some("ETen-B5-H"), &bytes);
        assert_eq!(decoded, "測試");
    }

    #[test]
    fn decodes_win_ansi_accents() {
        let decoded = decode_pdf_bytes(Some("WinAnsiEncoding"), b"Amig\xE1vel");
        assert_eq!(decoded, "Amigável");
    }

    #[test]
    fn prefers_tabular_candidate() {
        let candidates = vec![
            "NameAgeScore".to_string(),
            "Name  Age  Score\nAlice  30  98".to_string(),
        ];
        assert_eq!(choose_best_text(&candidates), candidates[1]);
    }
}
