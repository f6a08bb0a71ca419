mod artifacts;
mod error;
mod identifier;
mod model;
mod normalize;
mod options;
mod package;
mod pdf_reader;
mod table_detect;
mod table_parse;
mod warning;
mod workbook;
mod workdir;
mod xlsx_out;

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use lopdf::ObjectId;
use tracing::info;

use crate::artifacts::{load_tables, materialize_tables};
use crate::pdf_reader::{LoadedPdf, load_pdf_from_bytes};
use crate::table_detect::detect_tables;

pub use error::{ConsolidateError, TableReadError};
pub use identifier::{IDENTIFIER_MARKER, SENTINEL, extract_identifier, identifier_or_sentinel};
pub use model::{
    ArchiveEntry, CleanTable, DetectionStrategy, PageText, RawTable, Sheet, StrategyMode, Workbook,
};
pub use normalize::normalize_table;
pub use options::{
    ConsolidateOptions, DEFAULT_INFO_NAME, DEFAULT_INFO_TEXT, DEFAULT_SHEET_PREFIX,
    DEFAULT_WORKBOOK_NAME, DetectionSettings, PageSelection,
};
pub use package::{Packager, ZipPackager, archive_file_name, vacant_path};
pub use warning::{ConsolidationWarning, WarningCode};
pub use workbook::{MAX_SHEET_NAME_LEN, consolidate_tables};
pub use workdir::RunDir;
pub use xlsx_out::{PLACEHOLDER_SHEET_NAME, workbook_to_xlsx_bytes};

/// Outcome of table detection over one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedTables {
    pub tables: Vec<RawTable>,
    /// `None` when no strategy found a table.
    pub strategy: Option<DetectionStrategy>,
    pub warnings: Vec<ConsolidationWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationReport {
    pub strategy: Option<DetectionStrategy>,
    pub detected_tables: usize,
    pub sheet_names: Vec<String>,
    pub skipped_tables: usize,
    pub identifier: String,
    pub warnings: Vec<ConsolidationWarning>,
}

impl ConsolidationReport {
    #[must_use]
    pub fn sheet_count(&self) -> usize {
        self.sheet_names.len()
    }
}

/// Everything needed to build one download bundle.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Upload name of the PDF; only its final path component is kept.
    pub pdf_name: String,
    pub pdf_bytes: Vec<u8>,
    pub attachments: Vec<ArchiveEntry>,
    /// Local date stamped into the archive name.
    pub run_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub archive_name: String,
    pub archive_bytes: Vec<u8>,
    pub workbook_bytes: Vec<u8>,
    pub report: ConsolidationReport,
}

fn validate_options(options: &ConsolidateOptions) -> Result<(), ConsolidateError> {
    options.validate().map_err(ConsolidateError::InvalidOption)
}

/// Pages kept by the selection, as `(page number, object id)` pairs.
fn select_pages(
    page_ids: &[(u32, ObjectId)],
    selection: Option<&PageSelection>,
) -> Result<Vec<(u32, ObjectId)>, ConsolidateError> {
    let Some(selection) = selection else {
        return Ok(page_ids.to_vec());
    };

    let selected = page_ids
        .iter()
        .filter(|(page_no, _)| selection.contains(*page_no))
        .copied()
        .collect::<Vec<_>>();
    if selected.is_empty() {
        return Err(ConsolidateError::NoPagesSelected);
    }
    Ok(selected)
}

fn detect_in_loaded(
    input_pdf: &[u8],
    loaded: &LoadedPdf,
    options: &ConsolidateOptions,
    warnings: &mut Vec<ConsolidationWarning>,
) -> Result<(Vec<RawTable>, Option<DetectionStrategy>), ConsolidateError> {
    let page_numbers = select_pages(&loaded.page_ids, options.pages.as_ref())?
        .into_iter()
        .map(|(page_no, _)| page_no)
        .collect::<Vec<_>>();
    detect_tables(input_pdf, &page_numbers, options, warnings)
}

/// Detects tables in a PDF without normalizing or consolidating them.
pub fn extract_tables(
    input_pdf: &[u8],
    options: &ConsolidateOptions,
) -> Result<DetectedTables, ConsolidateError> {
    validate_options(options)?;
    let mut warnings = Vec::new();
    let loaded = load_pdf_from_bytes(input_pdf, &mut warnings)?;
    let (tables, strategy) = detect_in_loaded(input_pdf, &loaded, options, &mut warnings)?;
    Ok(DetectedTables {
        tables,
        strategy,
        warnings,
    })
}

/// Stem used for intermediate file names inside a run directory.
fn artifact_stem(source_stem: &str) -> String {
    let base = package::base_name(source_stem);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base,
    }
}

fn run_pipeline(
    input_pdf: &[u8],
    source_stem: &str,
    run_dir: Option<&RunDir>,
    options: &ConsolidateOptions,
) -> Result<(Workbook, ConsolidationReport), ConsolidateError> {
    validate_options(options)?;

    let mut warnings = Vec::new();
    let loaded = load_pdf_from_bytes(input_pdf, &mut warnings)?;
    let (raw_tables, strategy) = detect_in_loaded(input_pdf, &loaded, options, &mut warnings)?;
    let detected_tables = raw_tables.len();

    let mut clean_tables = raw_tables.iter().map(normalize_table).collect::<Vec<_>>();
    if let Some(run_dir) = run_dir {
        let positions = clean_tables
            .iter()
            .map(|table| (table.ordinal, (table.page, table.index)))
            .collect::<HashMap<_, _>>();
        let stem = artifact_stem(source_stem);
        materialize_tables(run_dir.path(), &stem, &clean_tables)?;
        clean_tables = load_tables(run_dir.path(), &stem, &positions, &mut warnings)?;
    }

    let (workbook, skipped_tables) = consolidate_tables(clean_tables, &options.sheet_prefix);
    let identifier = identifier_or_sentinel(&loaded.full_text(), &mut warnings);

    info!(
        source = source_stem,
        strategy = strategy.map_or("none", DetectionStrategy::as_str),
        detected = detected_tables,
        sheets = workbook.sheets.len(),
        skipped = skipped_tables,
        identifier = %identifier,
        "consolidated tables"
    );

    let report = ConsolidationReport {
        strategy,
        detected_tables,
        sheet_names: workbook.sheet_names(),
        skipped_tables,
        identifier,
        warnings,
    };
    Ok((workbook, report))
}

/// Consolidates the tables of an in-memory PDF into `.xlsx` bytes.
///
/// With a run directory, every table takes a detour through an intermediate
/// workbook inside it; otherwise everything stays in memory.
pub fn consolidate_pdf_bytes(
    input_pdf: &[u8],
    source_stem: &str,
    run_dir: Option<&RunDir>,
    options: &ConsolidateOptions,
) -> Result<(Vec<u8>, ConsolidationReport), ConsolidateError> {
    let (workbook, report) = run_pipeline(input_pdf, source_stem, run_dir, options)?;
    let bytes = workbook_to_xlsx_bytes(&workbook, options.column_header_row)?;
    Ok((bytes, report))
}

pub fn consolidate_pdf_to_xlsx(
    input_pdf: &Path,
    output_xlsx: &Path,
    run_dir: Option<&RunDir>,
    options: &ConsolidateOptions,
) -> Result<ConsolidationReport, ConsolidateError> {
    let bytes =
        std::fs::read(input_pdf).map_err(|source| ConsolidateError::read(input_pdf, source))?;
    let stem = input_pdf
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (workbook, report) = run_pipeline(&bytes, &stem, run_dir, options)?;
    xlsx_out::write_workbook(output_xlsx, &workbook, options.column_header_row)?;
    Ok(report)
}

/// Builds the download archive: the PDF, the workbook, the info file and the
/// attachments, in that order.
pub fn build_bundle(
    request: BundleRequest,
    packager: &dyn Packager,
    run_dir: Option<&RunDir>,
    options: &ConsolidateOptions,
) -> Result<Bundle, ConsolidateError> {
    let (workbook_bytes, report) =
        consolidate_pdf_bytes(&request.pdf_bytes, &request.pdf_name, run_dir, options)?;

    let mut entries = Vec::with_capacity(request.attachments.len() + 3);
    entries.push(ArchiveEntry::new(request.pdf_name, request.pdf_bytes));
    entries.push(ArchiveEntry::new(
        options.workbook_name.clone(),
        workbook_bytes.clone(),
    ));
    entries.push(ArchiveEntry::new(
        options.info_name.clone(),
        options.info_text.clone().into_bytes(),
    ));
    entries.extend(request.attachments);

    let archive_bytes = packager.package(&entries)?;
    let archive_name = archive_file_name(&report.identifier, request.run_date);
    info!(archive = %archive_name, entries = entries.len(), "built bundle");

    Ok(Bundle {
        archive_name,
        archive_bytes,
        workbook_bytes,
        report,
    })
}

#[cfg(test)]
mod tests {
    use lopdf::ObjectId;

    use super::{ConsolidateError, PageSelection, artifact_stem, select_pages};

    fn ids() -> Vec<(u32, ObjectId)> {
        vec![(1, (3, 0)), (2, (7, 0)), (3, (9, 0))]
    }

    #[test]
    fn selection_keeps_matching_pages() {
        let selection = "2-5".parse::<PageSelection>().expect("selection should parse");
        let selected = select_pages(&ids(), Some(&selection)).expect("pages should match");
        assert_eq!(selected, vec![(2, (7, 0)), (3, (9, 0))]);
        assert_eq!(select_pages(&ids(), None).expect("all pages").len(), 3);
    }

    #[test]
    fn selection_without_matches_is_an_error() {
        let selection = "8".parse::<PageSelection>().expect("selection should parse");
        assert!(matches!(
            select_pages(&ids(), Some(&selection)),
            Err(ConsolidateError::NoPagesSelected)
        ));
    }

    #[test]
    fn artifact_stem_drops_directories_and_extension() {
        assert_eq!(artifact_stem("uploads/relatorio.pdf"), "relatorio");
        assert_eq!(artifact_stem("extrato"), "extrato");
        assert_eq!(artifact_stem("extrato.2024.pdf"), "extrato.2024");
        assert_eq!(artifact_stem(".oculto"), ".oculto");
        assert_eq!(artifact_stem(""), "arquivo");
    }
}
