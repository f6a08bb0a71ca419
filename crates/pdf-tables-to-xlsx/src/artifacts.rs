//! Per-table intermediate workbooks kept inside a run directory.
//!
//! Each cleaned table is written as `{stem}_tabela_{n}.xlsx` and read back
//! with `calamine` in natural file-name order before consolidation. Files
//! that fail to load are skipped with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, Xlsx, open_workbook};
use tracing::{debug, warn};

use crate::error::{ConsolidateError, TableReadError};
use crate::model::{CleanTable, Sheet, Workbook};
use crate::warning::{ConsolidationWarning, WarningCode};
use crate::xlsx_out::write_workbook;

const ARTIFACT_MARKER: &str = "_tabela_";
const ARTIFACT_EXTENSION: &str = ".xlsx";

pub(crate) fn artifact_file_name(stem: &str, ordinal: usize) -> String {
    format!("{stem}{ARTIFACT_MARKER}{ordinal}{ARTIFACT_EXTENSION}")
}

/// `(stem, ordinal)` of an artifact file name, `None` for other files.
fn parse_artifact_name(file_name: &str) -> Option<(String, usize)> {
    let base = file_name.strip_suffix(ARTIFACT_EXTENSION)?;
    let (stem, ordinal) = base.rsplit_once(ARTIFACT_MARKER)?;
    Some((stem.to_string(), ordinal.parse().ok()?))
}

/// Writes one single-sheet workbook per table and returns the paths.
///
/// The column-index header row is always present so that trailing empty
/// columns survive the round trip.
pub(crate) fn materialize_tables(
    dir: &Path,
    stem: &str,
    tables: &[CleanTable],
) -> Result<Vec<PathBuf>, ConsolidateError> {
    let mut paths = Vec::with_capacity(tables.len());
    for table in tables {
        let path = dir.join(artifact_file_name(stem, table.ordinal));
        let workbook = Workbook {
            sheets: vec![Sheet {
                name: "Sheet1".to_string(),
                columns: table.columns,
                rows: table.rows.clone(),
            }],
        };
        write_workbook(&path, &workbook, true)?;
        debug!(path = %path.display(), "wrote table artifact");
        paths.push(path);
    }
    Ok(paths)
}

/// Artifact files of `stem` in `dir`, sorted by numeric ordinal so that
/// `_tabela_10` follows `_tabela_9`.
pub(crate) fn list_artifacts(
    dir: &Path,
    stem: &str,
) -> Result<Vec<(usize, PathBuf)>, ConsolidateError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ConsolidateError::read(dir, source))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConsolidateError::read(dir, source))?;
        let file_name = entry.file_name();
        if let Some((found_stem, ordinal)) = file_name.to_str().and_then(parse_artifact_name)
            && found_stem == stem
        {
            found.push((ordinal, entry.path()));
        }
    }

    found.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(found)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Rows and width of an artifact, without its header row.
pub(crate) fn read_table_artifact(path: &Path) -> Result<(usize, Vec<Vec<String>>), TableReadError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet_name = workbook
        .sheet_names()
        .into_iter()
        .next()
        .ok_or(TableReadError::MissingSheet)?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let columns = range.width();
    let rows = range
        .rows()
        .skip(1)
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    Ok((columns, rows))
}

/// Reads the artifacts of `stem` in `dir` back into tables.
///
/// `positions` maps a table ordinal to its `(page, index)`; unknown ordinals
/// get page 0.
pub(crate) fn load_tables(
    dir: &Path,
    stem: &str,
    positions: &HashMap<usize, (u32, usize)>,
    warnings: &mut Vec<ConsolidationWarning>,
) -> Result<Vec<CleanTable>, ConsolidateError> {
    let mut tables = Vec::new();
    for (ordinal, path) in list_artifacts(dir, stem)? {
        let (page, index) = positions.get(&ordinal).copied().unwrap_or((0, ordinal));
        match read_table_artifact(&path) {
            Ok((columns, rows)) => tables.push(CleanTable {
                page,
                index,
                ordinal,
                columns,
                rows,
            }),
            Err(error) => {
                warn!(path = %path.display(), "skipping unreadable table artifact: {error}");
                let mut warning = ConsolidationWarning::new(
                    WarningCode::TableReadFailure,
                    format!("{}: {error}", path.display()),
                )
                .with_table(ordinal);
                if page > 0 {
                    warning = warning.with_page(page);
                }
                warnings.push(warning);
            }
        }
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{artifact_file_name, list_artifacts, load_tables, materialize_tables, parse_artifact_name};
    use crate::model::CleanTable;
    use crate::warning::WarningCode;

    fn table(ordinal: usize, rows: &[&[&str]]) -> CleanTable {
        CleanTable {
            page: 1,
            index: ordinal,
            ordinal,
            columns: rows.first().map_or(0, |row| row.len()),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| (*cell).to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn parses_artifact_names() {
        assert_eq!(artifact_file_name("report", 3), "report_tabela_3.xlsx");
        assert_eq!(
            parse_artifact_name("my_tabela_file_tabela_12.xlsx"),
            Some(("my_tabela_file".to_string(), 12))
        );
        assert_eq!(parse_artifact_name("report.pdf"), None);
        assert_eq!(parse_artifact_name("report_tabela_x.xlsx"), None);
    }

    #[test]
    fn lists_artifacts_in_numeric_order() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        for ordinal in [10, 2, 1] {
            std::fs::write(dir.path().join(artifact_file_name("doc", ordinal)), b"")
                .expect("artifact should be written");
        }
        std::fs::write(dir.path().join(artifact_file_name("other", 5)), b"")
            .expect("artifact should be written");
        std::fs::write(dir.path().join("notes.txt"), b"").expect("file should be written");

        let ordinals = list_artifacts(dir.path(), "doc")
            .expect("listing should succeed")
            .into_iter()
            .map(|(ordinal, _)| ordinal)
            .collect::<Vec<_>>();
        assert_eq!(ordinals, vec![1, 2, 10]);
    }

    #[test]
    fn round_trip_keeps_width_and_skips_broken_files() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let tables = vec![
            table(1, &[&["a", "", ""], &["b", "c", ""]]),
            table(2, &[&["x", "y"]]),
        ];
        materialize_tables(dir.path(), "doc", &tables).expect("artifacts should be written");
        std::fs::write(dir.path().join(artifact_file_name("doc", 3)), b"not a workbook")
            .expect("broken artifact should be written");

        let positions = HashMap::from([(1, (1, 1)), (2, (1, 2)), (3, (2, 1))]);
        let mut warnings = Vec::new();
        let loaded =
            load_tables(dir.path(), "doc", &positions, &mut warnings).expect("loading should succeed");

        assert_eq!(loaded, tables);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::TableReadFailure);
        assert_eq!(warnings[0].table, Some(3));
        assert_eq!(warnings[0].page, Some(2));
    }
}
