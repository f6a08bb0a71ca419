use pdfplumber::{Pdf, Strategy, TableSettings};
use tracing::debug;

use crate::error::ConsolidateError;
use crate::model::{DetectionStrategy, RawTable, StrategyMode};
use crate::options::{ConsolidateOptions, DetectionSettings};
use crate::warning::{ConsolidationWarning, WarningCode};

type Grid = Vec<Vec<Option<String>>>;

/// A group of fewer cells is a boxed label, not a table.
const MIN_TABLE_CELLS: usize = 2;

fn table_settings(strategy: Strategy, detection: &DetectionSettings) -> TableSettings {
    TableSettings {
        strategy,
        snap_tolerance: detection.snap_tolerance,
        snap_x_tolerance: detection.snap_tolerance,
        snap_y_tolerance: detection.snap_tolerance,
        join_tolerance: detection.join_tolerance,
        join_x_tolerance: detection.join_tolerance,
        join_y_tolerance: detection.join_tolerance,
        edge_min_length: detection.edge_min_length,
        min_words_vertical: detection.min_words_vertical,
        text_tolerance: detection.text_tolerance,
        text_x_tolerance: detection.text_tolerance,
        text_y_tolerance: detection.text_tolerance,
        intersection_tolerance: detection.intersection_tolerance,
        intersection_x_tolerance: detection.intersection_tolerance,
        intersection_y_tolerance: detection.intersection_tolerance,
        ..TableSettings::default()
    }
}

/// Pads ragged rows to the widest row; missing slots become absent cells.
fn pad_grid(mut rows: Grid) -> Grid {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, None);
    }
    rows
}

/// Drops gutter columns: the stream strategy puts a cell between the right
/// edge of one text column and the left edge of the next.
fn drop_blank_columns(rows: Grid) -> Grid {
    let width = rows.first().map_or(0, Vec::len);
    let keep = (0..width)
        .map(|column| {
            rows.iter().any(|row| {
                row.get(column)
                    .and_then(Option::as_deref)
                    .is_some_and(|text| !text.trim().is_empty())
            })
        })
        .collect::<Vec<_>>();

    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&keep)
                .filter_map(|(cell, keep)| keep.then_some(cell))
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect()
}

fn number_tables(per_page: Vec<(u32, Vec<Grid>)>, strategy: DetectionStrategy) -> Vec<RawTable> {
    let mut ordinal = 0;
    let mut out = Vec::new();
    for (page, tables) in per_page {
        for (index, rows) in tables.into_iter().enumerate() {
            ordinal += 1;
            out.push(RawTable {
                page,
                index: index + 1,
                ordinal,
                strategy,
                rows,
            });
        }
    }
    out
}

/// Tables of one page, top to bottom then left to right.
fn scan_page(
    pdf: &Pdf,
    page_no: u32,
    settings: &TableSettings,
    warnings: &mut Vec<ConsolidationWarning>,
) -> Vec<Grid> {
    let Some(index) = usize::try_from(page_no).ok().and_then(|n| n.checked_sub(1)) else {
        return Vec::new();
    };
    let page = match pdf.page(index) {
        Ok(page) => page,
        Err(error) => {
            let already_reported = warnings.iter().any(|warning| {
                warning.code == WarningCode::PageScanFailure && warning.page == Some(page_no)
            });
            if !already_reported {
                warnings.push(
                    ConsolidationWarning::new(
                        WarningCode::PageScanFailure,
                        format!("page could not be scanned for tables: {error}"),
                    )
                    .with_page(page_no),
                );
            }
            return Vec::new();
        }
    };

    page.find_tables(settings)
        .into_iter()
        .filter(|table| table.cells.len() >= MIN_TABLE_CELLS)
        .map(|table| {
            table
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(|cell| cell.text).collect::<Vec<_>>())
                .collect::<Grid>()
        })
        .map(pad_grid)
        .collect()
}

fn detect_with(
    pdf: &Pdf,
    page_numbers: &[u32],
    strategy: DetectionStrategy,
    options: &ConsolidateOptions,
    warnings: &mut Vec<ConsolidationWarning>,
) -> Vec<RawTable> {
    let settings = match strategy {
        DetectionStrategy::Lattice => table_settings(Strategy::Lattice, &options.detection),
        DetectionStrategy::Stream => table_settings(Strategy::Stream, &options.detection),
    };

    let per_page = page_numbers
        .iter()
        .map(|&page_no| {
            let mut tables = scan_page(pdf, page_no, &settings, warnings);
            if strategy == DetectionStrategy::Stream {
                tables = tables
                    .into_iter()
                    .map(drop_blank_columns)
                    .filter(|rows| !rows.is_empty())
                    .collect();
            }
            debug!(
                page = page_no,
                strategy = strategy.as_str(),
                tables = tables.len(),
                "page scanned"
            );
            (page_no, tables)
        })
        .collect();
    number_tables(per_page, strategy)
}

/// Runs the configured strategies over the selected pages.
///
/// In `Auto` mode the stream strategy only runs when lattice found no table
/// anywhere in the document, and its tables replace (never extend) the
/// lattice result.
pub(crate) fn detect_tables(
    input_pdf: &[u8],
    page_numbers: &[u32],
    options: &ConsolidateOptions,
    warnings: &mut Vec<ConsolidationWarning>,
) -> Result<(Vec<RawTable>, Option<DetectionStrategy>), ConsolidateError> {
    let pdf =
        Pdf::open(input_pdf, None).map_err(|error| ConsolidateError::TableScan(error.to_string()))?;

    let (tables, strategy) = match options.strategy {
        StrategyMode::Lattice => (
            detect_with(&pdf, page_numbers, DetectionStrategy::Lattice, options, warnings),
            DetectionStrategy::Lattice,
        ),
        StrategyMode::Stream => (
            detect_with(&pdf, page_numbers, DetectionStrategy::Stream, options, warnings),
            DetectionStrategy::Stream,
        ),
        StrategyMode::Auto => {
            let lattice_tables =
                detect_with(&pdf, page_numbers, DetectionStrategy::Lattice, options, warnings);
            if lattice_tables.is_empty() {
                let stream_tables =
                    detect_with(&pdf, page_numbers, DetectionStrategy::Stream, options, warnings);
                if !stream_tables.is_empty() {
                    warnings.push(ConsolidationWarning::new(
                        WarningCode::StreamFallback,
                        "no ruled tables found; using text-aligned tables",
                    ));
                }
                (stream_tables, DetectionStrategy::Stream)
            } else {
                (lattice_tables, DetectionStrategy::Lattice)
            }
        }
    };

    if tables.is_empty() {
        warnings.push(ConsolidationWarning::new(
            WarningCode::NoTablesDetected,
            "no tables were detected in the selected pages",
        ));
        return Ok((tables, None));
    }

    Ok((tables, Some(strategy)))
}

#[cfg(test)]
mod tests {
    use pdfplumber::{Strategy, TableSettings};

    use super::{drop_blank_columns, number_tables, pad_grid, table_settings};
    use crate::model::DetectionStrategy;
    use crate::options::DetectionSettings;

    fn cell(text: &str) -> Option<String> {
        Some(text.to_string())
    }

    #[test]
    fn pads_ragged_rows_with_absent_cells() {
        let padded = pad_grid(vec![vec![cell("a")], vec![cell("b"), cell("c")]]);
        assert_eq!(padded[0], vec![cell("a"), None]);
        assert_eq!(padded[1], vec![cell("b"), cell("c")]);
    }

    #[test]
    fn drops_gutter_columns_but_keeps_partly_filled_ones() {
        let rows = drop_blank_columns(vec![
            vec![cell("Nome"), None, cell("Qtd"), Some("  ".to_string()), cell("Obs")],
            vec![cell("Ana"), None, cell("3"), None, None],
        ]);
        assert_eq!(
            rows,
            vec![
                vec![cell("Nome"), cell("Qtd"), cell("Obs")],
                vec![cell("Ana"), cell("3"), None],
            ]
        );
    }

    #[test]
    fn all_blank_stream_grid_collapses() {
        let rows = drop_blank_columns(vec![vec![None, None], vec![None, None]]);
        assert!(rows.is_empty());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn settings_carry_every_tolerance() {
        let detection = DetectionSettings {
            snap_tolerance: 1.5,
            join_tolerance: 2.0,
            intersection_tolerance: 2.5,
            edge_min_length: 4.0,
            text_tolerance: 1.0,
            min_words_vertical: 4,
        };
        let settings = table_settings(Strategy::Stream, &detection);

        assert_eq!(settings.strategy, Strategy::Stream);
        assert_eq!(settings.snap_x_tolerance, 1.5);
        assert_eq!(settings.snap_y_tolerance, 1.5);
        assert_eq!(settings.join_y_tolerance, 2.0);
        assert_eq!(settings.intersection_x_tolerance, 2.5);
        assert_eq!(settings.edge_min_length, 4.0);
        assert_eq!(settings.text_y_tolerance, 1.0);
        assert_eq!(settings.min_words_vertical, 4);
        assert_eq!(
            settings.min_words_horizontal,
            TableSettings::default().min_words_horizontal
        );
    }

    #[test]
    fn numbers_tables_per_page_and_globally() {
        let grid = vec![vec![cell("a"), cell("b")]];
        let numbered = number_tables(
            vec![
                (1, vec![grid.clone(), grid.clone()]),
                (2, Vec::new()),
                (3, vec![grid]),
            ],
            DetectionStrategy::Stream,
        );

        let positions = numbered
            .iter()
            .map(|table| (table.page, table.index, table.ordinal))
            .collect::<Vec<_>>();
        assert_eq!(positions, vec![(1, 1, 1), (1, 2, 2), (3, 1, 3)]);
    }
}
