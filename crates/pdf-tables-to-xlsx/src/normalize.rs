use crate::model::{CleanTable, RawTable};

const EMPTY_MARKERS: [&str; 4] = ["", "nan", "NaN", "NULL"];

fn is_empty_marker(cell: Option<&str>) -> bool {
    cell.is_none_or(|text| EMPTY_MARKERS.contains(&text))
}

/// Control characters an xlsx cell cannot hold.
pub(crate) fn is_unwritable(ch: char) -> bool {
    ch.is_control() && !matches!(ch, '\t' | '\n' | '\r')
}

fn clean_text(text: &str) -> String {
    let kept = text
        .chars()
        .filter(|ch| !is_unwritable(*ch))
        .collect::<String>();
    kept.trim().to_string()
}

/// Strips unwritable control characters and trims every cell, drops rows
/// made only of empty markers and turns the remaining markers into `""`.
///
/// The column count survives even when every row is dropped. Running the
/// result through the normalizer again changes nothing.
#[must_use]
pub fn normalize_table(table: &RawTable) -> CleanTable {
    let columns = table.column_count();
    let rows = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| cell.as_deref().map(clean_text))
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.iter().all(|cell| is_empty_marker(cell.as_deref())))
        .map(|row| {
            let mut cells = row
                .into_iter()
                .map(|cell| {
                    if is_empty_marker(cell.as_deref()) {
                        String::new()
                    } else {
                        cell.unwrap_or_default()
                    }
                })
                .collect::<Vec<_>>();
            cells.resize(columns, String::new());
            cells
        })
        .collect();

    CleanTable {
        page: table.page,
        index: table.index,
        ordinal: table.ordinal,
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_table;
    use crate::model::{CleanTable, DetectionStrategy, RawTable};

    fn raw(rows: &[&[Option<&str>]]) -> RawTable {
        RawTable {
            page: 2,
            index: 1,
            ordinal: 3,
            strategy: DetectionStrategy::Lattice,
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.map(str::to_string)).collect())
                .collect(),
        }
    }

    fn reraw(table: &CleanTable) -> RawTable {
        RawTable {
            page: table.page,
            index: table.index,
            ordinal: table.ordinal,
            strategy: DetectionStrategy::Stream,
            rows: table
                .rows
                .iter()
                .map(|row| row.iter().cloned().map(Some).collect())
                .collect(),
        }
    }

    #[test]
    fn trims_cells_and_blanks_markers() {
        let clean = normalize_table(&raw(&[
            &[Some("  Name "), Some("Age")],
            &[Some("Alice"), Some("NaN")],
            &[None, Some(" 7 ")],
        ]));

        assert_eq!(clean.columns, 2);
        assert_eq!(
            clean.rows,
            vec![
                vec!["Name".to_string(), "Age".to_string()],
                vec!["Alice".to_string(), String::new()],
                vec![String::new(), "7".to_string()],
            ]
        );
    }

    #[test]
    fn drops_rows_made_only_of_markers() {
        let clean = normalize_table(&raw(&[
            &[Some("a"), Some("b")],
            &[Some("nan"), Some("  ")],
            &[None, Some("NULL")],
            &[Some("c"), Some("d")],
        ]));

        assert_eq!(clean.rows.len(), 2);
        assert_eq!(clean.rows[1], vec!["c".to_string(), "d".to_string()]);
    }

    #[test]
    fn control_characters_do_not_keep_a_row_alive() {
        let clean = normalize_table(&raw(&[
            &[Some("a"), Some("b")],
            &[Some("\u{1}"), Some(" \u{7} ")],
            &[Some("x\u{0}y"), Some("linha\nquebrada")],
        ]));

        assert_eq!(
            clean.rows,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["xy".to_string(), "linha\nquebrada".to_string()],
            ]
        );
    }

    #[test]
    fn markers_are_case_sensitive() {
        let clean = normalize_table(&raw(&[&[Some("Null"), Some("NAN")]]));
        assert_eq!(clean.rows, vec![vec!["Null".to_string(), "NAN".to_string()]]);
    }

    #[test]
    fn fully_empty_table_keeps_its_width() {
        let clean = normalize_table(&raw(&[&[Some(""), None, Some("nan")]]));
        assert!(clean.is_empty());
        assert_eq!(clean.columns, 3);
        assert_eq!((clean.page, clean.index, clean.ordinal), (2, 1, 3));
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let once = normalize_table(&raw(&[
            &[Some(" x "), None],
            &[Some("NULL"), Some("")],
            &[Some("y"), Some("nan")],
        ]));
        let twice = normalize_table(&reraw(&once));
        assert_eq!(once, twice);
    }
}
