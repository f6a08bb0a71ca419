use tracing::debug;

use crate::model::{CleanTable, Sheet, Workbook};

/// Longest sheet name spreadsheet applications accept.
pub const MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .trim()
        .chars()
        .map(|ch| {
            if FORBIDDEN_SHEET_CHARS.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

/// `{prefix}_{n}`, shortening the prefix so the suffix always fits.
pub(crate) fn sheet_name(prefix: &str, number: usize) -> String {
    let suffix = format!("_{number}");
    let room = MAX_SHEET_NAME_LEN.saturating_sub(suffix.chars().count());
    let head = sanitize_prefix(prefix).chars().take(room).collect::<String>();
    format!("{head}{suffix}")
}

fn is_included(table: &CleanTable) -> bool {
    !table.rows.is_empty() && table.columns >= 2
}

/// Turns cleaned tables into sheets, in input order.
///
/// Tables with no row or fewer than two columns are skipped and counted.
/// The sheet counter only advances on included tables, so the names are
/// always `{prefix}_1..=k` without gaps.
#[must_use]
pub fn consolidate_tables(tables: Vec<CleanTable>, sheet_prefix: &str) -> (Workbook, usize) {
    let mut workbook = Workbook::default();
    let mut skipped = 0;

    for table in tables {
        if !is_included(&table) {
            debug!(
                page = table.page,
                table = table.ordinal,
                rows = table.rows.len(),
                columns = table.columns,
                "skipping table"
            );
            skipped += 1;
            continue;
        }

        let name = sheet_name(sheet_prefix, workbook.sheets.len() + 1);
        debug!(page = table.page, table = table.ordinal, sheet = %name, "adding sheet");
        workbook.sheets.push(Sheet {
            name,
            columns: table.columns,
            rows: table.rows,
        });
    }

    (workbook, skipped)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{MAX_SHEET_NAME_LEN, consolidate_tables, sheet_name};
    use crate::model::CleanTable;

    fn table(ordinal: usize, rows: usize, columns: usize) -> CleanTable {
        CleanTable {
            page: 1,
            index: ordinal,
            ordinal,
            columns,
            rows: (0..rows)
                .map(|row| (0..columns).map(|col| format!("r{row}c{col}")).collect())
                .collect(),
        }
    }

    #[test]
    fn counter_advances_only_on_included_tables() {
        let (workbook, skipped) = consolidate_tables(
            vec![table(1, 3, 1), table(2, 3, 3), table(3, 0, 4), table(4, 2, 2)],
            "Tabela",
        );

        assert_eq!(workbook.sheet_names(), vec!["Tabela_1", "Tabela_2"]);
        assert_eq!(skipped, 2);
        assert_eq!(workbook.sheets[0].columns, 3);
        assert_eq!(workbook.sheets[0].rows.len(), 3);
        assert_eq!(workbook.sheets[1].rows[1], vec!["r1c0", "r1c1"]);
    }

    #[test]
    fn empty_input_gives_sheetless_workbook() {
        let (workbook, skipped) = consolidate_tables(Vec::new(), "Tabela");
        assert!(workbook.sheets.is_empty());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn long_prefix_keeps_numbers_and_uniqueness() {
        let prefix = "Relatorio_Financeiro_Consolidado_Anual";
        let names = (1..=120)
            .map(|number| sheet_name(prefix, number))
            .collect::<Vec<_>>();

        assert!(names.iter().all(|name| name.chars().count() <= MAX_SHEET_NAME_LEN));
        assert!(names[0].ends_with("_1"));
        assert!(names[119].ends_with("_120"));
        assert_eq!(names.iter().collect::<HashSet<_>>().len(), names.len());
    }

    #[test]
    fn forbidden_characters_in_prefix_are_replaced() {
        assert_eq!(sheet_name("Q1/Q2 [draft]", 4), "Q1_Q2 _draft__4");
    }
}
