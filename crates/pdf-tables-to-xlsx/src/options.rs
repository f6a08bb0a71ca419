use std::collections::BTreeSet;
use std::str::FromStr;

use crate::model::StrategyMode;

pub const DEFAULT_SHEET_PREFIX: &str = "Tabela";
pub const DEFAULT_WORKBOOK_NAME: &str = "consolidado_final.xlsx";
pub const DEFAULT_INFO_NAME: &str = "arquivo_info.txt";
pub const DEFAULT_INFO_TEXT: &str = "Olá! Este é um arquivo de texto criado com Python.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
}

impl PageSelection {
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl FromStr for PageSelection {
    type Err = String;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut pages = BTreeSet::new();
        for token in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some((start, end)) = token.split_once('-') {
                let start: u32 = start
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range start: '{start}'"))?;
                let end: u32 = end
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range end: '{end}'"))?;
                if start == 0 || end == 0 {
                    return Err("pages are 1-based".to_string());
                }
                if end < start {
                    return Err(format!(
                        "invalid range '{token}': end is smaller than start"
                    ));
                }
                pages.extend(start..=end);
            } else {
                let page: u32 = token
                    .parse()
                    .map_err(|_| format!("invalid page number: '{token}'"))?;
                if page == 0 {
                    return Err("pages are 1-based".to_string());
                }
                pages.insert(page);
            }
        }

        if pages.is_empty() {
            return Err("page selection cannot be empty".to_string());
        }

        Ok(Self { pages })
    }
}

/// Tolerances handed to the table finder, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSettings {
    pub snap_tolerance: f64,
    pub join_tolerance: f64,
    pub intersection_tolerance: f64,
    pub edge_min_length: f64,
    /// Slack when aligning words for the stream strategy.
    pub text_tolerance: f64,
    /// Words that must share a left or right edge before the stream strategy
    /// draws a column boundary there.
    pub min_words_vertical: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            snap_tolerance: 3.0,
            join_tolerance: 3.0,
            intersection_tolerance: 3.0,
            edge_min_length: 3.0,
            text_tolerance: 3.0,
            min_words_vertical: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidateOptions {
    pub pages: Option<PageSelection>,
    pub strategy: StrategyMode,
    pub detection: DetectionSettings,
    pub sheet_prefix: String,
    /// Write a `0, 1, 2, …` column header row on every sheet.
    pub column_header_row: bool,
    pub workbook_name: String,
    pub info_name: String,
    pub info_text: String,
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            pages: None,
            strategy: StrategyMode::Auto,
            detection: DetectionSettings::default(),
            sheet_prefix: DEFAULT_SHEET_PREFIX.to_string(),
            column_header_row: true,
            workbook_name: DEFAULT_WORKBOOK_NAME.to_string(),
            info_name: DEFAULT_INFO_NAME.to_string(),
            info_text: DEFAULT_INFO_TEXT.to_string(),
        }
    }
}

impl ConsolidateOptions {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.detection.min_words_vertical < 2 {
            return Err("min_words_vertical must be at least 2".to_string());
        }
        if self.sheet_prefix.trim().is_empty() {
            return Err("sheet prefix cannot be empty".to_string());
        }
        if self.workbook_name.trim().is_empty() || self.info_name.trim().is_empty() {
            return Err("bundle file names cannot be empty".to_string());
        }
        let detection = &self.detection;
        let tolerances = [
            detection.snap_tolerance,
            detection.join_tolerance,
            detection.intersection_tolerance,
            detection.edge_min_length,
            detection.text_tolerance,
        ];
        if tolerances.iter().any(|value| !value.is_finite() || *value < 0.0) {
            return Err("detection tolerances must be finite and non-negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConsolidateOptions, DetectionSettings, PageSelection};
    use crate::model::StrategyMode;
    use std::str::FromStr;

    #[test]
    fn parse_page_selection_range_and_single() {
        let selection = PageSelection::from_str("1-3,5").expect("selection should parse");
        assert!(selection.contains(1));
        assert!(selection.contains(3));
        assert!(selection.contains(5));
        assert!(!selection.contains(4));
    }

    #[test]
    fn reject_invalid_page_selection() {
        let err = PageSelection::from_str("3-1").expect_err("invalid range should fail");
        assert!(err.contains("invalid range"));
        let err = PageSelection::from_str("0").expect_err("zero page should fail");
        assert!(err.contains("1-based"));
    }

    #[test]
    fn parse_strategy_mode() {
        assert_eq!(StrategyMode::from_str("Lattice"), Ok(StrategyMode::Lattice));
        assert_eq!(StrategyMode::from_str("stream"), Ok(StrategyMode::Stream));
        assert!(StrategyMode::from_str("guess").is_err());
    }

    #[test]
    fn default_options_are_valid() {
        assert!(ConsolidateOptions::default().validate().is_ok());
    }

    #[test]
    fn rejects_blank_sheet_prefix_and_small_word_alignment() {
        let options = ConsolidateOptions {
            sheet_prefix: "  ".to_string(),
            ..ConsolidateOptions::default()
        };
        assert!(options.validate().is_err());

        let options = ConsolidateOptions {
            detection: DetectionSettings {
                min_words_vertical: 1,
                ..DetectionSettings::default()
            },
            ..ConsolidateOptions::default()
        };
        assert_eq!(
            options.validate(),
            Err("min_words_vertical must be at least 2".to_string())
        );
    }
}
