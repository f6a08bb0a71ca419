#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCode {
    /// Neither detection strategy produced a table.
    NoTablesDetected,
    /// Lattice found nothing; the stream results were used instead.
    StreamFallback,
    /// An intermediate per-table artifact could not be read back.
    TableReadFailure,
    /// A page produced no extractable text.
    TextExtractionFailure,
    /// A page could not be interpreted by the table finder.
    PageScanFailure,
    /// The identifier marker is absent; the sentinel was used.
    MarkerNotFound,
}

impl WarningCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoTablesDetected => "no_tables_detected",
            Self::StreamFallback => "stream_fallback",
            Self::TableReadFailure => "table_read_failure",
            Self::TextExtractionFailure => "text_extraction_failure",
            Self::PageScanFailure => "page_scan_failure",
            Self::MarkerNotFound => "marker_not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationWarning {
    pub code: WarningCode,
    pub message: String,
    pub page: Option<u32>,
    pub table: Option<usize>,
}

impl ConsolidationWarning {
    #[must_use]
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            page: None,
            table: None,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: usize) -> Self {
        self.table = Some(table);
        self
    }
}
