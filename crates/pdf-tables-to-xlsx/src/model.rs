use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    /// Ruled borders drawn on the page.
    Lattice,
    /// Columns inferred from whitespace between words.
    Stream,
}

impl DetectionStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lattice => "lattice",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for DetectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which detection strategies a run may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyMode {
    /// Lattice first, stream only when lattice finds nothing in the document.
    #[default]
    Auto,
    Lattice,
    Stream,
}

impl FromStr for StrategyMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "lattice" => Ok(Self::Lattice),
            "stream" => Ok(Self::Stream),
            other => Err(format!(
                "unknown strategy '{other}', expected auto, lattice or stream"
            )),
        }
    }
}

/// One table as found on the page, before any cleanup.
///
/// Every row has the same number of cells; `None` marks a grid slot that had
/// no cell at all (for instance the area covered by a spanning cell).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub page: u32,
    /// 1-based position of the table on its page.
    pub index: usize,
    /// 1-based position of the table in the whole document.
    pub ordinal: usize,
    pub strategy: DetectionStrategy,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanTable {
    pub page: u32,
    pub index: usize,
    pub ordinal: usize,
    pub columns: usize,
    pub rows: Vec<Vec<String>>,
}

impl CleanTable {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub columns: usize,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    #[must_use]
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|sheet| sheet.name.clone()).collect()
    }
}

/// A named file handed to the packager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}
