use std::path::Path;

use tempfile::TempDir;

use crate::error::ConsolidateError;

const RUN_DIR_PREFIX: &str = "pdf2xlsx-run-";

/// Scratch directory owned by one run; removed when dropped.
#[derive(Debug)]
pub struct RunDir {
    dir: TempDir,
}

impl RunDir {
    /// Creates a run directory under the system temp location.
    pub fn temporary() -> Result<Self, ConsolidateError> {
        let dir = tempfile::Builder::new().prefix(RUN_DIR_PREFIX).tempdir()?;
        Ok(Self { dir })
    }

    /// Creates a run directory inside `parent`, which must exist.
    pub fn within(parent: &Path) -> Result<Self, ConsolidateError> {
        let dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir_in(parent)
            .map_err(|source| ConsolidateError::write(parent, source))?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
