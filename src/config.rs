use crate::spreadsheet::Criteria;
use std::path::PathBuf;

/// Default database file, relative to the working directory.
pub const DEFAULT_DATABASE_FILE: &str = "excel-backend-db.duckdb";

/// Default cap on rows returned by the inspector.
pub const DEFAULT_DISPLAY_LIMIT: usize = 100;

/// Where the DuckDB database lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    /// Private in-memory database, gone when the handle is dropped
    Memory,
}

/// Settings shared by the store handle, the importer and the inspector.
#[derive(Clone, Debug)]
pub struct StashConfig {
    pub location: Location,

    /// Maximum rows in an inspector row page.
    pub display_limit: usize,

    /// Delete the rows of every target collection before an import writes to it.
    pub clear_existing: bool,

    /// Drop stored collections that the new import no longer names.
    pub purge_orphans: bool,

    /// Sheet filter and error-cell handling for the decoder.
    pub criteria: Criteria,
}

impl Default for StashConfig {
    fn default() -> Self {
        StashConfig {
            location: Location::File(PathBuf::from(DEFAULT_DATABASE_FILE)),
            display_limit: DEFAULT_DISPLAY_LIMIT,
            clear_existing: true,
            purge_orphans: false,
            criteria: Criteria::default(),
        }
    }
}

impl StashConfig {
    pub fn in_memory() -> Self {
        StashConfig::default().with_location(Location::Memory)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn with_path<P: Into<PathBuf>>(self, path: P) -> Self {
        self.with_location(Location::File(path.into()))
    }

    pub fn with_display_limit(mut self, display_limit: usize) -> Self {
        self.display_limit = display_limit;
        self
    }

    pub fn with_clear_existing(mut self, clear_existing: bool) -> Self {
        self.clear_existing = clear_existing;
        self
    }

    pub fn with_purge_orphans(mut self, purge_orphans: bool) -> Self {
        self.purge_orphans = purge_orphans;
        self
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }
}
