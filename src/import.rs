//! # Import
//!
//! Decodes a workbook, re-scopes the store to the workbook's sheets, writes every row and
//! records the new schema. Listeners registered with [`Importer::subscribe`] hear about
//! each import that completed.
//!
//! A file that fails to decode leaves the store untouched. A failed insert stops the
//! import where it is: rows written so far stay, and the schema record keeps describing
//! the previous import.

use crate::config::StashConfig;
use crate::error::StashError;
use crate::spreadsheet;
use crate::spreadsheet::Criteria;
use crate::store::SchemaRecord;
use crate::store::StoreError;
use crate::store::StoreHandle;
use anyhow::Context;
use chrono::DateTime;
use chrono::Utc;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to decode '{file}': {source}")]
    DecodeFailed { file: String, source: Box<StashError> },

    /// Rows before the failing one stay written. When target collections are cleared before
    /// writing, the failing collection has also lost the rows it held before this import,
    /// and collections later in the workbook keep their old rows.
    #[error("Import stopped in collection '{collection}' after {inserted} rows: {source}")]
    InsertFailed { collection: String, inserted: usize, source: Box<StashError> },
}

/// Outcome of a completed import.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportReport {
    pub file_name: String,
    /// Collection names in workbook order
    pub resources: Vec<String>,
    /// Rows written per collection
    pub counts: Vec<(String, usize)>,
    pub uploaded_at: DateTime<Utc>,
    /// Orphaned collections dropped by this import
    pub purged: Vec<String>,
}

impl ImportReport {
    pub fn total_rows(&self) -> usize {
        self.counts.iter().map(|(_, count)| count).sum()
    }
}

type Listener = Box<dyn Fn(&ImportReport)>;

pub struct Importer {
    criteria: Criteria,
    clear_existing: bool,
    purge_orphans: bool,
    listeners: Vec<Listener>,
}

impl Importer {
    pub fn new(config: &StashConfig) -> Self {
        Importer {
            criteria: config.criteria.clone(),
            clear_existing: config.clear_existing,
            purge_orphans: config.purge_orphans,
            listeners: Vec::new(),
        }
    }

    /// Registers a callback run after every successful import.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&ImportReport) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Reads a workbook from disk and imports it under its file name.
    pub fn import_file<P: AsRef<Path>>(&self, handle: &mut StoreHandle, path: P) -> Result<ImportReport, StashError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))
            .map_err(|error| ImportError::DecodeFailed {
                file: file_name.to_owned(),
                source: Box::new(error.into()),
            })?;
        self.import_bytes(handle, &file_name, &bytes)
    }

    pub fn import_bytes(&self, handle: &mut StoreHandle, file_name: &str, bytes: &[u8]) -> Result<ImportReport, StashError> {
        let decoded = spreadsheet::decode(bytes, &self.criteria).map_err(|error| {
            warn!(file = file_name, %error, "import rejected");
            ImportError::DecodeFailed { file: file_name.to_owned(), source: Box::new(error) }
        })?;
        let resources = decoded.resource_names();

        let store = handle.open(&resources)?;
        let purged = if self.purge_orphans {
            let purged = store.drop_orphans()?;
            if !purged.is_empty() {
                warn!(collections = ?purged, "dropped orphaned collections");
            }
            purged
        } else {
            Vec::new()
        };

        let mut counts = Vec::with_capacity(decoded.len());
        for sheet in decoded.sheets {
            let collection = store
                .collection(&sheet.name)
                .ok_or_else(|| StoreError::CollectionNotFound(sheet.name.to_owned()))?;
            let failed = |inserted: usize, source: StashError| {
                warn!(collection = %sheet.name, inserted, error = %source, "import aborted");
                ImportError::InsertFailed {
                    collection: sheet.name.to_owned(),
                    inserted,
                    source: Box::new(source),
                }
            };
            if self.clear_existing {
                collection.clear().map_err(|source| failed(0, source))?;
            }
            let inserted = collection
                .insert_all(sheet.rows)
                .map_err(|(inserted, source)| failed(inserted, source))?;
            debug!(collection = %sheet.name, rows = inserted, "imported sheet");
            counts.push((sheet.name, inserted));
        }

        let schema = SchemaRecord::new(resources);
        store.put_schema(&schema)?;

        let report = ImportReport {
            file_name: file_name.to_owned(),
            resources: schema.resources,
            counts,
            uploaded_at: schema.uploaded_at,
            purged,
        };
        info!(file = file_name, collections = report.resources.len(), rows = report.total_rows(), "import completed");
        for listener in &self.listeners {
            listener(&report);
        }
        Ok(report)
    }
}
