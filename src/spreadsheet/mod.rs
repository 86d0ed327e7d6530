//! # Spreadsheet Decoding
//!
//! Turns the raw bytes of an Excel workbook into named sheets of row records. Excel 2007+
//! packages (`.xlsx`, `.xlsm`) and legacy Excel 97-2003 files (`.xls`) are told apart by
//! their leading bytes, read with the format's own reader, and flattened into records keyed
//! by the first used row of each sheet.
//!
//! Decoding is a pure transform: nothing is written anywhere, and any failure discards the
//! whole workbook.

mod cell;
mod criteria;
mod excel;
pub(crate) mod reference;
mod sheet;
pub(crate) mod xls;
mod xlsx;

use crate::error::StashError;
use crate::helpers::cfb::Cfb;
use crate::helpers::cfb::SIGNATURE as CFB_SIGNATURE;
use crate::helpers::zip::SIGNATURE as ZIP_SIGNATURE;
use crate::record::Record;
use anyhow::Context;
use sheet::Sheet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use xls::XlsWorkbook;
use xlsx::XlsxWorkbook;

pub use criteria::Criteria;

/// Decoder failures. Any of them rejects the whole file.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Unsupported file format (expected an .xlsx or .xls workbook)")]
    UnsupportedFormat,

    #[error("The workbook is password protected")]
    PasswordProtected,

    #[error("The workbook contains no sheets")]
    EmptyWorkbook,

    #[error("Missing workbook part '{0}'")]
    MissingPart(String),

    #[error("Invalid cell value at '{1}' in sheet '{0}': {2}")]
    CellValueError(String, String, String),
}

/// Workbook container formats recognised by their signature.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    /// Office Open XML package (ZIP)
    Xlsx,
    /// OLE compound file holding a BIFF8 stream or an encrypted package
    Xls,
}

impl Format {
    /// Sniffs the container format from the leading bytes.
    pub fn detect(bytes: &[u8]) -> Option<Format> {
        if bytes.starts_with(&ZIP_SIGNATURE) {
            Some(Format::Xlsx)
        } else if bytes.starts_with(&CFB_SIGNATURE) {
            Some(Format::Xls)
        } else {
            None
        }
    }
}

/// Common reader interface over the supported workbook formats.
pub(crate) trait Workbook {
    /// Loads the shared string table that string cells index into.
    fn load_shared_strings(&mut self) -> Result<Vec<String>, StashError>;

    /// Reads the used cells of every sheet accepted by the criteria, in workbook order.
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, StashError>;
}

/// One decoded sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedSheet {
    /// Collection name: the sheet name lower-cased
    pub name: String,
    /// Sheet name as written in the workbook
    pub source_name: String,
    /// Field names from the header row
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

/// All sheets of a workbook in workbook order, with unique collection names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedWorkbook {
    pub sheets: Vec<DecodedSheet>,
}

impl DecodedWorkbook {
    /// Collection names in workbook order.
    pub fn resource_names(&self) -> Vec<String> {
        self.sheets.iter().map(|sheet| sheet.name.to_owned()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&DecodedSheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Adds a sheet. A sheet whose lower-cased name is already present replaces the
    /// earlier one in place.
    fn push(&mut self, sheet: DecodedSheet) {
        match self.sheets.iter_mut().find(|existing| existing.name == sheet.name) {
            Some(existing) => {
                debug!(collection = %sheet.name, replaced = %existing.source_name, "sheet names collide after lower-casing");
                *existing = sheet;
            }
            None => self.sheets.push(sheet),
        }
    }
}

fn open_workbook(bytes: &[u8]) -> Result<Box<dyn Workbook>, StashError> {
    match Format::detect(bytes) {
        Some(Format::Xlsx) => Ok(Box::new(XlsxWorkbook::open(bytes.to_vec())?)),
        Some(Format::Xls) => {
            let cfb = Cfb::from_bytes(bytes.to_vec())?;
            // Encrypted .xlsx packages are wrapped in a compound file as well
            if cfb.exists("EncryptedPackage") {
                Err(SpreadsheetError::PasswordProtected)?
            }
            Ok(Box::new(XlsWorkbook::open(&cfb)?))
        }
        None => Err(SpreadsheetError::UnsupportedFormat)?,
    }
}

/// Decodes workbook bytes into sheets of records.
pub fn decode(bytes: &[u8], criteria: &Criteria) -> Result<DecodedWorkbook, StashError> {
    let mut workbook = open_workbook(bytes)?;
    let shared_strings = workbook.load_shared_strings()?;
    let mut decoded = DecodedWorkbook::default();
    for sheet in workbook.read_sheets(criteria)? {
        decoded.push(sheet.into_decoded(&shared_strings)?);
    }
    debug!(sheets = decoded.len(), bytes = bytes.len(), "decoded workbook");
    Ok(decoded)
}

/// Reads a workbook file from disk and decodes it.
pub fn decode_file<P: AsRef<Path>>(path: P, criteria: &Criteria) -> Result<DecodedWorkbook, StashError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    decode(&bytes, criteria)
}
