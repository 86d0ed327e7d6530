//! # Rusty Stash
//!
//! Import Excel workbooks into a local DuckDB database and browse them later. Every sheet of
//! an uploaded workbook becomes a named collection of row records; a small schema record
//! remembers which collections the last import produced so they can be reopened on the next
//! start.
//!
//! ## Features
//!
//! - **Workbook decoding**: Pure Rust readers for Excel 2007+ (`.xlsx`, `.xlsm`) and legacy
//!   Excel 97-2003 (`.xls`) files, with format detection from the file signature
//! - **Loose records**: Rows become ordered field maps of null, boolean, number or string
//!   values keyed by the sheet's header row
//! - **Dynamic collections**: The set of stored tables is decided at runtime by the
//!   uploaded file, through an explicit registry rebuilt whenever the set changes
//! - **Schema bootstrap**: The last import's collections are rediscovered from the schema
//!   record when the store is reopened
//! - **Inspection**: Collection counts, capped row pages and a reset-all operation for a UI
//!
//! ## Example
//!
//! ```no_run
//! use rusty_stash::config::StashConfig;
//! use rusty_stash::import::Importer;
//! use rusty_stash::inspect::Inspector;
//! use rusty_stash::store::StoreHandle;
//!
//! # fn main() -> Result<(), rusty_stash::StashError> {
//! let config = StashConfig::default();
//! let mut handle = StoreHandle::new(config.clone());
//! let importer = Importer::new(&config);
//! importer.import_file(&mut handle, "orders.xlsx")?;
//!
//! let mut inspector = Inspector::new(&mut handle);
//! for table in inspector.tables()? {
//!     println!("{} ({})", table.name, table.count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
mod helpers;
pub mod import;
pub mod inspect;
pub mod record;
pub mod spreadsheet;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::StashError;
pub use record::{Record, Value};
