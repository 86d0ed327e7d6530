//! The schema record: which collections the last successful import produced, and when.

use crate::error::StashError;
use crate::store::quote_identifier;
use crate::store::META_COLLECTION;
use crate::store::SCHEMA_KEY;
use chrono::DateTime;
use chrono::Utc;
use duckdb::params;
use duckdb::Connection;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRecord {
    /// Collection names in workbook order
    pub resources: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl SchemaRecord {
    pub fn new(resources: Vec<String>) -> Self {
        SchemaRecord { resources, uploaded_at: Utc::now() }
    }
}

pub(crate) fn read(connection: &Connection) -> Result<Option<SchemaRecord>, StashError> {
    let result = connection.query_row(
        &format!("SELECT value FROM {} WHERE key = ?", quote_identifier(META_COLLECTION)),
        params![SCHEMA_KEY],
        |row| row.get::<_, String>(0),
    );
    match result {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Overwrites the schema record wholesale.
pub(crate) fn put(connection: &Connection, schema: &SchemaRecord) -> Result<(), StashError> {
    let json = serde_json::to_string(schema)?;
    connection.execute(
        &format!("INSERT OR REPLACE INTO {} (key, value) VALUES (?, ?)", quote_identifier(META_COLLECTION)),
        params![SCHEMA_KEY, json],
    )?;
    Ok(())
}
