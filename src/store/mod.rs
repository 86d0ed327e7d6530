//! # Dynamic Store
//!
//! A registry of named collections over one DuckDB connection. The set of collections is
//! fixed when a [`Store`] is opened; opening with another set means building a new store
//! (see [`StoreHandle`]). Every collection is a table keyed by the JSON encoding of the record
//! identifier, with an insertion sequence that keeps scans in write order.

mod handle;
pub mod schema;

use crate::error::StashError;
use crate::record::Record;
use crate::record::Value;
use duckdb::params;
use duckdb::Connection;
use thiserror::Error;
use tracing::debug;

pub use handle::StoreHandle;
pub use schema::SchemaRecord;

/// Table holding the schema record.
pub const META_COLLECTION: &str = "__meta";

/// Key of the schema record inside [`META_COLLECTION`].
pub const SCHEMA_KEY: &str = "schema";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("The store has not been initialized yet")]
    NotInitialized,

    #[error("Collection '{0}' is not part of the open store")]
    CollectionNotFound(String),

    #[error("Collection name '{0}' is reserved")]
    ReservedCollection(String),

    #[error("Invalid record id {0}: expected a string or a number")]
    InvalidRecordId(String),
}

/// Quotes a collection name for use as a DuckDB identifier.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Names of the tables in the database's main schema.
pub(crate) fn stored_tables(connection: &Connection) -> Result<Vec<String>, StashError> {
    let mut statement = connection.prepare(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'main' AND table_type = 'BASE TABLE' ORDER BY table_name",
    )?;
    let names = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Drops every table, collections and metadata alike. Returns the dropped names.
pub(crate) fn drop_all_tables(connection: &Connection) -> Result<Vec<String>, StashError> {
    let names = stored_tables(connection)?;
    for name in &names {
        connection.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(name)))?;
    }
    Ok(names)
}

/// Gives the record an identifier and returns it with its key and JSON text.
fn encode(mut record: Record) -> Result<(Value, String, String), StashError> {
    let id = record.ensure_id().clone();
    if let Value::Bool(_) = id {
        Err(StoreError::InvalidRecordId(id.to_string()))?
    }
    let id_key = serde_json::to_string(&id)?;
    let json = serde_json::to_string(&record)?;
    Ok((id, id_key, json))
}

/// Collections opened with a fixed name set, plus the metadata table.
pub struct Store {
    connection: Connection,
    names: Vec<String>,
}

impl Store {
    /// Creates the metadata table and one table per name when missing.
    pub(crate) fn open(connection: Connection, names: &[String]) -> Result<Store, StashError> {
        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if name == META_COLLECTION {
                Err(StoreError::ReservedCollection(name.to_owned()))?
            }
            if !unique.contains(name) {
                unique.push(name.to_owned());
            }
        }

        connection.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key VARCHAR PRIMARY KEY, value VARCHAR NOT NULL)",
            quote_identifier(META_COLLECTION)
        ))?;
        for name in &unique {
            connection.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (id_key VARCHAR PRIMARY KEY, seq BIGINT NOT NULL, record VARCHAR NOT NULL)",
                quote_identifier(name)
            ))?;
        }
        debug!(collections = ?unique, "opened store");

        Ok(Store { connection, names: unique })
    }

    /// Collection names in the order they were opened with.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Accessor for an open collection, `None` outside the open set.
    pub fn collection(&self, name: &str) -> Option<Collection<'_>> {
        self.names
            .iter()
            .find(|candidate| candidate.as_str() == name)
            .map(|name| Collection { connection: &self.connection, name })
    }

    fn require(&self, name: &str) -> Result<Collection<'_>, StashError> {
        Ok(self.collection(name).ok_or_else(|| StoreError::CollectionNotFound(name.to_owned()))?)
    }

    /// Appends a record to a collection and returns its identifier.
    pub fn insert(&self, name: &str, record: Record) -> Result<Value, StashError> {
        self.require(name)?.insert(record)
    }

    pub fn scan_all(&self, name: &str) -> Result<Vec<Record>, StashError> {
        self.require(name)?.scan_all()
    }

    pub fn count(&self, name: &str) -> Result<usize, StashError> {
        self.require(name)?.count()
    }

    pub fn clear(&self, name: &str) -> Result<(), StashError> {
        self.require(name)?.clear()
    }

    /// Stored tables outside the open set, except the metadata table.
    pub fn orphans(&self) -> Result<Vec<String>, StashError> {
        Ok(stored_tables(&self.connection)?
            .into_iter()
            .filter(|name| name != META_COLLECTION && !self.names.contains(name))
            .collect())
    }

    /// Drops the orphaned tables and returns their names.
    pub fn drop_orphans(&self) -> Result<Vec<String>, StashError> {
        let orphans = self.orphans()?;
        for name in &orphans {
            self.connection.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(name)))?;
        }
        Ok(orphans)
    }

    pub fn schema(&self) -> Result<Option<SchemaRecord>, StashError> {
        schema::read(&self.connection)
    }

    pub fn put_schema(&self, schema: &SchemaRecord) -> Result<(), StashError> {
        schema::put(&self.connection, schema)
    }
}

/// Typed access to one open collection.
pub struct Collection<'a> {
    connection: &'a Connection,
    name: &'a str,
}

impl Collection<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    /// Assigns an identifier when the record lacks one, then appends it.
    /// Fails on a boolean identifier or one already present in the collection.
    pub fn insert(&self, record: Record) -> Result<Value, StashError> {
        let (id, id_key, json) = encode(record)?;
        let seq = self.next_seq()?;
        self.connection.execute(
            &format!("INSERT INTO {} (id_key, seq, record) VALUES (?, ?, ?)", quote_identifier(self.name)),
            params![id_key, seq, json],
        )?;
        Ok(id)
    }

    /// Appends records in order inside one transaction and returns how many were written.
    ///
    /// On failure the error comes with the number of records before the failing one. Those
    /// records stay committed; nothing after them is written.
    pub fn insert_all<I>(&self, records: I) -> Result<usize, (usize, StashError)>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut encoded = Vec::new();
        let mut failure = None;
        for record in records {
            match encode(record) {
                Ok((_, id_key, json)) => encoded.push((id_key, json)),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        let first_seq = self.next_seq().map_err(|error| (0, error))?;
        if let Err((written, error)) = self.write_batch(&encoded, first_seq) {
            // The aborted transaction lost the rows before the failing one, so write them again
            self.write_batch(&encoded[..written], first_seq)?;
            return Err((written, error));
        }
        match failure {
            Some(error) => Err((encoded.len(), error)),
            None => Ok(encoded.len()),
        }
    }

    fn write_batch(&self, rows: &[(String, String)], first_seq: i64) -> Result<(), (usize, StashError)> {
        let begin = |error: duckdb::Error| (0, StashError::from(error));
        self.connection.execute_batch("BEGIN TRANSACTION").map_err(begin)?;
        let mut statement = match self.connection.prepare(&format!(
            "INSERT INTO {} (id_key, seq, record) VALUES (?, ?, ?)",
            quote_identifier(self.name)
        )) {
            Ok(statement) => statement,
            Err(error) => {
                let _ = self.connection.execute_batch("ROLLBACK");
                return Err(begin(error));
            }
        };
        for (index, (id_key, json)) in rows.iter().enumerate() {
            if let Err(error) = statement.execute(params![id_key, first_seq + index as i64, json]) {
                drop(statement);
                let _ = self.connection.execute_batch("ROLLBACK");
                return Err((index, error.into()));
            }
        }
        drop(statement);
        self.connection.execute_batch("COMMIT").map_err(|error| (0, error.into()))
    }

    fn next_seq(&self) -> Result<i64, StashError> {
        Ok(self.connection.query_row(
            &format!("SELECT COALESCE(MAX(seq), 0) + 1 FROM {}", quote_identifier(self.name)),
            [],
            |row| row.get(0),
        )?)
    }

    /// Every record in insertion order.
    pub fn scan_all(&self) -> Result<Vec<Record>, StashError> {
        self.scan(&format!("SELECT record FROM {} ORDER BY seq", quote_identifier(self.name)), [])
    }

    /// The first `limit` records in insertion order.
    pub fn head(&self, limit: usize) -> Result<Vec<Record>, StashError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.scan(&format!("SELECT record FROM {} ORDER BY seq LIMIT ?", quote_identifier(self.name)), params![limit])
    }

    fn scan<P: duckdb::Params>(&self, sql: &str, params: P) -> Result<Vec<Record>, StashError> {
        let mut statement = self.connection.prepare(sql)?;
        let rows = statement
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|json| Ok(serde_json::from_str::<Record>(json)?))
            .collect()
    }

    pub fn count(&self) -> Result<usize, StashError> {
        let count: i64 = self.connection.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(self.name)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn clear(&self) -> Result<(), StashError> {
        self.connection.execute_batch(&format!("DELETE FROM {}", quote_identifier(self.name)))?;
        Ok(())
    }
}
