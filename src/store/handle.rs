use crate::config::Location;
use crate::config::StashConfig;
use crate::error::StashError;
use crate::store::drop_all_tables;
use crate::store::Store;
use crate::store::StoreError;
use duckdb::Connection;
use tracing::debug;
use tracing::info;

/// Owns the database connection and the currently open [`Store`].
///
/// The handle starts uninitialized. [`StoreHandle::bootstrap`] restores the collections
/// named by the stored schema record, [`StoreHandle::open`] replaces the store with one
/// scoped to a new name set, and [`StoreHandle::reset`] wipes everything.
pub struct StoreHandle {
    config: StashConfig,
    root: Option<Connection>,
    store: Option<Store>,
}

impl StoreHandle {
    /// Creates an uninitialized handle. The database is not touched until first use.
    pub fn new(config: StashConfig) -> Self {
        StoreHandle { config, root: None, store: None }
    }

    pub fn config(&self) -> &StashConfig {
        &self.config
    }

    fn connection(&mut self) -> Result<&Connection, StashError> {
        let connection = match self.root.take() {
            Some(connection) => connection,
            None => {
                debug!(location = ?self.config.location, "connecting to database");
                match &self.config.location {
                    Location::File(path) => Connection::open(path)?,
                    Location::Memory => Connection::open_in_memory()?,
                }
            }
        };
        Ok(&*self.root.insert(connection))
    }

    /// Replaces the open store with one exposing exactly `names`.
    /// On failure the previous store stays in place.
    pub fn open(&mut self, names: &[String]) -> Result<&Store, StashError> {
        let connection = self.connection()?.try_clone()?;
        let store = Store::open(connection, names)?;
        Ok(&*self.store.insert(store))
    }

    /// Restores the store from the schema record when none is open yet.
    /// Stays uninitialized when no import has been recorded.
    pub fn bootstrap(&mut self) -> Result<Option<&Store>, StashError> {
        if self.store.is_none() {
            let existing = Store::open(self.connection()?.try_clone()?, &[])?;
            match existing.schema()? {
                Some(schema) if !schema.resources.is_empty() => {
                    debug!(resources = ?schema.resources, "bootstrapping store from schema record");
                    self.open(&schema.resources)?;
                }
                _ => debug!("no schema record, store stays uninitialized"),
            }
        }
        Ok(self.store.as_ref())
    }

    /// The open store, or [`StoreError::NotInitialized`].
    pub fn get(&self) -> Result<&Store, StashError> {
        Ok(self.store.as_ref().ok_or(StoreError::NotInitialized)?)
    }

    pub fn get_or_bootstrap(&mut self) -> Result<&Store, StashError> {
        self.bootstrap()?;
        self.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    /// Drops every table, the schema record included, and reopens with no collections.
    pub fn reset(&mut self) -> Result<(), StashError> {
        self.store = None;
        let dropped = drop_all_tables(self.connection()?)?;
        self.open(&[])?;
        info!(tables = dropped.len(), "store reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::record::Value;
    use crate::store::SchemaRecord;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn uninitialized_until_opened() -> Result<(), StashError> {
        let mut handle = StoreHandle::new(StashConfig::in_memory());
        assert!(handle.get().is_err_and(|error| error.is_not_initialized()));
        assert!(handle.bootstrap()?.is_none());
        assert!(!handle.is_initialized());
        Ok(())
    }

    #[test]
    fn failed_open_keeps_previous_store() -> Result<(), StashError> {
        let mut handle = StoreHandle::new(StashConfig::in_memory());
        handle.open(&names(&["users"]))?;
        assert!(handle.open(&names(&["__meta"])).is_err());
        assert_eq!(handle.get()?.names(), &names(&["users"])[..]);
        Ok(())
    }

    #[test]
    fn reopening_changes_visible_collections() -> Result<(), StashError> {
        let mut handle = StoreHandle::new(StashConfig::in_memory());
        handle.open(&names(&["a"]))?.insert("a", Record::from_iter([("v", 1)]))?;
        let store = handle.open(&names(&["b"]))?;
        assert!(store.count("a").is_err_and(|error| error.is_collection_not_found()));

        let store = handle.open(&names(&["a", "b"]))?;
        assert_eq!(store.count("a")?, 1);
        Ok(())
    }

    #[test]
    fn bootstrap_is_idempotent() -> Result<(), StashError> {
        let directory = tempfile::tempdir()?;
        let config = StashConfig::default().with_path(directory.path().join("stash.duckdb"));
        {
            let mut handle = StoreHandle::new(config.clone());
            let store = handle.open(&names(&["users", "orders"]))?;
            store.insert("users", Record::from_iter([("name", "Ann")]))?;
            store.put_schema(&SchemaRecord::new(names(&["users", "orders"])))?;
        }

        let mut handle = StoreHandle::new(config);
        let first = handle.bootstrap()?.map(|store| store.names().to_vec());
        let second = handle.bootstrap()?.map(|store| store.names().to_vec());
        assert_eq!(first, Some(names(&["users", "orders"])));
        assert_eq!(first, second);
        let rows = handle.get()?.scan_all("users")?;
        assert_eq!(rows[0].get("name"), Some(&Value::from("Ann")));
        Ok(())
    }

    #[test]
    fn reset_drops_everything() -> Result<(), StashError> {
        let mut handle = StoreHandle::new(StashConfig::in_memory());
        let store = handle.open(&names(&["users"]))?;
        store.insert("users", Record::from_iter([("name", "Ann")]))?;
        store.put_schema(&SchemaRecord::new(names(&["users"])))?;

        handle.reset()?;
        let store = handle.get()?;
        assert!(store.names().is_empty());
        assert!(store.count("users").is_err_and(|error| error.is_collection_not_found()));
        assert_eq!(store.schema()?, None);

        let store = handle.open(&names(&["users"]))?;
        assert_eq!(store.count("users")?, 0);
        Ok(())
    }

    #[test]
    fn reset_without_import() -> Result<(), StashError> {
        let mut handle = StoreHandle::new(StashConfig::in_memory());
        handle.reset()?;
        assert!(handle.get()?.names().is_empty());
        Ok(())
    }
}
