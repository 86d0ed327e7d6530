//! Read surface for a data browser: the schema record, collection counts, capped row
//! pages and a reset-all switch.

use crate::error::StashError;
use crate::record::Record;
use crate::store::SchemaRecord;
use crate::store::StoreError;
use crate::store::StoreHandle;

/// A collection and its row count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSummary {
    pub name: String,
    pub count: usize,
}

/// The first rows of a collection, ready for a table widget.
#[derive(Clone, Debug, PartialEq)]
pub struct RowPage {
    pub collection: String,
    /// Keys of the first row, empty when the collection is empty
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    /// Rows stored in the collection
    pub total: usize,
    /// More rows exist than `rows` holds
    pub truncated: bool,
}

pub struct Inspector<'a> {
    handle: &'a mut StoreHandle,
}

impl<'a> Inspector<'a> {
    pub fn new(handle: &'a mut StoreHandle) -> Self {
        Inspector { handle }
    }

    /// The last import's schema record, `None` before the first import or after a reset.
    pub fn schema(&mut self) -> Result<Option<SchemaRecord>, StashError> {
        match self.handle.get_or_bootstrap() {
            Ok(store) => store.schema(),
            Err(error) if error.is_not_initialized() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Every schema resource reachable on the open store, with its row count.
    /// Empty when nothing has been imported yet.
    pub fn tables(&mut self) -> Result<Vec<TableSummary>, StashError> {
        let store = match self.handle.get_or_bootstrap() {
            Ok(store) => store,
            Err(error) if error.is_not_initialized() => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        let Some(schema) = store.schema()? else {
            return Ok(Vec::new());
        };
        let mut tables = Vec::with_capacity(schema.resources.len());
        for name in schema.resources {
            if let Some(collection) = store.collection(&name) {
                tables.push(TableSummary { count: collection.count()?, name });
            }
        }
        Ok(tables)
    }

    /// Up to `display_limit` rows of a collection in insertion order.
    pub fn rows(&mut self, name: &str) -> Result<RowPage, StashError> {
        let limit = self.handle.config().display_limit;
        let store = self.handle.get_or_bootstrap()?;
        let collection = store
            .collection(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_owned()))?;
        let total = collection.count()?;
        let rows = collection.head(limit)?;
        let columns = rows
            .first()
            .map(|row| row.keys().map(str::to_owned).collect())
            .unwrap_or_default();
        Ok(RowPage {
            collection: name.to_owned(),
            columns,
            truncated: total > rows.len(),
            rows,
            total,
        })
    }

    /// Deletes all stored data. Irreversible.
    pub fn reset(&mut self) -> Result<(), StashError> {
        self.handle.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StashConfig;
    use crate::import::Importer;
    use crate::record::Value;
    use crate::testing::WorkbookBuilder;

    fn imported(config: &StashConfig, bytes: &[u8]) -> Result<StoreHandle, StashError> {
        let mut handle = StoreHandle::new(config.clone());
        Importer::new(config).import_bytes(&mut handle, "book.xlsx", bytes)?;
        Ok(handle)
    }

    #[test]
    fn empty_before_first_import() -> Result<(), StashError> {
        let mut handle = StoreHandle::new(StashConfig::in_memory());
        let mut inspector = Inspector::new(&mut handle);
        assert_eq!(inspector.schema()?, None);
        assert!(inspector.tables()?.is_empty());
        assert!(inspector.rows("users").is_err_and(|error| error.is_not_initialized()));
        Ok(())
    }

    #[test]
    fn lists_tables_with_counts() -> Result<(), StashError> {
        let bytes = WorkbookBuilder::new()
            .sheet("Users", &[&["name"], &["Ann"], &["Bo"]])
            .sheet("Orders", &[&["id", "total"], &["7", "42"]])
            .sheet("Blank", &[&["only", "header"]])
            .build();
        let mut handle = imported(&StashConfig::in_memory(), &bytes)?;
        let mut inspector = Inspector::new(&mut handle);

        let tables = inspector.tables()?;
        let summary: Vec<(&str, usize)> = tables.iter().map(|table| (table.name.as_str(), table.count)).collect();
        assert_eq!(summary, vec![("users", 2), ("orders", 1), ("blank", 0)]);

        let page = inspector.rows("orders")?;
        assert_eq!(page.columns, vec!["id", "total"]);
        assert_eq!(page.rows[0].get("total"), Some(&Value::from(42)));
        assert!(!page.truncated);

        let page = inspector.rows("blank")?;
        assert!(page.columns.is_empty());
        assert_eq!(page.total, 0);
        Ok(())
    }

    #[test]
    fn row_pages_are_capped() -> Result<(), StashError> {
        let numbers: Vec<String> = (1..=105).map(|number| number.to_string()).collect();
        let mut rows: Vec<Vec<&str>> = vec![vec!["n"]];
        rows.extend(numbers.iter().map(|number| vec![number.as_str()]));
        let rows: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
        let bytes = WorkbookBuilder::new().sheet("Numbers", &rows).build();

        let mut handle = imported(&StashConfig::in_memory(), &bytes)?;
        let page = Inspector::new(&mut handle).rows("numbers")?;
        assert_eq!(page.rows.len(), 100);
        assert_eq!(page.total, 105);
        assert!(page.truncated);
        assert_eq!(page.columns, vec!["id", "n"]);
        assert_eq!(page.rows[99].get("n"), Some(&Value::from(100)));

        let config = StashConfig::in_memory().with_display_limit(3);
        let mut handle = imported(&config, &bytes)?;
        assert_eq!(Inspector::new(&mut handle).rows("numbers")?.rows.len(), 3);
        Ok(())
    }

    #[test]
    fn unknown_collection_is_not_found() -> Result<(), StashError> {
        let bytes = WorkbookBuilder::new().sheet("Users", &[&["name"], &["Ann"]]).build();
        let mut handle = imported(&StashConfig::in_memory(), &bytes)?;
        let error = Inspector::new(&mut handle).rows("orders").err();
        assert!(error.is_some_and(|error| error.is_collection_not_found()));
        Ok(())
    }

    #[test]
    fn reset_clears_everything() -> Result<(), StashError> {
        let bytes = WorkbookBuilder::new().sheet("Users", &[&["name"], &["Ann"]]).build();
        let mut handle = imported(&StashConfig::in_memory(), &bytes)?;
        let mut inspector = Inspector::new(&mut handle);
        inspector.reset()?;

        assert_eq!(inspector.schema()?, None);
        assert!(inspector.tables()?.is_empty());
        assert!(inspector.rows("users").is_err_and(|error| error.is_collection_not_found()));
        Ok(())
    }
}
