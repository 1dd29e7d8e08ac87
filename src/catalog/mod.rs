//! Catalog of tables known to the engine.

mod schema;

pub use schema::{Column, Schema};

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, RivetError};
use crate::storage::TableHeap;

/// Identifier of a table in the catalog.
pub type TableOid = u32;

/// Everything the execution layer needs to know about one table.
pub struct TableInfo {
    /// Catalog-assigned table identifier.
    pub oid: TableOid,
    /// Table name.
    pub name: String,
    /// Table schema.
    pub schema: Schema,
    /// Row storage.
    pub heap: Arc<TableHeap>,
}

/// Registry mapping table names and oids to their schema and heap.
#[derive(Default)]
pub struct Catalog {
    tables: HashMap<TableOid, Arc<TableInfo>>,
    names: HashMap<String, TableOid>,
    next_oid: TableOid,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new table and returns its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if a table with the same name already exists.
    pub fn create_table(&mut self, name: impl Into<String>, schema: Schema) -> Result<Arc<TableInfo>> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(RivetError::Execution(format!(
                "table '{name}' already exists"
            )));
        }

        let oid = self.next_oid;
        self.next_oid += 1;

        let info = Arc::new(TableInfo {
            oid,
            name: name.clone(),
            schema,
            heap: Arc::new(TableHeap::new()),
        });
        self.tables.insert(oid, Arc::clone(&info));
        self.names.insert(name, oid);
        Ok(info)
    }

    /// Looks up a table by oid.
    #[must_use]
    pub fn table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.get(&oid).cloned()
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        self.names.get(name).and_then(|oid| self.table(*oid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn test_create_and_lookup() {
        let mut catalog = Catalog::new();
        let info = catalog
            .create_table("users", Schema::new(vec![Column::new("id", DataType::Int64)]))
            .unwrap();

        assert_eq!(info.name, "users");
        assert!(catalog.table(info.oid).is_some());
        assert!(catalog.table_by_name("users").is_some());
        assert!(catalog.table_by_name("missing").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut catalog = Catalog::new();
        catalog
            .create_table("t", Schema::empty())
            .unwrap();
        assert!(catalog.create_table("t", Schema::empty()).is_err());
    }
}
