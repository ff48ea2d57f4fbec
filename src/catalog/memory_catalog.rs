use parking_lot::RwLock;

use crate::common::{PageId, Result};

use super::catalog_state::CatalogState;
use super::{Catalog, IndexInfo, Schema, TableInfo};

/// A [`Catalog`] kept entirely in memory. Nothing survives the process.
#[derive(Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Catalog for MemoryCatalog {
    fn create_table(
        &self,
        name: &str,
        schema: Schema,
        first_page_id: PageId,
    ) -> Result<TableInfo> {
        self.state.write().add_table(name, schema, first_page_id)
    }

    fn table(&self, name: &str) -> Result<TableInfo> {
        self.state.read().table(name)
    }

    fn set_first_page(&self, name: &str, first_page_id: PageId) -> Result<()> {
        self.state.write().set_first_page(name, first_page_id)
    }

    fn create_index(
        &self,
        name: &str,
        table: &str,
        column: &str,
        root_page_id: PageId,
    ) -> Result<IndexInfo> {
        self.state
            .write()
            .add_index(name, table, column, root_page_id)
    }

    fn index(&self, name: &str) -> Result<IndexInfo> {
        self.state.read().index(name)
    }

    fn set_index_root(&self, name: &str, root_page_id: PageId) -> Result<()> {
        self.state.write().set_index_root(name, root_page_id)
    }

    fn list_tables(&self) -> Vec<String> {
        self.state.read().table_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::common::StorageError;

    fn users() -> Schema {
        Schema::default()
            .column("id", DataType::BigInt)
            .column("name", DataType::VarChar(32))
    }

    #[test]
    fn test_table_registration() {
        let catalog = MemoryCatalog::new();
        catalog.create_table("users", users(), PageId::new(0)).unwrap();
        catalog.create_table("orders", Schema::default(), PageId::new(5)).unwrap();

        assert!(matches!(
            catalog.create_table("users", users(), PageId::new(9)),
            Err(StorageError::TableExists(_))
        ));
        assert_eq!(catalog.table("users").unwrap().first_page_id, PageId::new(0));
        assert_eq!(catalog.list_tables(), vec!["orders", "users"]);

        catalog.set_first_page("users", PageId::new(3)).unwrap();
        assert_eq!(catalog.table("users").unwrap().first_page_id, PageId::new(3));
        assert!(matches!(
            catalog.table("nope"),
            Err(StorageError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_index_registration() {
        let catalog = MemoryCatalog::new();
        catalog.create_table("users", users(), PageId::new(0)).unwrap();

        catalog
            .create_index("users_id", "users", "id", PageId::new(1))
            .unwrap();
        assert_eq!(catalog.table("users").unwrap().indexes, vec!["users_id"]);

        catalog.set_index_root("users_id", PageId::new(7)).unwrap();
        let info = catalog.index("users_id").unwrap();
        assert_eq!(info.root_page_id, PageId::new(7));
        assert_eq!(info.column, "id");

        assert!(matches!(
            catalog.create_index("users_id", "users", "id", PageId::new(2)),
            Err(StorageError::IndexExists(_))
        ));
        assert!(catalog
            .create_index("users_name", "users", "name", PageId::new(2))
            .is_err());
        assert!(catalog
            .create_index("users_age", "users", "age", PageId::new(2))
            .is_err());
        assert!(matches!(
            catalog.create_index("x", "missing", "id", PageId::new(2)),
            Err(StorageError::TableNotFound(_))
        ));
        assert!(matches!(
            catalog.index("missing"),
            Err(StorageError::IndexNotFound(_))
        ));
    }
}
