//! Name-to-page metadata for tables and indexes.
//!
//! The storage core itself is addressed only by page id and RID. Callers
//! resolve names through a [`Catalog`] and publish page ids back to it when
//! they change, e.g. after a B+Tree root split.
//!
//! [`MemoryCatalog`] forgets everything with the process. [`PageCatalog`]
//! writes every change through to a page at the start of the database file.

mod catalog_state;
mod memory_catalog;
mod page_catalog;
mod schema;

pub use memory_catalog::MemoryCatalog;
pub use page_catalog::{PageCatalog, CATALOG_PAGE_ID};
pub use schema::{Column, DataType, Schema};

use serde::{Deserialize, Serialize};

use crate::common::{PageId, Result};

/// Catalog entry for a table heap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub schema: Schema,
    pub first_page_id: PageId,
    /// Names of the indexes built on this table
    pub indexes: Vec<String>,
}

/// Catalog entry for a B+Tree index over one table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub table_name: String,
    pub column: String,
    pub root_page_id: PageId,
}

/// Lookup and registration of tables and indexes by name.
pub trait Catalog: Send + Sync {
    fn create_table(&self, name: &str, schema: Schema, first_page_id: PageId)
        -> Result<TableInfo>;

    fn table(&self, name: &str) -> Result<TableInfo>;

    /// Points an existing table at a different first heap page.
    fn set_first_page(&self, name: &str, first_page_id: PageId) -> Result<()>;

    /// Registers an index on `table.column`. The column must exist and hold
    /// integer values.
    fn create_index(
        &self,
        name: &str,
        table: &str,
        column: &str,
        root_page_id: PageId,
    ) -> Result<IndexInfo>;

    fn index(&self, name: &str) -> Result<IndexInfo>;

    /// Publishes a new root after the tree grew or shrank.
    fn set_index_root(&self, name: &str, root_page_id: PageId) -> Result<()>;

    /// Table names in ascending order.
    fn list_tables(&self) -> Vec<String>;
}
