use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::common::{PageId, Result, StorageError};

use super::{IndexInfo, Schema, TableInfo};

/// Name maps behind every [`Catalog`](super::Catalog) implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct CatalogState {
    tables: BTreeMap<String, TableInfo>,
    indexes: BTreeMap<String, IndexInfo>,
}

impl CatalogState {
    pub(super) fn add_table(
        &mut self,
        name: &str,
        schema: Schema,
        first_page_id: PageId,
    ) -> Result<TableInfo> {
        if self.tables.contains_key(name) {
            return Err(StorageError::TableExists(name.to_string()));
        }

        let info = TableInfo {
            name: name.to_string(),
            schema,
            first_page_id,
            indexes: Vec::new(),
        };
        self.tables.insert(name.to_string(), info.clone());
        debug!("catalog: table {} at {}", name, first_page_id);
        Ok(info)
    }

    pub(super) fn table(&self, name: &str) -> Result<TableInfo> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    pub(super) fn set_first_page(&mut self, name: &str, first_page_id: PageId) -> Result<()> {
        let table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))?;
        table.first_page_id = first_page_id;
        Ok(())
    }

    pub(super) fn add_index(
        &mut self,
        name: &str,
        table: &str,
        column: &str,
        root_page_id: PageId,
    ) -> Result<IndexInfo> {
        if self.indexes.contains_key(name) {
            return Err(StorageError::IndexExists(name.to_string()));
        }

        let table_info = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        match table_info.schema.column_by_name(column) {
            Some(col) if col.data_type().is_indexable() => {}
            Some(col) => {
                return Err(StorageError::InvalidConfig(format!(
                    "column {}.{} of type {} cannot be indexed",
                    table,
                    column,
                    col.data_type()
                )))
            }
            None => {
                return Err(StorageError::InvalidConfig(format!(
                    "table {} has no column {}",
                    table, column
                )))
            }
        }
        table_info.indexes.push(name.to_string());

        let info = IndexInfo {
            name: name.to_string(),
            table_name: table.to_string(),
            column: column.to_string(),
            root_page_id,
        };
        self.indexes.insert(name.to_string(), info.clone());
        debug!("catalog: index {} on {}.{} at {}", name, table, column, root_page_id);
        Ok(info)
    }

    pub(super) fn index(&self, name: &str) -> Result<IndexInfo> {
        self.indexes
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::IndexNotFound(name.to_string()))
    }

    pub(super) fn set_index_root(&mut self, name: &str, root_page_id: PageId) -> Result<()> {
        let index = self
            .indexes
            .get_mut(name)
            .ok_or_else(|| StorageError::IndexNotFound(name.to_string()))?;
        index.root_page_id = root_page_id;
        Ok(())
    }

    /// Already sorted: the map is ordered by name.
    pub(super) fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}
