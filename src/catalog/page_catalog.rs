use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, Result, StorageError, PAGE_SIZE};
use crate::storage::page::header::{self, HEADER_SIZE};
use crate::storage::page::PageKind;

use super::catalog_state::CatalogState;
use super::{Catalog, IndexInfo, Schema, TableInfo};

/// The catalog always occupies the first page of the database file.
pub const CATALOG_PAGE_ID: PageId = PageId(0);

const PAYLOAD_LEN_OFFSET: usize = HEADER_SIZE;
const PAYLOAD_OFFSET: usize = PAYLOAD_LEN_OFFSET + 4;
const MAX_PAYLOAD: usize = PAGE_SIZE - PAYLOAD_OFFSET;

/// A [`Catalog`] persisted on [`CATALOG_PAGE_ID`] through the buffer pool.
///
/// Every mutation is applied to a copy of the in-memory state, encoded with
/// bincode and written to the catalog page; the copy replaces the live
/// state only once the page write succeeds. The page reaches disk on the
/// pool's next flush or eviction.
pub struct PageCatalog {
    bpm: Arc<BufferPoolManager>,
    state: RwLock<CatalogState>,
}

impl PageCatalog {
    /// Formats an empty catalog. The database file must not hold any pages
    /// yet, so the catalog lands on [`CATALOG_PAGE_ID`].
    pub fn create(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let num_pages = bpm.disk_manager().get_num_pages();
        if num_pages != 0 {
            return Err(StorageError::InvalidConfig(format!(
                "catalog needs an empty file, found {} pages",
                num_pages
            )));
        }

        let page_id = bpm.new_page()?.page_id();
        if page_id != CATALOG_PAGE_ID {
            return Err(StorageError::CatalogCorrupted(format!(
                "catalog allocated at {}",
                page_id
            )));
        }

        let catalog = Self {
            bpm,
            state: RwLock::new(CatalogState::default()),
        };
        catalog.persist(&CatalogState::default())?;
        debug!("created catalog on {}", CATALOG_PAGE_ID);
        Ok(catalog)
    }

    /// Loads the catalog written by an earlier [`PageCatalog`].
    pub fn open(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let state = {
            let guard = bpm.fetch_page_read(CATALOG_PAGE_ID)?;
            decode(guard.data())?
        };
        info!(
            "loaded catalog with {} tables",
            state.table_names().len()
        );

        Ok(Self {
            bpm,
            state: RwLock::new(state),
        })
    }

    /// Opens the catalog of an existing file or formats a new one.
    pub fn open_or_create(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        if bpm.disk_manager().get_num_pages() == 0 {
            Self::create(bpm)
        } else {
            Self::open(bpm)
        }
    }

    fn persist(&self, state: &CatalogState) -> Result<()> {
        let payload = bincode::serialize(state)
            .map_err(|e| StorageError::CatalogCorrupted(e.to_string()))?;
        if payload.len() > MAX_PAYLOAD {
            return Err(StorageError::CatalogTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let mut guard = self.bpm.fetch_page_write(CATALOG_PAGE_ID)?;
        let data = guard.data_mut();
        header::init(data, CATALOG_PAGE_ID, PageKind::Catalog, PAGE_SIZE as u16);
        header::write_u32(data, PAYLOAD_LEN_OFFSET, payload.len() as u32);
        data[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(&payload);
        Ok(())
    }

    /// Runs `f` on a copy of the state and keeps the copy once it is on the
    /// catalog page.
    fn update<R>(&self, f: impl FnOnce(&mut CatalogState) -> Result<R>) -> Result<R> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(out)
    }
}

fn decode(data: &[u8]) -> Result<CatalogState> {
    let kind = header::page_kind(data);
    if kind != PageKind::Catalog {
        return Err(StorageError::CatalogCorrupted(format!(
            "{} is a {:?} page",
            CATALOG_PAGE_ID, kind
        )));
    }

    let len = header::read_u32(data, PAYLOAD_LEN_OFFSET) as usize;
    if len > MAX_PAYLOAD {
        return Err(StorageError::CatalogCorrupted(format!(
            "payload length {} exceeds the page",
            len
        )));
    }
    bincode::deserialize(&data[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len])
        .map_err(|e| StorageError::CatalogCorrupted(e.to_string()))
}

impl Catalog for PageCatalog {
    fn create_table(
        &self,
        name: &str,
        schema: Schema,
        first_page_id: PageId,
    ) -> Result<TableInfo> {
        self.update(|state| state.add_table(name, schema, first_page_id))
    }

    fn table(&self, name: &str) -> Result<TableInfo> {
        self.state.read().table(name)
    }

    fn set_first_page(&self, name: &str, first_page_id: PageId) -> Result<()> {
        self.update(|state| state.set_first_page(name, first_page_id))
    }

    fn create_index(
        &self,
        name: &str,
        table: &str,
        column: &str,
        root_page_id: PageId,
    ) -> Result<IndexInfo> {
        self.update(|state| state.add_index(name, table, column, root_page_id))
    }

    fn index(&self, name: &str) -> Result<IndexInfo> {
        self.state.read().index(name)
    }

    fn set_index_root(&self, name: &str, root_page_id: PageId) -> Result<()> {
        self.update(|state| state.set_index_root(name, root_page_id))
    }

    fn list_tables(&self) -> Vec<String> {
        self.state.read().table_names()
    }
}
