use thiserror::Error;

use super::types::{PageId, SlotId};

/// Storage core error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short read of {page_id}: file holds {file_len} bytes")]
    ShortRead { page_id: PageId, file_len: u64 },

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Disk full: the file is capped at {max_pages} pages")]
    DiskFull { max_pages: u32 },

    #[error("Buffer pool exhausted, every frame is pinned")]
    PoolExhausted,

    #[error("Unpin of {0} with pin count already zero")]
    DoublePin(PageId),

    #[error("Page {0} is not resident in the buffer pool")]
    PageNotResident(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Page is full: record of {needed} bytes, {available} available")]
    PageFull { needed: usize, available: usize },

    #[error("Record of {size} bytes can never fit a page (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Invalid slot ID: {0}")]
    InvalidSlotId(SlotId),

    #[error("Slot {0} is tombstoned")]
    Tombstoned(SlotId),

    #[error("Invalid B+Tree order {0}")]
    InvalidOrder(usize),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Catalog of {size} bytes does not fit its page (max {max})")]
    CatalogTooLarge { size: usize, max: usize },

    #[error("Catalog corrupted: {0}")]
    CatalogCorrupted(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
