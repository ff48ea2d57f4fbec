//! pagedb - a file-backed page store
//!
//! The crate is the storage core of a small relational engine. Everything is
//! addressed by page id and record id; names live in a caller-side catalog.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): disk I/O and record layout
//!   - `DiskManager`: reads, writes and allocates fixed-size pages in one file
//!   - `SlottedPage`: variable-length records inside a page
//!   - `TableHeap`: an unordered chain of slotted pages
//!
//! - **Buffer Pool** (`buffer`): in-memory cache of pages
//!   - `BufferPoolManager`: pins pages into frames, evicts with a `Replacer`
//!   - `LruReplacer` / `LruKReplacer`: eviction policies
//!   - `ReadPageGuard` / `WritePageGuard`: RAII handles that hold one pin
//!
//! - **Index** (`index`): B+Tree from `i64` keys to record ids
//!
//! - **Catalog** (`catalog`): table and index names resolved to page ids
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagedb::buffer::BufferPoolManager;
//! use pagedb::index::BTreeIndex;
//! use pagedb::storage::disk::DiskManager;
//! use pagedb::storage::table::TableHeap;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let heap = TableHeap::create(Arc::clone(&bpm)).unwrap();
//! let mut index = BTreeIndex::create(Arc::clone(&bpm), 64).unwrap();
//!
//! let rid = heap.insert(b"Hello, World!").unwrap();
//! index.insert(42, rid).unwrap();
//!
//! assert_eq!(index.search(42).unwrap(), vec![rid]);
//! bpm.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod index;
pub mod storage;

pub use common::{PageId, RecordId, Result, SlotId, StorageError};
