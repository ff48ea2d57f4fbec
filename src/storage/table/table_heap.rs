use std::sync::Arc;

use log::debug;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, StorageError};
use crate::storage::page::{PageKind, SlottedPage, SlottedPageRef, MAX_RECORD_SIZE, SLOT_SIZE};

use super::TableIterator;

/// An unordered collection of variable-length records stored in a chain of
/// slotted pages, starting at `first_page_id` and linked by `next_page_id`.
///
/// Every page access goes through the buffer pool; no pin is held between
/// calls.
pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Allocates and formats the first page of a new heap.
    pub fn create(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let first_page_id = {
            let mut guard = bpm.new_page()?;
            let page_id = guard.page_id();
            SlottedPage::new(guard.data_mut()).init(page_id);
            page_id
        };
        debug!("created table heap at {}", first_page_id);

        Ok(Self { bpm, first_page_id })
    }

    /// Opens an existing heap whose chain starts at `first_page_id`.
    pub fn open(bpm: Arc<BufferPoolManager>, first_page_id: PageId) -> Self {
        Self { bpm, first_page_id }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Stores `record` in the first page with room for it, extending the
    /// chain with a new page if none has.
    pub fn insert(&self, record: &[u8]) -> Result<RecordId> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(StorageError::RecordTooLarge {
                size: record.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let mut page_id = self.first_page_id;
        loop {
            let mut guard = self.bpm.fetch_page_write(page_id)?;

            let next_page_id = SlottedPageRef::new(guard.data()).next_page_id();
            if Self::has_room(guard.data(), record.len()) {
                let mut page = SlottedPage::new(guard.data_mut());
                if !page.can_insert(record.len()) {
                    page.compact();
                }
                let slot_id = page.insert(record)?;
                return Ok(RecordId::new(page_id, slot_id));
            }

            match next_page_id {
                Some(next) => {
                    drop(guard);
                    page_id = next;
                }
                None => {
                    // Hold the tail's latch while linking so no one else
                    // appends a second successor.
                    let mut new_guard = self.bpm.new_page()?;
                    let new_page_id = new_guard.page_id();

                    let mut new_page = SlottedPage::new(new_guard.data_mut());
                    new_page.init(new_page_id);
                    new_page.set_prev_page_id(Some(page_id));
                    let slot_id = new_page.insert(record)?;

                    SlottedPage::new(guard.data_mut()).set_next_page_id(Some(new_page_id));
                    debug!("table heap {} grew: {} -> {}", self.first_page_id, page_id, new_page_id);

                    return Ok(RecordId::new(new_page_id, slot_id));
                }
            }
        }
    }

    /// Whether the page can take `record_size` bytes, counting space a
    /// compaction would recover.
    fn has_room(data: &[u8], record_size: usize) -> bool {
        let page = SlottedPageRef::new(data);
        page.can_insert(record_size) || page.reclaimable_space() >= record_size + SLOT_SIZE
    }

    /// Returns a copy of the record, or `None` if `rid` is tombstoned or
    /// does not name a slot.
    pub fn get(&self, rid: RecordId) -> Result<Option<Vec<u8>>> {
        let guard = self.bpm.fetch_page_read(rid.page_id)?;
        let page = SlottedPageRef::new(guard.data());
        if page.kind() != PageKind::Table {
            return Ok(None);
        }

        match page.get_record(rid.slot_id) {
            Ok(bytes) => Ok(Some(bytes.to_vec())),
            Err(StorageError::InvalidSlotId(_)) | Err(StorageError::Tombstoned(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Tombstones the record. Returns `false` if it was already absent.
    pub fn delete(&self, rid: RecordId) -> Result<bool> {
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        if SlottedPageRef::new(guard.data()).kind() != PageKind::Table {
            return Ok(false);
        }

        match SlottedPage::new(guard.data_mut()).delete(rid.slot_id) {
            Ok(()) => Ok(true),
            Err(StorageError::InvalidSlotId(_)) | Err(StorageError::Tombstoned(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Replaces the record and returns where it now lives, or `None` if
    /// `rid` was absent.
    ///
    /// The returned RID differs from `rid` when the new bytes no longer fit
    /// the old slot. Index entries pointing at the old RID are the caller's
    /// to fix.
    pub fn update(&self, rid: RecordId, record: &[u8]) -> Result<Option<RecordId>> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(StorageError::RecordTooLarge {
                size: record.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        {
            let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
            if SlottedPageRef::new(guard.data()).kind() != PageKind::Table {
                return Ok(None);
            }

            match SlottedPage::new(guard.data_mut()).update(rid.slot_id, record) {
                Ok(slot_id) => return Ok(Some(RecordId::new(rid.page_id, slot_id))),
                Err(StorageError::InvalidSlotId(_)) | Err(StorageError::Tombstoned(_)) => {
                    return Ok(None)
                }
                Err(StorageError::PageFull { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        // The page cannot hold the new version. Write it elsewhere before
        // dropping the old one so a failed insert loses nothing.
        let new_rid = self.insert(record)?;
        self.delete(rid)?;
        debug!("record {} moved to {}", rid, new_rid);
        Ok(Some(new_rid))
    }

    /// Live records in page-chain then slot order.
    pub fn iter(&self) -> TableIterator {
        TableIterator::new(Arc::clone(&self.bpm), self.first_page_id)
    }

    /// Ids of every page in the chain, first to last.
    pub fn page_ids(&self) -> Result<Vec<PageId>> {
        let mut page_ids = Vec::new();
        let mut current = Some(self.first_page_id);
        while let Some(page_id) = current {
            let guard = self.bpm.fetch_page_read(page_id)?;
            page_ids.push(page_id);
            current = SlottedPageRef::new(guard.data()).next_page_id();
        }
        Ok(page_ids)
    }

    /// Number of live records across the chain.
    pub fn record_count(&self) -> Result<usize> {
        let mut count = 0;
        for page_id in self.page_ids()? {
            let guard = self.bpm.fetch_page_read(page_id)?;
            count += SlottedPageRef::new(guard.data()).record_count();
        }
        Ok(count)
    }
}
