use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, SlotId};
use crate::storage::page::SlottedPageRef;

/// Lazy scan over a table heap.
///
/// The cursor is just `(page, next slot)`; each call to `next` pins the
/// current page only long enough to copy one record out. Records added or
/// removed during the scan may or may not be seen. After an error the
/// iterator is exhausted.
pub struct TableIterator {
    bpm: Arc<BufferPoolManager>,
    current_page_id: Option<PageId>,
    next_slot: u16,
}

impl TableIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, first_page_id: PageId) -> Self {
        Self {
            bpm,
            current_page_id: Some(first_page_id),
            next_slot: 0,
        }
    }

    fn advance(&mut self, page_id: PageId) -> Result<Option<(RecordId, Vec<u8>)>> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        let page = SlottedPageRef::new(guard.data());

        let num_slots = page.num_slots();
        while self.next_slot < num_slots {
            let slot_id = SlotId::new(self.next_slot);
            self.next_slot += 1;
            if let Ok(bytes) = page.get_record(slot_id) {
                return Ok(Some((RecordId::new(page_id, slot_id), bytes.to_vec())));
            }
        }

        self.current_page_id = page.next_page_id();
        self.next_slot = 0;
        Ok(None)
    }
}

impl Iterator for TableIterator {
    type Item = Result<(RecordId, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(page_id) = self.current_page_id {
            match self.advance(page_id) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => {
                    self.current_page_id = None;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use crate::storage::table::TableHeap;
    use tempfile::NamedTempFile;

    fn create_heap() -> (TableHeap, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(4, dm));
        (TableHeap::create(bpm).unwrap(), temp_file)
    }

    #[test]
    fn test_empty_heap_yields_nothing() {
        let (heap, _temp) = create_heap();
        assert_eq!(heap.iter().count(), 0);
    }

    #[test]
    fn test_iterator_skips_tombstones() {
        let (heap, _temp) = create_heap();
        let rids: Vec<_> = (0..5u8).map(|i| heap.insert(&[i; 8]).unwrap()).collect();
        heap.delete(rids[1]).unwrap();
        heap.delete(rids[3]).unwrap();

        let seen: Vec<RecordId> = heap.iter().map(|r| r.unwrap().0).collect();
        assert_eq!(seen, vec![rids[0], rids[2], rids[4]]);
    }

    #[test]
    fn test_iterator_is_restartable() {
        let (heap, _temp) = create_heap();
        heap.insert(b"one").unwrap();
        heap.insert(b"two").unwrap();

        let first: Vec<_> = heap.iter().map(|r| r.unwrap().1).collect();
        let second: Vec<_> = heap.iter().map(|r| r.unwrap().1).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![b"one".to_vec(), b"two".to_vec()]);
    }
}
