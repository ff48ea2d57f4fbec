use std::collections::VecDeque;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{IndexKey, PageId, RecordId, Result};

use super::btree_page::BTreeNodeRef;

/// Ascending walk over the leaf chain for keys in `[low, high]`.
///
/// Matching entries of one leaf are copied out per page visit, so no pin
/// is held between calls to `next`. After an error the iterator is
/// exhausted.
pub struct BTreeRangeIter {
    bpm: Arc<BufferPoolManager>,
    next_leaf: Option<PageId>,
    buffered: VecDeque<(IndexKey, RecordId)>,
    low: IndexKey,
    high: IndexKey,
}

impl BTreeRangeIter {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        start_leaf: PageId,
        low: IndexKey,
        high: IndexKey,
    ) -> Self {
        Self {
            bpm,
            next_leaf: Some(start_leaf),
            buffered: VecDeque::new(),
            low,
            high,
        }
    }

    pub(crate) fn empty(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            next_leaf: None,
            buffered: VecDeque::new(),
            low: 0,
            high: 0,
        }
    }

    fn load_leaf(&mut self, page_id: PageId) -> Result<()> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        let node = BTreeNodeRef::new(guard.data());

        self.next_leaf = node.next_page_id();
        for i in node.lower_bound(self.low)..node.size() {
            let key = node.key_at(i);
            if key > self.high {
                self.next_leaf = None;
                break;
            }
            self.buffered.push_back((key, node.rid_at(i)));
        }
        Ok(())
    }
}

impl Iterator for BTreeRangeIter {
    type Item = Result<(IndexKey, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffered.pop_front() {
                return Some(Ok(entry));
            }

            let page_id = self.next_leaf?;
            if let Err(e) = self.load_leaf(page_id) {
                self.next_leaf = None;
                return Some(Err(e));
            }
        }
    }
}
