use std::sync::Arc;

use log::{debug, warn};

use crate::buffer::BufferPoolManager;
use crate::common::{IndexKey, PageId, RecordId, Result, StorageError};
use crate::storage::page::PageKind;

use super::btree_iterator::BTreeRangeIter;
use super::btree_page::{BTreeNode, BTreeNodeRef, ChildLookup, InternalEntry, LeafEntry};
use super::validate_order;

/// A B+Tree mapping `i64` keys to record ids, stored entirely in buffer
/// pool pages.
///
/// `order` bounds the entries of every node: key/RID pairs in a leaf,
/// children in an internal node. Non-root nodes keep at least
/// `ceil(order / 2)` entries. Duplicate keys are stored as separate leaf
/// entries.
///
/// The root moves on root splits and collapses; callers that persist the
/// root id must re-read [`BTreeIndex::root_page_id`] after every mutation.
pub struct BTreeIndex {
    bpm: Arc<BufferPoolManager>,
    root_page_id: PageId,
    order: usize,
}

impl BTreeIndex {
    /// Creates an empty tree whose root is a fresh leaf page.
    pub fn create(bpm: Arc<BufferPoolManager>, order: usize) -> Result<Self> {
        validate_order(order)?;

        let root_page_id = {
            let mut guard = bpm.new_page()?;
            let page_id = guard.page_id();
            BTreeNode::new(guard.data_mut()).init(page_id, true);
            page_id
        };
        debug!("created B+Tree with root {} (order {})", root_page_id, order);

        Ok(Self {
            bpm,
            root_page_id,
            order,
        })
    }

    /// Opens a tree previously built with the same `order`.
    pub fn open(bpm: Arc<BufferPoolManager>, root_page_id: PageId, order: usize) -> Result<Self> {
        validate_order(order)?;

        let kind = {
            let guard = bpm.fetch_page_read(root_page_id)?;
            BTreeNodeRef::new(guard.data()).kind()
        };
        match kind {
            PageKind::BTreeLeaf | PageKind::BTreeInternal => Ok(Self {
                bpm,
                root_page_id,
                order,
            }),
            other => Err(StorageError::IndexCorrupted(format!(
                "root {} is a {:?} page",
                root_page_id, other
            ))),
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn order(&self) -> usize {
        self.order
    }

    fn min_size(&self) -> usize {
        (self.order + 1) / 2
    }

    fn read_node<R>(&self, page_id: PageId, f: impl FnOnce(BTreeNodeRef<'_>) -> R) -> Result<R> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        Ok(f(BTreeNodeRef::new(guard.data())))
    }

    /// Only for nodes that are about to change: the guard marks the page
    /// dirty.
    fn write_node<R>(
        &self,
        page_id: PageId,
        f: impl FnOnce(&mut BTreeNode<'_>) -> R,
    ) -> Result<R> {
        let mut guard = self.bpm.fetch_page_write(page_id)?;
        let mut node = BTreeNode::new(guard.data_mut());
        Ok(f(&mut node))
    }

    fn set_parent(&self, page_id: PageId, parent: Option<PageId>) -> Result<()> {
        self.write_node(page_id, |node| node.set_parent_page_id(parent))
    }

    /// Descends from the root to the leaf `key` belongs in.
    fn find_leaf(&self, key: IndexKey, mode: ChildLookup) -> Result<PageId> {
        let mut current_page_id = self.root_page_id;
        loop {
            let next = self.read_node(current_page_id, |node| {
                if node.is_leaf() {
                    None
                } else {
                    Some(node.child_at(node.lookup_child(key, mode)))
                }
            })?;

            match next {
                Some(child) => current_page_id = child,
                None => return Ok(current_page_id),
            }
        }
    }

    /// Every RID stored under `key`, in leaf order.
    pub fn search(&self, key: IndexKey) -> Result<Vec<RecordId>> {
        self.range_search(key, key)?
            .map(|entry| entry.map(|(_, rid)| rid))
            .collect()
    }

    /// Lazily yields `(key, rid)` for every key in `[low, high]`, ascending.
    pub fn range_search(&self, low: IndexKey, high: IndexKey) -> Result<BTreeRangeIter> {
        if low > high {
            return Ok(BTreeRangeIter::empty(Arc::clone(&self.bpm)));
        }
        let leaf = self.find_leaf(low, ChildLookup::First)?;
        Ok(BTreeRangeIter::new(Arc::clone(&self.bpm), leaf, low, high))
    }

    /// Collecting form of [`BTreeIndex::range_search`].
    pub fn range_scan(&self, low: IndexKey, high: IndexKey) -> Result<Vec<(IndexKey, RecordId)>> {
        self.range_search(low, high)?.collect()
    }

    /// Adds `(key, rid)`. Every page the resulting splits need is allocated
    /// before any node changes, so a failed allocation leaves the tree as
    /// it was.
    pub fn insert(&mut self, key: IndexKey, rid: RecordId) -> Result<()> {
        let leaf_page_id = self.find_leaf(key, ChildLookup::Last)?;

        let needed = self.pages_needed_for_insert(leaf_page_id)?;
        let mut spare = self.reserve_pages(needed)?;

        let result = self
            .write_node(leaf_page_id, |node| {
                let pos = node.as_ref().upper_bound(key);
                node.insert_leaf_entry(pos, LeafEntry { key, rid });
                node.size() > self.order
            })
            .and_then(|overflow| {
                if overflow {
                    self.split_leaf(leaf_page_id, &mut spare)
                } else {
                    Ok(())
                }
            });

        self.release_pages(spare);
        result
    }

    /// Counts the nodes that split when one entry lands in `leaf_page_id`:
    /// the full nodes on the path upwards, plus a new root if the split
    /// reaches it.
    fn pages_needed_for_insert(&self, leaf_page_id: PageId) -> Result<usize> {
        let mut needed = 0;
        let mut page_id = leaf_page_id;
        loop {
            let (size, parent) =
                self.read_node(page_id, |node| (node.size(), node.parent_page_id()))?;
            if size < self.order {
                return Ok(needed);
            }
            needed += 1;
            match parent {
                Some(parent) => page_id = parent,
                None => return Ok(needed + 1),
            }
        }
    }

    fn reserve_pages(&self, count: usize) -> Result<Vec<PageId>> {
        let mut pages = Vec::with_capacity(count);
        for _ in 0..count {
            match self.bpm.new_page() {
                Ok(guard) => pages.push(guard.page_id()),
                Err(e) => {
                    self.release_pages(pages);
                    return Err(e);
                }
            }
        }
        Ok(pages)
    }

    fn release_pages(&self, pages: Vec<PageId>) {
        for page_id in pages {
            if let Err(e) = self.bpm.delete_page(page_id) {
                warn!("releasing reserved page {}: {}", page_id, e);
            }
        }
    }

    fn split_leaf(&mut self, leaf_page_id: PageId, spare: &mut Vec<PageId>) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(leaf_page_id)?;
        let mut leaf = BTreeNode::new(guard.data_mut());

        let mut entries = leaf.as_ref().leaf_entries();
        let right_entries = entries.split_off(entries.len() / 2);
        let separator = right_entries[0].key;
        let parent = leaf.parent_page_id();
        let old_next = leaf.next_page_id();

        let new_page_id = take_spare(spare)?;
        {
            let mut new_guard = self.bpm.fetch_page_write(new_page_id)?;
            let mut right = BTreeNode::new(new_guard.data_mut());
            right.init(new_page_id, true);
            right.set_leaf_entries(&right_entries);
            right.set_parent_page_id(parent);
            right.set_prev_page_id(Some(leaf_page_id));
            right.set_next_page_id(old_next);
        }

        leaf.set_leaf_entries(&entries);
        leaf.set_next_page_id(Some(new_page_id));
        drop(guard);

        if let Some(next) = old_next {
            self.write_node(next, |node| node.set_prev_page_id(Some(new_page_id)))?;
        }

        debug!(
            "split leaf {} -> {} at key {}",
            leaf_page_id, new_page_id, separator
        );
        self.insert_into_parent(leaf_page_id, separator, new_page_id, parent, spare)
    }

    fn split_internal(&mut self, page_id: PageId, spare: &mut Vec<PageId>) -> Result<()> {
        let (mut entries, parent) =
            self.read_node(page_id, |node| (node.internal_entries(), node.parent_page_id()))?;
        let right_entries = entries.split_off((entries.len() + 1) / 2);
        let separator = right_entries[0].key;

        // The right half is written before the left one is cut down.
        let new_page_id = take_spare(spare)?;
        self.write_node(new_page_id, |right| {
            right.init(new_page_id, false);
            right.set_internal_entries(&right_entries);
            right.set_parent_page_id(parent);
        })?;
        self.write_node(page_id, |node| node.set_internal_entries(&entries))?;

        for entry in &right_entries {
            self.set_parent(entry.child, Some(new_page_id))?;
        }

        debug!(
            "split internal {} -> {} at key {}",
            page_id, new_page_id, separator
        );
        self.insert_into_parent(page_id, separator, new_page_id, parent, spare)
    }

    /// Hooks `right` in after `left` under their parent, growing a new root
    /// when `left` was the root.
    fn insert_into_parent(
        &mut self,
        left: PageId,
        separator: IndexKey,
        right: PageId,
        parent: Option<PageId>,
        spare: &mut Vec<PageId>,
    ) -> Result<()> {
        let parent_page_id = match parent {
            Some(parent_page_id) => parent_page_id,
            None => {
                let new_root = take_spare(spare)?;
                self.write_node(new_root, |root| {
                    root.init(new_root, false);
                    root.set_internal_entries(&[
                        InternalEntry {
                            key: IndexKey::MIN,
                            child: left,
                        },
                        InternalEntry {
                            key: separator,
                            child: right,
                        },
                    ]);
                })?;
                self.set_parent(left, Some(new_root))?;
                self.set_parent(right, Some(new_root))?;
                self.root_page_id = new_root;
                debug!("new root {}", new_root);
                return Ok(());
            }
        };

        let overflow = self.write_node(parent_page_id, |node| {
            let index = node.as_ref().child_index_of(left)?;
            node.insert_internal_entry(
                index + 1,
                InternalEntry {
                    key: separator,
                    child: right,
                },
            );
            Some(node.size() > self.order)
        })?;

        match overflow {
            Some(true) => self.split_internal(parent_page_id, spare),
            Some(false) => Ok(()),
            None => Err(StorageError::IndexCorrupted(format!(
                "{} does not list child {}",
                parent_page_id, left
            ))),
        }
    }

    /// Removes the exact `(key, rid)` pair. Returns `false` if it was absent.
    pub fn delete(&mut self, key: IndexKey, rid: RecordId) -> Result<bool> {
        let mut page_id = self.find_leaf(key, ChildLookup::First)?;

        loop {
            // (position of the pair, next leaf to look in)
            let (found, next) = self.read_node(page_id, |node| {
                for i in node.lower_bound(key)..node.size() {
                    if node.key_at(i) != key {
                        return (None, None);
                    }
                    if node.rid_at(i) == rid {
                        return (Some(i), None);
                    }
                }
                (None, node.next_page_id())
            })?;

            if let Some(index) = found {
                let size = self.write_node(page_id, |node| {
                    node.remove_at(index);
                    node.size()
                })?;
                if page_id != self.root_page_id && size < self.min_size() {
                    self.rebalance(page_id)?;
                }
                return Ok(true);
            }

            match next {
                Some(next) => page_id = next,
                None => return Ok(false),
            }
        }
    }

    /// Restores the occupancy of a non-root node that fell below the minimum.
    fn rebalance(&mut self, page_id: PageId) -> Result<()> {
        let parent_page_id = self
            .read_node(page_id, |node| node.parent_page_id())?
            .ok_or_else(|| {
                StorageError::IndexCorrupted(format!("non-root {} has no parent", page_id))
            })?;

        let siblings = self.read_node(parent_page_id, |parent| {
            parent.child_index_of(page_id).map(|index| {
                let left = (index > 0).then(|| parent.child_at(index - 1));
                let right = (index + 1 < parent.size()).then(|| parent.child_at(index + 1));
                (index, left, right)
            })
        })?;
        let (index, left, right) = siblings.ok_or_else(|| {
            StorageError::IndexCorrupted(format!(
                "{} does not list child {}",
                parent_page_id, page_id
            ))
        })?;

        let min = self.min_size();
        if let Some(left) = left {
            if self.read_node(left, |node| node.size())? > min {
                return self.borrow_from_left(page_id, left, parent_page_id, index);
            }
        }
        if let Some(right) = right {
            if self.read_node(right, |node| node.size())? > min {
                return self.borrow_from_right(page_id, right, parent_page_id, index + 1);
            }
        }

        match (left, right) {
            (Some(left), _) => self.merge(left, page_id, parent_page_id, index),
            (None, Some(right)) => self.merge(page_id, right, parent_page_id, index + 1),
            (None, None) => Err(StorageError::IndexCorrupted(format!(
                "{} has no siblings under {}",
                page_id, parent_page_id
            ))),
        }
    }

    /// Moves the left sibling's last entry to the front of `page_id`.
    fn borrow_from_left(
        &mut self,
        page_id: PageId,
        left: PageId,
        parent_page_id: PageId,
        index: usize,
    ) -> Result<()> {
        let is_leaf = self.read_node(page_id, |node| node.is_leaf())?;

        if is_leaf {
            let moved = self.write_node(left, |node| {
                let last = node.size() - 1;
                let entry = node.as_ref().leaf_entries()[last];
                node.remove_at(last);
                entry
            })?;
            self.write_node(page_id, |node| node.insert_leaf_entry(0, moved))?;
            self.write_node(parent_page_id, |node| node.set_key_at(index, moved.key))?;
        } else {
            let separator = self.read_node(parent_page_id, |node| node.key_at(index))?;
            let moved = self.write_node(left, |node| {
                let last = node.size() - 1;
                let entry = node.as_ref().internal_entries()[last];
                node.remove_at(last);
                entry
            })?;
            self.write_node(page_id, |node| {
                node.set_key_at(0, separator);
                node.insert_internal_entry(
                    0,
                    InternalEntry {
                        key: IndexKey::MIN,
                        child: moved.child,
                    },
                );
            })?;
            self.write_node(parent_page_id, |node| node.set_key_at(index, moved.key))?;
            self.set_parent(moved.child, Some(page_id))?;
        }

        debug!("{} borrowed from left sibling {}", page_id, left);
        Ok(())
    }

    /// Moves the right sibling's first entry to the end of `page_id`.
    fn borrow_from_right(
        &mut self,
        page_id: PageId,
        right: PageId,
        parent_page_id: PageId,
        right_index: usize,
    ) -> Result<()> {
        let is_leaf = self.read_node(page_id, |node| node.is_leaf())?;

        if is_leaf {
            let (moved, new_separator) = self.write_node(right, |node| {
                let entry = node.as_ref().leaf_entries()[0];
                node.remove_at(0);
                (entry, node.as_ref().key_at(0))
            })?;
            self.write_node(page_id, |node| {
                let end = node.size();
                node.insert_leaf_entry(end, moved);
            })?;
            self.write_node(parent_page_id, |node| {
                node.set_key_at(right_index, new_separator)
            })?;
        } else {
            let separator = self.read_node(parent_page_id, |node| node.key_at(right_index))?;
            let (moved_child, new_separator) = self.write_node(right, |node| {
                let view = node.as_ref();
                let child = view.child_at(0);
                let new_separator = view.key_at(1);
                node.remove_at(0);
                (child, new_separator)
            })?;
            self.write_node(page_id, |node| {
                let end = node.size();
                node.insert_internal_entry(
                    end,
                    InternalEntry {
                        key: separator,
                        child: moved_child,
                    },
                );
            })?;
            self.write_node(parent_page_id, |node| {
                node.set_key_at(right_index, new_separator)
            })?;
            self.set_parent(moved_child, Some(page_id))?;
        }

        debug!("{} borrowed from right sibling {}", page_id, right);
        Ok(())
    }

    /// Folds `right` into `left`, drops the separator at `right_index` from
    /// the parent and frees `right`'s page.
    fn merge(
        &mut self,
        left: PageId,
        right: PageId,
        parent_page_id: PageId,
        right_index: usize,
    ) -> Result<()> {
        let is_leaf = self.read_node(right, |node| node.is_leaf())?;

        if is_leaf {
            let (entries, right_next) =
                self.read_node(right, |node| (node.leaf_entries(), node.next_page_id()))?;
            self.write_node(left, |node| {
                let mut merged = node.as_ref().leaf_entries();
                merged.extend(entries);
                node.set_leaf_entries(&merged);
                node.set_next_page_id(right_next);
            })?;
            if let Some(next) = right_next {
                self.write_node(next, |node| node.set_prev_page_id(Some(left)))?;
            }
        } else {
            let separator = self.read_node(parent_page_id, |node| node.key_at(right_index))?;
            let mut entries = self.read_node(right, |node| node.internal_entries())?;
            entries[0].key = separator;

            self.write_node(left, |node| {
                let mut merged = node.as_ref().internal_entries();
                merged.extend(entries.iter().copied());
                node.set_internal_entries(&merged);
            })?;
            for entry in &entries {
                self.set_parent(entry.child, Some(left))?;
            }
        }

        let parent_size = self.write_node(parent_page_id, |node| {
            node.remove_at(right_index);
            node.size()
        })?;
        self.bpm.delete_page(right)?;
        debug!("merged {} into {}", right, left);

        if parent_page_id == self.root_page_id {
            if parent_size == 1 {
                self.collapse_root()?;
            }
        } else if parent_size < self.min_size() {
            self.rebalance(parent_page_id)?;
        }
        Ok(())
    }

    /// Replaces an internal root that has a single child with that child.
    fn collapse_root(&mut self) -> Result<()> {
        let old_root = self.root_page_id;
        let child = self.read_node(old_root, |node| node.child_at(0))?;

        self.set_parent(child, None)?;
        self.root_page_id = child;
        self.bpm.delete_page(old_root)?;
        debug!("root collapsed from {} to {}", old_root, child);
        Ok(())
    }

    /// Number of levels, counting the leaves.
    pub fn height(&self) -> Result<usize> {
        let mut height = 1;
        let mut current_page_id = self.root_page_id;
        while let Some(child) =
            self.read_node(current_page_id, |node| (!node.is_leaf()).then(|| node.child_at(0)))?
        {
            current_page_id = child;
            height += 1;
        }
        Ok(height)
    }

    /// Walks the whole tree and verifies its structural invariants: key
    /// order and separator bounds, node occupancy, parent links, uniform
    /// leaf depth and the leaf chain.
    pub fn check_integrity(&self) -> Result<()> {
        let mut walk = IntegrityWalk {
            leaves: Vec::new(),
            leaf_depth: None,
        };
        self.check_node(self.root_page_id, None, None, None, 1, &mut walk)?;

        let mut expected_prev = None;
        for (i, &leaf) in walk.leaves.iter().enumerate() {
            let (prev, next) =
                self.read_node(leaf, |node| (node.prev_page_id(), node.next_page_id()))?;
            if prev != expected_prev {
                return Err(corrupted(format!("leaf {} has prev {:?}", leaf, prev)));
            }
            let expected_next = walk.leaves.get(i + 1).copied();
            if next != expected_next {
                return Err(corrupted(format!("leaf {} has next {:?}", leaf, next)));
            }
            expected_prev = Some(leaf);
        }
        Ok(())
    }

    fn check_node(
        &self,
        page_id: PageId,
        parent: Option<PageId>,
        low: Option<IndexKey>,
        high: Option<IndexKey>,
        depth: usize,
        walk: &mut IntegrityWalk,
    ) -> Result<()> {
        let is_root = parent.is_none();
        let (actual_parent, is_leaf, keys, children) = self.read_node(page_id, |node| {
            let size = node.size();
            let keys: Vec<IndexKey> = (0..size).map(|i| node.key_at(i)).collect();
            let children: Vec<PageId> = if node.is_leaf() {
                Vec::new()
            } else {
                (0..size).map(|i| node.child_at(i)).collect()
            };
            (node.parent_page_id(), node.is_leaf(), keys, children)
        })?;

        if actual_parent != parent {
            return Err(corrupted(format!(
                "{} points at parent {:?}, expected {:?}",
                page_id, actual_parent, parent
            )));
        }
        if keys.len() > self.order {
            return Err(corrupted(format!("{} holds {} entries", page_id, keys.len())));
        }
        let min = if is_root {
            if is_leaf {
                0
            } else {
                2
            }
        } else {
            self.min_size()
        };
        if keys.len() < min {
            return Err(corrupted(format!(
                "{} holds {} entries, minimum {}",
                page_id,
                keys.len(),
                min
            )));
        }

        // Entry 0 of an internal node carries no key.
        let checked = if is_leaf { &keys[..] } else { &keys[1..] };
        if checked.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(corrupted(format!("{} keys out of order", page_id)));
        }
        let in_bounds = |key: &IndexKey| {
            low.map_or(true, |low| *key >= low) && high.map_or(true, |high| *key <= high)
        };
        if !checked.iter().all(in_bounds) {
            return Err(corrupted(format!("{} has keys outside its range", page_id)));
        }

        if is_leaf {
            match walk.leaf_depth {
                Some(expected) if expected != depth => {
                    return Err(corrupted(format!(
                        "leaf {} at depth {}, expected {}",
                        page_id, depth, expected
                    )));
                }
                _ => walk.leaf_depth = Some(depth),
            }
            walk.leaves.push(page_id);
            return Ok(());
        }

        for (i, &child) in children.iter().enumerate() {
            let child_low = if i == 0 { low } else { Some(keys[i]) };
            let child_high = keys.get(i + 1).copied().or(high);
            self.check_node(child, Some(page_id), child_low, child_high, depth + 1, walk)?;
        }
        Ok(())
    }
}

struct IntegrityWalk {
    leaves: Vec<PageId>,
    leaf_depth: Option<usize>,
}

fn corrupted(message: String) -> StorageError {
    StorageError::IndexCorrupted(message)
}

fn take_spare(spare: &mut Vec<PageId>) -> Result<PageId> {
    spare
        .pop()
        .ok_or_else(|| corrupted("split needs more pages than were reserved".to_string()))
}
