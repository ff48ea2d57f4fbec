use crate::common::{IndexKey, PageId, RecordId, SlotId, PAGE_SIZE};
use crate::storage::page::header::{self, read_u16, read_u32, write_u16, write_u32};
use crate::storage::page::{PageKind, HEADER_SIZE};

/// B+Tree node layout, sharing the common page header:
///
/// +--------------------+
/// | Page Header        |  kind = BTreeLeaf / BTreeInternal,
/// |                    |  num_slots = entry count
/// +--------------------+
/// | entry 0            |
/// | entry 1            |
/// | ...                |
/// +--------------------+
///
/// Leaf entry:     key (i64) | rid page (u32) | rid slot (u16)   = 14 bytes
/// Internal entry: key (i64) | child page (u32)                  = 12 bytes
///
/// An internal node with n entries has n children. The key of entry 0 is
/// unused; the key of entry i (i >= 1) is the separator between child i-1
/// and child i, with every key under child i-1 <= separator <= every key
/// under child i.
const KEY_SIZE: usize = 8;
const LEAF_ENTRY_SIZE: usize = KEY_SIZE + 4 + 2;
const INTERNAL_ENTRY_SIZE: usize = KEY_SIZE + 4;

const ENTRY_AREA: usize = PAGE_SIZE - HEADER_SIZE;

/// Entries a leaf page can physically hold.
pub const LEAF_CAPACITY: usize = ENTRY_AREA / LEAF_ENTRY_SIZE;

/// Entries an internal page can physically hold.
pub const INTERNAL_CAPACITY: usize = ENTRY_AREA / INTERNAL_ENTRY_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: IndexKey,
    pub rid: RecordId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalEntry {
    pub key: IndexKey,
    pub child: PageId,
}

/// How to pick a child when a key equals a separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildLookup {
    /// Leftmost child that may hold the key. Used by searches and deletes.
    First,
    /// Rightmost child that may hold the key. Used by inserts.
    Last,
}

fn entry_size(kind: PageKind) -> usize {
    match kind {
        PageKind::BTreeInternal => INTERNAL_ENTRY_SIZE,
        _ => LEAF_ENTRY_SIZE,
    }
}

fn entry_offset(kind: PageKind, index: usize) -> usize {
    HEADER_SIZE + index * entry_size(kind)
}

fn read_key(data: &[u8], offset: usize) -> IndexKey {
    let bytes: [u8; 8] = data[offset..offset + KEY_SIZE].try_into().unwrap();
    IndexKey::from_le_bytes(bytes)
}

fn write_key(data: &mut [u8], offset: usize, key: IndexKey) {
    data[offset..offset + KEY_SIZE].copy_from_slice(&key.to_le_bytes());
}

/// Read-only view of a B+Tree node page.
#[derive(Clone, Copy)]
pub struct BTreeNodeRef<'a> {
    data: &'a [u8],
}

impl<'a> BTreeNodeRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        header::page_id(self.data)
    }

    pub fn kind(&self) -> PageKind {
        header::page_kind(self.data)
    }

    pub fn is_leaf(&self) -> bool {
        self.kind() == PageKind::BTreeLeaf
    }

    /// Entry count: key/RID pairs in a leaf, children in an internal node.
    pub fn size(&self) -> usize {
        header::num_slots(self.data) as usize
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        header::parent_page_id(self.data)
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        header::next_page_id(self.data)
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        header::prev_page_id(self.data)
    }

    pub fn key_at(&self, index: usize) -> IndexKey {
        read_key(self.data, entry_offset(self.kind(), index))
    }

    pub fn rid_at(&self, index: usize) -> RecordId {
        let offset = entry_offset(PageKind::BTreeLeaf, index) + KEY_SIZE;
        RecordId::new(
            PageId::new(read_u32(self.data, offset)),
            SlotId::new(read_u16(self.data, offset + 4)),
        )
    }

    pub fn child_at(&self, index: usize) -> PageId {
        let offset = entry_offset(PageKind::BTreeInternal, index) + KEY_SIZE;
        PageId::new(read_u32(self.data, offset))
    }

    pub fn leaf_entries(&self) -> Vec<LeafEntry> {
        (0..self.size())
            .map(|i| LeafEntry {
                key: self.key_at(i),
                rid: self.rid_at(i),
            })
            .collect()
    }

    pub fn internal_entries(&self) -> Vec<InternalEntry> {
        (0..self.size())
            .map(|i| InternalEntry {
                key: self.key_at(i),
                child: self.child_at(i),
            })
            .collect()
    }

    /// Leaf: first index whose key is >= `key`.
    pub fn lower_bound(&self, key: IndexKey) -> usize {
        self.partition_point(0, |k| k < key)
    }

    /// Leaf: first index whose key is > `key`.
    pub fn upper_bound(&self, key: IndexKey) -> usize {
        self.partition_point(0, |k| k <= key)
    }

    fn partition_point(&self, start: usize, pred: impl Fn(IndexKey) -> bool) -> usize {
        let mut lo = start;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(self.key_at(mid)) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Internal: index of the child to descend into for `key`.
    pub fn lookup_child(&self, key: IndexKey, mode: ChildLookup) -> usize {
        // Separators live in entries 1.., so the answer is one less than the
        // number of separators that pass the test.
        let point = match mode {
            ChildLookup::First => self.partition_point(1, |k| k < key),
            ChildLookup::Last => self.partition_point(1, |k| k <= key),
        };
        point - 1
    }

    /// Internal: position of `child` among this node's children.
    pub fn child_index_of(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.child_at(i) == child)
    }
}

/// Mutable view of a B+Tree node page.
pub struct BTreeNode<'a> {
    data: &'a mut [u8],
}

impl<'a> BTreeNode<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Formats the page as an empty leaf or internal node with no links.
    pub fn init(&mut self, page_id: PageId, is_leaf: bool) {
        let kind = if is_leaf {
            PageKind::BTreeLeaf
        } else {
            PageKind::BTreeInternal
        };
        header::init(self.data, page_id, kind, PAGE_SIZE as u16);
    }

    pub fn as_ref(&self) -> BTreeNodeRef<'_> {
        BTreeNodeRef { data: self.data }
    }

    pub fn size(&self) -> usize {
        self.as_ref().size()
    }

    pub fn is_leaf(&self) -> bool {
        self.as_ref().is_leaf()
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        self.as_ref().parent_page_id()
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        self.as_ref().next_page_id()
    }

    pub fn set_parent_page_id(&mut self, page_id: Option<PageId>) {
        header::set_parent_page_id(self.data, page_id);
    }

    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        header::set_next_page_id(self.data, page_id);
    }

    pub fn set_prev_page_id(&mut self, page_id: Option<PageId>) {
        header::set_prev_page_id(self.data, page_id);
    }

    fn set_size(&mut self, size: usize) {
        header::set_num_slots(self.data, size as u16);
    }

    pub fn set_key_at(&mut self, index: usize, key: IndexKey) {
        let offset = entry_offset(self.as_ref().kind(), index);
        write_key(self.data, offset, key);
    }

    fn write_leaf_entry(&mut self, index: usize, entry: LeafEntry) {
        let offset = entry_offset(PageKind::BTreeLeaf, index);
        write_key(self.data, offset, entry.key);
        write_u32(self.data, offset + KEY_SIZE, entry.rid.page_id.as_u32());
        write_u16(self.data, offset + KEY_SIZE + 4, entry.rid.slot_id.as_u16());
    }

    fn write_internal_entry(&mut self, index: usize, entry: InternalEntry) {
        let offset = entry_offset(PageKind::BTreeInternal, index);
        write_key(self.data, offset, entry.key);
        write_u32(self.data, offset + KEY_SIZE, entry.child.as_u32());
    }

    /// Replaces every entry of a leaf.
    pub fn set_leaf_entries(&mut self, entries: &[LeafEntry]) {
        assert!(entries.len() <= LEAF_CAPACITY);
        for (i, entry) in entries.iter().enumerate() {
            self.write_leaf_entry(i, *entry);
        }
        self.set_size(entries.len());
    }

    /// Replaces every entry of an internal node.
    pub fn set_internal_entries(&mut self, entries: &[InternalEntry]) {
        assert!(entries.len() <= INTERNAL_CAPACITY);
        for (i, entry) in entries.iter().enumerate() {
            self.write_internal_entry(i, *entry);
        }
        self.set_size(entries.len());
    }

    /// Shifts entries right and writes `entry` at `index` of a leaf.
    pub fn insert_leaf_entry(&mut self, index: usize, entry: LeafEntry) {
        let mut entries = self.as_ref().leaf_entries();
        entries.insert(index, entry);
        self.set_leaf_entries(&entries);
    }

    /// Shifts entries right and writes `entry` at `index` of an internal node.
    pub fn insert_internal_entry(&mut self, index: usize, entry: InternalEntry) {
        let mut entries = self.as_ref().internal_entries();
        entries.insert(index, entry);
        self.set_internal_entries(&entries);
    }

    /// Removes the entry at `index`, closing the gap.
    pub fn remove_at(&mut self, index: usize) {
        let size = self.size();
        assert!(index < size);
        let width = entry_size(self.as_ref().kind());
        let start = entry_offset(self.as_ref().kind(), index);
        let end = entry_offset(self.as_ref().kind(), size);
        self.data.copy_within(start + width..end, start);
        self.data[end - width..end].fill(0);
        self.set_size(size - 1);
    }
}
