use crate::common::{PageId, Result, SlotId, StorageError, PAGE_SIZE};

use super::header::{self, read_u16, write_u16, PageKind, HEADER_SIZE};

/// Slotted page layout:
///
/// +------------------+
/// | Page Header      |  (HEADER_SIZE bytes)
/// +------------------+
/// | Slot Directory   |  (grows toward the end of the page)
/// | [slot 0]         |
/// | [slot 1]         |
/// | ...              |
/// +------------------+
/// |                  |
/// | Free Space       |
/// |                  |
/// +------------------+
/// | Record Data      |  (grows toward the header)
/// | [record n]       |
/// | ...              |
/// | [record 0]       |
/// +------------------+
///
/// Each slot entry holds the record's byte offset and length (u16 each).
/// An offset of 0 marks a tombstone: no live record can start inside the
/// header, so zero-length records stay representable.
pub const SLOT_SIZE: usize = 4;

/// Largest payload an empty page can take.
pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

const TOMBSTONE_OFFSET: u16 = 0;

/// One entry of the slot directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry {
    /// Offset from start of page to the record bytes
    pub offset: u16,
    /// Length of the record
    pub length: u16,
}

impl SlotEntry {
    pub fn new(offset: u16, length: u16) -> Self {
        Self { offset, length }
    }

    pub fn tombstone() -> Self {
        Self {
            offset: TOMBSTONE_OFFSET,
            length: 0,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.offset == TOMBSTONE_OFFSET
    }
}

fn slot_position(slot_id: SlotId) -> usize {
    HEADER_SIZE + slot_id.as_u16() as usize * SLOT_SIZE
}

/// Read-only view of a slotted page.
#[derive(Clone, Copy)]
pub struct SlottedPageRef<'a> {
    pub(crate) data: &'a [u8],
}

impl<'a> SlottedPageRef<'a> {
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

    /// Number of directory entries, tombstones included.
    pub fn num_slots(&self) -> u16 {
        header::num_slots(self.data)
    }

    /// Next page of the owning table, if any.
    pub fn next_page_id(&self) -> Option<PageId> {
        header::next_page_id(self.data)
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        header::prev_page_id(self.data)
    }

    fn directory_end(&self) -> usize {
        HEADER_SIZE + self.num_slots() as usize * SLOT_SIZE
    }

    fn free_space_end(&self) -> usize {
        header::free_space_end(self.data) as usize
    }

    /// Contiguous bytes between the slot directory and the record area.
    pub fn free_space(&self) -> usize {
        self.free_space_end().saturating_sub(self.directory_end())
    }

    /// Bytes that would be free after a compaction.
    pub fn reclaimable_space(&self) -> usize {
        let live_bytes: usize = self
            .live_slots()
            .filter_map(|slot_id| self.get_slot(slot_id))
            .map(|entry| entry.length as usize)
            .sum();
        PAGE_SIZE - self.directory_end() - live_bytes
    }

    /// Whether a record of `record_size` bytes plus a new slot entry fits
    /// without compaction.
    pub fn can_insert(&self, record_size: usize) -> bool {
        self.free_space() >= record_size + SLOT_SIZE
    }

    pub fn get_slot(&self, slot_id: SlotId) -> Option<SlotEntry> {
        if slot_id.as_u16() >= self.num_slots() {
            return None;
        }
        let pos = slot_position(slot_id);
        Some(SlotEntry::new(
            read_u16(self.data, pos),
            read_u16(self.data, pos + 2),
        ))
    }

    /// Returns the record bytes stored under `slot_id`.
    pub fn get_record(&self, slot_id: SlotId) -> Result<&'a [u8]> {
        let entry = self
            .get_slot(slot_id)
            .ok_or(StorageError::InvalidSlotId(slot_id))?;
        if entry.is_tombstone() {
            return Err(StorageError::Tombstoned(slot_id));
        }

        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        Ok(&self.data[start..end])
    }

    pub fn is_live(&self, slot_id: SlotId) -> bool {
        self.get_slot(slot_id)
            .map(|entry| !entry.is_tombstone())
            .unwrap_or(false)
    }

    /// Slot ids holding live records, in ascending order.
    pub fn live_slots(&self) -> impl Iterator<Item = SlotId> + 'a {
        let page = *self;
        (0..page.num_slots())
            .map(SlotId::new)
            .filter(move |&slot_id| page.is_live(slot_id))
    }

    pub fn record_count(&self) -> usize {
        self.live_slots().count()
    }
}

/// Mutable view of a slotted page holding variable-length records.
pub struct SlottedPage<'a> {
    pub(crate) data: &'a mut [u8],
}

impl<'a> SlottedPage<'a> {
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Formats the buffer as an empty table page.
    pub fn init(&mut self, page_id: PageId) {
        header::init(self.data, page_id, PageKind::Table, PAGE_SIZE as u16);
    }

    pub fn as_ref(&self) -> SlottedPageRef<'_> {
        SlottedPageRef { data: self.data }
    }

    pub fn page_id(&self) -> PageId {
        self.as_ref().page_id()
    }

    pub fn num_slots(&self) -> u16 {
        self.as_ref().num_slots()
    }

    pub fn free_space(&self) -> usize {
        self.as_ref().free_space()
    }

    pub fn reclaimable_space(&self) -> usize {
        self.as_ref().reclaimable_space()
    }

    pub fn can_insert(&self, record_size: usize) -> bool {
        self.as_ref().can_insert(record_size)
    }

    pub fn get_record(&self, slot_id: SlotId) -> Result<&[u8]> {
        self.as_ref().get_record(slot_id)
    }

    pub fn record_count(&self) -> usize {
        self.as_ref().record_count()
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        self.as_ref().next_page_id()
    }

    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        header::set_next_page_id(self.data, page_id);
    }

    pub fn set_prev_page_id(&mut self, page_id: Option<PageId>) {
        header::set_prev_page_id(self.data, page_id);
    }

    fn set_slot(&mut self, slot_id: SlotId, entry: SlotEntry) {
        let pos = slot_position(slot_id);
        write_u16(self.data, pos, entry.offset);
        write_u16(self.data, pos + 2, entry.length);
    }

    /// Copies `record` to the low end of the record area and returns its offset.
    fn place_record(&mut self, record: &[u8]) -> u16 {
        let end = header::free_space_end(self.data) as usize;
        let offset = end - record.len();
        self.data[offset..end].copy_from_slice(record);
        header::set_free_space_end(self.data, offset as u16);
        offset as u16
    }

    /// Appends a new slot for `record`. Tombstoned slots are never reused, so
    /// RIDs handed out earlier keep pointing at nothing rather than at a
    /// different record.
    pub fn insert(&mut self, record: &[u8]) -> Result<SlotId> {
        if !self.can_insert(record.len()) {
            return Err(StorageError::PageFull {
                needed: record.len() + SLOT_SIZE,
                available: self.free_space(),
            });
        }

        let slot_id = SlotId::new(self.num_slots());
        header::set_num_slots(self.data, slot_id.as_u16() + 1);
        let offset = self.place_record(record);
        self.set_slot(slot_id, SlotEntry::new(offset, record.len() as u16));

        Ok(slot_id)
    }

    /// Tombstones the slot. Its bytes stay until the next compaction.
    pub fn delete(&mut self, slot_id: SlotId) -> Result<()> {
        let entry = self
            .as_ref()
            .get_slot(slot_id)
            .ok_or(StorageError::InvalidSlotId(slot_id))?;
        if entry.is_tombstone() {
            return Err(StorageError::Tombstoned(slot_id));
        }

        self.set_slot(slot_id, SlotEntry::tombstone());
        Ok(())
    }

    /// Replaces the record under `slot_id` and returns the slot now holding it.
    ///
    /// A record that fits the old footprint is overwritten in place. A larger
    /// one moves to a fresh slot on this page, compacting first if that is
    /// what makes room. `PageFull` leaves the page untouched.
    pub fn update(&mut self, slot_id: SlotId, record: &[u8]) -> Result<SlotId> {
        let entry = self
            .as_ref()
            .get_slot(slot_id)
            .ok_or(StorageError::InvalidSlotId(slot_id))?;
        if entry.is_tombstone() {
            return Err(StorageError::Tombstoned(slot_id));
        }

        if record.len() <= entry.length as usize {
            let start = entry.offset as usize;
            self.data[start..start + record.len()].copy_from_slice(record);
            self.set_slot(slot_id, SlotEntry::new(entry.offset, record.len() as u16));
            return Ok(slot_id);
        }

        let needed = record.len() + SLOT_SIZE;
        if self.free_space() >= needed {
            self.set_slot(slot_id, SlotEntry::tombstone());
            return self.insert(record);
        }

        // The old copy's bytes become reclaimable once it is tombstoned.
        if self.reclaimable_space() + entry.length as usize >= needed {
            self.set_slot(slot_id, SlotEntry::tombstone());
            self.compact();
            return self.insert(record);
        }

        Err(StorageError::PageFull {
            needed,
            available: self.free_space(),
        })
    }

    /// Packs live records against the end of the page. Slot numbers and
    /// tombstones are preserved.
    pub fn compact(&mut self) {
        let records: Vec<(SlotId, Vec<u8>)> = {
            let page = self.as_ref();
            page.live_slots()
                .filter_map(|slot_id| {
                    page.get_record(slot_id)
                        .ok()
                        .map(|bytes| (slot_id, bytes.to_vec()))
                })
                .collect()
        };

        let directory_end = self.as_ref().directory_end();
        self.data[directory_end..].fill(0);
        header::set_free_space_end(self.data, PAGE_SIZE as u16);

        for (slot_id, record) in records {
            let offset = self.place_record(&record);
            self.set_slot(slot_id, SlotEntry::new(offset, record.len() as u16));
        }
    }
}
