use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// One buffer frame: the cached page bytes plus the bookkeeping the pool
/// needs to decide when the frame may be reused.
///
/// `page_id`, `pin_count` and `is_dirty` are only changed while the pool's
/// table lock is held. The data latch is separate so a guard can hold it
/// without blocking the rest of the pool.
pub struct FrameHeader {
    frame_id: FrameId,
    /// Resident page, INVALID_PAGE_ID when the frame is free
    page_id: AtomicU32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(INVALID_PAGE_ID.as_u32()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value, or `None` if it
    /// was already zero.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    pub fn read_data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    pub fn write_data(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Binds the frame to `page_id` with the given bytes, one pin and a
    /// clean dirty flag.
    pub(crate) fn load(&self, page_id: PageId, bytes: &[u8]) {
        assert_eq!(bytes.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(bytes);
        self.page_id.store(page_id.as_u32(), Ordering::Release);
        self.pin_count.store(1, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }

    /// Returns the frame to the free state with zeroed bytes.
    pub(crate) fn clear(&self) {
        self.page_id
            .store(INVALID_PAGE_ID.as_u32(), Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_header_starts_free() {
        let frame = FrameHeader::new(FrameId::new(3));
        assert_eq!(frame.frame_id(), FrameId::new(3));
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_frame_header_unpin_stops_at_zero() {
        let frame = FrameHeader::new(FrameId::new(0));
        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), Some(1));
        assert_eq!(frame.unpin(), Some(0));
        assert_eq!(frame.unpin(), None);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_frame_header_load_and_clear() {
        let frame = FrameHeader::new(FrameId::new(0));
        let mut bytes = [0u8; PAGE_SIZE];
        bytes[10] = 42;

        frame.load(PageId::new(9), &bytes);
        frame.mark_dirty();
        assert_eq!(frame.page_id(), PageId::new(9));
        assert_eq!(frame.pin_count(), 1);
        assert!(frame.is_dirty());
        assert_eq!(frame.read_data()[10], 42);

        frame.clear();
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert_eq!(frame.read_data()[10], 0);
    }
}
