//! RAII page handles.
//!
//! Each guard owns exactly one pin on its page and holds the frame's data
//! latch. Dropping the guard releases the latch first and then the pin, so
//! a frame whose pin count reaches zero is never still latched.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// Called once with the page id and whether the holder modified the page.
pub(crate) type UnpinFn = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

type PageBytes = Box<[u8; PAGE_SIZE]>;

/// The pin half of a guard.
struct Pin {
    page_id: PageId,
    // Keeps the latch's backing storage alive for the `'static` borrow.
    _frame: Arc<FrameHeader>,
    unpin: Option<UnpinFn>,
}

impl Pin {
    fn release(&mut self, is_dirty: bool) {
        if let Some(unpin) = self.unpin.take() {
            unpin(self.page_id, is_dirty);
        }
    }
}

/// Shared access to one pinned page.
pub struct ReadPageGuard {
    pin: Pin,
    latch: Option<RwLockReadGuard<'static, PageBytes>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The returned guard borrows `frame.data` for `'static`; `frame` is
    /// moved into the guard so the lock outlives the borrow.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, unpin: UnpinFn) -> Self {
        let latch = frame.data.read();
        let latch: RwLockReadGuard<'static, PageBytes> = std::mem::transmute(latch);
        Self {
            pin: Pin {
                page_id,
                _frame: frame,
                unpin: Some(unpin),
            },
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => &latch[..],
            None => &[],
        }
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.latch.take();
        self.pin.release(false);
    }
}

/// Exclusive access to one pinned page. Any call to `data_mut` marks the
/// page dirty when the guard is released.
pub struct WritePageGuard {
    pin: Pin,
    latch: Option<RwLockWriteGuard<'static, PageBytes>>,
    is_dirty: bool,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, unpin: UnpinFn) -> Self {
        let latch = frame.data.write();
        let latch: RwLockWriteGuard<'static, PageBytes> = std::mem::transmute(latch);
        Self {
            pin: Pin {
                page_id,
                _frame: frame,
                unpin: Some(unpin),
            },
            latch: Some(latch),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => &latch[..],
            None => &[],
        }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        match &mut self.latch {
            Some(latch) => &mut latch[..],
            None => &mut [],
        }
    }

    /// Forces a write-back on eviction even if `data_mut` was never called.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.latch.take();
        self.pin.release(self.is_dirty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FrameId;
    use parking_lot::Mutex;

    type Released = Arc<Mutex<Option<(PageId, bool)>>>;

    fn recorder() -> (Released, UnpinFn) {
        let released: Released = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&released);
        let unpin: UnpinFn = Box::new(move |page_id, is_dirty| {
            *sink.lock() = Some((page_id, is_dirty));
        });
        (released, unpin)
    }

    #[test]
    fn test_read_guard_releases_clean() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        frame.write_data()[0] = 42;
        let (released, unpin) = recorder();

        let guard = unsafe { ReadPageGuard::new(PageId::new(1), Arc::clone(&frame), unpin) };
        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(guard[0], 42);
        assert!(released.lock().is_none());

        drop(guard);
        assert_eq!(*released.lock(), Some((PageId::new(1), false)));
        // Latch is free again.
        assert!(frame.data.try_write().is_some());
    }

    #[test]
    fn test_write_guard_reports_dirty() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let (released, unpin) = recorder();

        let mut guard = unsafe { WritePageGuard::new(PageId::new(2), Arc::clone(&frame), unpin) };
        assert!(!guard.is_dirty());
        guard.data_mut()[7] = 9;
        drop(guard);

        assert_eq!(*released.lock(), Some((PageId::new(2), true)));
        assert_eq!(frame.read_data()[7], 9);
    }

    #[test]
    fn test_write_guard_untouched_is_clean() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let (released, unpin) = recorder();

        let guard = unsafe { WritePageGuard::new(PageId::new(3), frame, unpin) };
        assert_eq!(guard.data().len(), PAGE_SIZE);
        drop(guard);

        assert_eq!(*released.lock(), Some((PageId::new(3), false)));
    }
}
