use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::common::{
    FrameId, PageId, Result, StorageConfig, StorageError, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::storage::disk::DiskManager;

use super::replacer::{create_replacer, LruReplacer, Replacer};
use super::{FrameHeader, ReadPageGuard, UnpinFn, WritePageGuard};

/// Page-to-frame mapping and the frames not holding any page.
#[derive(Default)]
struct PoolTable {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// State shared with the unpin callbacks of outstanding guards.
struct PoolState {
    frames: Vec<Arc<FrameHeader>>,
    table: Mutex<PoolTable>,
    replacer: Box<dyn Replacer>,
}

impl PoolState {
    fn frame(&self, frame_id: FrameId) -> &Arc<FrameHeader> {
        &self.frames[frame_id.as_usize()]
    }

    fn unpin(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let table = self.table.lock();
        let frame_id = *table
            .page_table
            .get(&page_id)
            .ok_or(StorageError::PageNotResident(page_id))?;
        let frame = self.frame(frame_id);

        let remaining = frame.unpin().ok_or(StorageError::DoublePin(page_id))?;
        if is_dirty {
            frame.mark_dirty();
        }
        if remaining == 0 {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }
}

/// Caches disk pages in a fixed set of in-memory frames.
///
/// Pages are handed out as [`ReadPageGuard`] / [`WritePageGuard`]. Each guard
/// holds one pin; dropping it unpins the page and, for a write guard that
/// touched the bytes, marks the frame dirty. Dirty frames are written back
/// when they are evicted or flushed.
///
/// All page I/O runs synchronously on the calling thread. Misses and
/// evictions do their I/O under the pool's table lock; flushes pin the
/// pages first and write them back without it.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames using LRU replacement.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_replacer(
            pool_size,
            Box::new(LruReplacer::new(pool_size)),
            disk_manager,
        )
    }

    /// Creates a pool with an explicit replacement policy.
    pub fn with_replacer(
        pool_size: usize,
        replacer: Box<dyn Replacer>,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        let frames = (0..pool_size)
            .map(|i| Arc::new(FrameHeader::new(FrameId::new(i as u32))))
            .collect();
        let free_list = (0..pool_size).map(|i| FrameId::new(i as u32)).collect();

        let state = Arc::new(PoolState {
            frames,
            table: Mutex::new(PoolTable {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer,
        });

        Self {
            pool_size,
            state,
            disk_manager,
        }
    }

    /// Creates a pool sized and configured from `config`.
    pub fn from_config(config: &StorageConfig, disk_manager: Arc<DiskManager>) -> Result<Self> {
        config.validate()?;
        let replacer = create_replacer(config.replacer, config.pool_size);
        Ok(Self::with_replacer(config.pool_size, replacer, disk_manager))
    }

    /// Allocates a page on disk and returns it pinned, zeroed and dirty.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let page_id = {
            let mut table = self.state.table.lock();
            let frame_id = self.acquire_frame(&mut table)?;

            let page_id = match self.disk_manager.allocate_page() {
                Ok(page_id) => page_id,
                Err(e) => {
                    table.free_list.push_back(frame_id);
                    return Err(e);
                }
            };

            let frame = self.state.frame(frame_id);
            frame.load(page_id, &[0u8; PAGE_SIZE]);
            frame.mark_dirty();
            table.page_table.insert(page_id, frame_id);
            self.state.replacer.pin(frame_id);

            debug!("new page {} in {}", page_id, frame_id);
            page_id
        };

        self.write_guard(page_id)
    }

    /// Pins `page_id` for shared access, reading it from disk on a miss.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        self.pin_page(page_id)?;
        let frame = self.resident_frame(page_id)?;
        let unpin = self.unpin_callback();
        // SAFETY: the guard owns an Arc of the frame it latches.
        Ok(unsafe { ReadPageGuard::new(page_id, frame, unpin) })
    }

    /// Pins `page_id` for exclusive access, reading it from disk on a miss.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.pin_page(page_id)?;
        self.write_guard(page_id)
    }

    /// Releases one pin taken outside the guard API.
    ///
    /// Fails with `DoublePin` if the page has no outstanding pins.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        self.state.unpin(page_id, is_dirty)
    }

    /// Writes the page to disk if it is resident and dirty. Returns whether
    /// the page was resident. Pins are left alone.
    ///
    /// Takes the page's read latch, so the calling thread must not hold a
    /// write guard on it.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let frame_id = {
            let table = self.state.table.lock();
            match table.page_table.get(&page_id) {
                Some(&frame_id) => {
                    self.pin_resident(frame_id);
                    frame_id
                }
                None => return Ok(false),
            }
        };

        let result = self.write_back(page_id, frame_id);
        self.state.unpin(page_id, false)?;
        result.map(|()| true)
    }

    /// Writes every dirty resident page to disk.
    ///
    /// The dirty frames are pinned under the table lock and written back
    /// after it is released, so a thread holding a guard can keep fetching
    /// pages while the flush waits on that guard's latch.
    pub fn flush_all_pages(&self) -> Result<()> {
        let dirty: Vec<(PageId, FrameId)> = {
            let table = self.state.table.lock();
            table
                .page_table
                .iter()
                .filter(|(_, frame_id)| self.state.frame(**frame_id).is_dirty())
                .map(|(&page_id, &frame_id)| {
                    self.pin_resident(frame_id);
                    (page_id, frame_id)
                })
                .collect()
        };

        let mut first_error = None;
        for (page_id, frame_id) in dirty {
            if let Err(e) = self.write_back(page_id, frame_id) {
                first_error.get_or_insert(e);
            }
            if let Err(e) = self.state.unpin(page_id, false) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Drops the page from the pool and returns its id to the disk manager.
    ///
    /// Fails with `PageStillPinned` if anyone holds a pin on it.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut table = self.state.table.lock();

        if let Some(&frame_id) = table.page_table.get(&page_id) {
            let frame = self.state.frame(frame_id);
            if frame.pin_count() > 0 {
                return Err(StorageError::PageStillPinned(page_id));
            }

            table.page_table.remove(&page_id);
            self.state.replacer.remove(frame_id);
            frame.clear();
            table.free_list.push_back(frame_id);
        }

        self.disk_manager.deallocate_page(page_id)?;
        debug!("deleted page {}", page_id);
        Ok(())
    }

    /// Pin count of a resident page, `None` if the page is not in the pool.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let table = self.state.table.lock();
        table
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frame(frame_id).pin_count())
    }

    /// Dirty flag of a resident page, `None` if the page is not in the pool.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let table = self.state.table.lock();
        table
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frame(frame_id).is_dirty())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.table.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn unpin_callback(&self) -> UnpinFn {
        let state = Arc::clone(&self.state);
        Box::new(move |page_id, is_dirty| {
            if let Err(e) = state.unpin(page_id, is_dirty) {
                warn!("releasing guard on {}: {}", page_id, e);
            }
        })
    }

    fn resident_frame(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        let table = self.state.table.lock();
        table
            .page_table
            .get(&page_id)
            .map(|&frame_id| Arc::clone(self.state.frame(frame_id)))
            .ok_or(StorageError::PageNotResident(page_id))
    }

    /// Builds a write guard for a page the caller has already pinned.
    fn write_guard(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.resident_frame(page_id)?;
        let unpin = self.unpin_callback();
        // SAFETY: the guard owns an Arc of the frame it latches.
        Ok(unsafe { WritePageGuard::new(page_id, frame, unpin) })
    }

    /// Takes one pin on `page_id`, bringing it into the pool if needed.
    fn pin_page(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let mut table = self.state.table.lock();

        if let Some(&frame_id) = table.page_table.get(&page_id) {
            trace!("hit {} in {}", page_id, frame_id);
            self.pin_resident(frame_id);
            return Ok(frame_id);
        }

        trace!("miss {}", page_id);
        let frame_id = self.acquire_frame(&mut table)?;

        let mut bytes = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_manager.read_page(page_id, &mut bytes) {
            table.free_list.push_back(frame_id);
            return Err(e);
        }

        self.state.frame(frame_id).load(page_id, &bytes);
        table.page_table.insert(page_id, frame_id);
        self.state.replacer.pin(frame_id);
        Ok(frame_id)
    }

    /// Caller holds the table lock.
    fn pin_resident(&self, frame_id: FrameId) {
        self.state.frame(frame_id).pin();
        self.state.replacer.pin(frame_id);
    }

    /// Returns an empty frame, evicting the replacer's victim if the free
    /// list is exhausted. A dirty victim is written back first.
    fn acquire_frame(&self, table: &mut PoolTable) -> Result<FrameId> {
        if let Some(frame_id) = table.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .state
            .replacer
            .victim()
            .ok_or(StorageError::PoolExhausted)?;
        let frame = self.state.frame(frame_id);
        let victim_page = frame.page_id();

        if let Err(e) = self.write_back(victim_page, frame_id) {
            // Still resident and unpinned, so it stays a candidate.
            self.state.replacer.unpin(frame_id);
            return Err(e);
        }

        debug!("evicted {} from {}", victim_page, frame_id);
        table.page_table.remove(&victim_page);
        frame.clear();
        Ok(frame_id)
    }

    fn write_back(&self, page_id: PageId, frame_id: FrameId) -> Result<()> {
        let frame = self.state.frame(frame_id);
        if !frame.is_dirty() {
            return Ok(());
        }

        // Cleared under the latch so a writer that follows re-marks it.
        let data = frame.read_data();
        self.disk_manager.write_page(page_id, &data[..])?;
        frame.clear_dirty();
        drop(data);
        debug!("wrote back {}", page_id);
        Ok(())
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            warn!("flushing buffer pool on drop: {}", e);
        }
    }
}
