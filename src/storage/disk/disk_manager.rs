use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::common::{PageId, Result, StorageError, INVALID_PAGE_ID, PAGE_SIZE};

/// DiskManager is responsible for reading and writing pages to/from disk.
/// It manages a single database file where page `i` occupies bytes
/// `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`.
///
/// Every allocated page is backed by real bytes in the file: allocation
/// extends the file with a zeroed page, so a page that was never written
/// reads back as zeros. Deallocated ids go on a free list and are handed
/// out again before the file grows. The free list lives in memory only.
pub struct DiskManager {
    /// The database file
    db_file: Mutex<File>,
    /// Path to the database file
    db_path: PathBuf,
    /// Number of pages the file holds (highest allocated id + 1)
    num_pages: AtomicU32,
    /// Deallocated page ids available for reuse
    free_list: Mutex<Vec<PageId>>,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
    /// Upper bound on the file size in pages, if any
    max_pages: Option<u32>,
}

impl DiskManager {
    /// Creates a new DiskManager for the given database file path.
    /// Creates the file if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        debug!(
            "opened {} ({} bytes, {} pages)",
            db_path.as_ref().display(),
            file_size,
            num_pages
        );

        Ok(Self {
            db_file: Mutex::new(file),
            db_path: db_path.as_ref().to_path_buf(),
            num_pages: AtomicU32::new(num_pages),
            free_list: Mutex::new(Vec::new()),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            max_pages: None,
        })
    }

    /// Caps the file at `max_pages` pages. Once the file is that long,
    /// allocation only succeeds by reusing freed ids and otherwise fails
    /// with `DiskFull`.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Reads a page from disk into the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes.
    ///
    /// Fails with `ShortRead` if the file does not cover the whole page.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        if page_id == INVALID_PAGE_ID {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let offset = page_id.file_offset(PAGE_SIZE);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        if let Err(e) = file.read_exact(data) {
            if e.kind() == ErrorKind::UnexpectedEof {
                let file_len = file.metadata()?.len();
                return Err(StorageError::ShortRead { page_id, file_len });
            }
            return Err(e.into());
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        if page_id == INVALID_PAGE_ID {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let offset = page_id.file_offset(PAGE_SIZE);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a page and returns its page ID.
    /// Freed ids are reused first; otherwise the file grows by one page.
    /// Either way the page is zero-filled on disk before this returns.
    pub fn allocate_page(&self) -> Result<PageId> {
        let reused = self.free_list.lock().pop();

        let page_id = match reused {
            Some(page_id) => page_id,
            None => self.grow()?,
        };

        let zeros = [0u8; PAGE_SIZE];
        if let Err(e) = self.write_page(page_id, &zeros) {
            // Hand the id back so it is not lost.
            self.free_list.lock().push(page_id);
            return Err(e);
        }

        debug!(
            "allocated {}{}",
            page_id,
            if reused.is_some() { " (reused)" } else { "" }
        );
        Ok(page_id)
    }

    /// Claims the next id past the end of the file.
    fn grow(&self) -> Result<PageId> {
        let max_pages = self.max_pages.unwrap_or(INVALID_PAGE_ID.as_u32());
        self.num_pages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max_pages).then_some(n + 1)
            })
            .map(PageId::new)
            .map_err(|_| StorageError::DiskFull { max_pages })
    }

    /// Marks a page id free for reuse. The file is never truncated.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        if page_id == INVALID_PAGE_ID || page_id.as_u32() >= self.get_num_pages() {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let mut free_list = self.free_list.lock();
        if !free_list.contains(&page_id) {
            free_list.push(page_id);
            debug!("deallocated {}", page_id);
        }
        Ok(())
    }

    /// Returns the number of pages the file currently holds.
    pub fn get_num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    /// Returns the number of page ids waiting on the free list.
    pub fn get_num_free_pages(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of disk reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Flushes any buffered writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.db_file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.db_file.get_mut();
        let _ = file.sync_all();
    }
}
