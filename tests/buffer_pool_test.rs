//! Integration tests for the buffer pool manager

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pagedb::buffer::BufferPoolManager;
use pagedb::common::{PageId, ReplacerPolicy, StorageConfig, PAGE_SIZE};
use pagedb::storage::disk::DiskManager;
use pagedb::storage::page::{SlottedPage, SlottedPageRef};
use pagedb::{SlotId, StorageError};
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(pool_size, dm);
    (bpm, temp_file)
}

#[test]
fn test_buffer_pool_basic_operations() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = {
        let mut guard = bpm.new_page().unwrap();
        guard.data_mut()[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        guard.page_id()
    };

    let guard = bpm.fetch_page_read(page_id).unwrap();
    assert_eq!(&guard.data()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn test_buffer_pool_exhausted_when_all_pinned() {
    let (bpm, _temp) = create_bpm(2);

    let mut g1 = bpm.new_page().unwrap();
    let mut g2 = bpm.new_page().unwrap();
    let (p1, p2) = (g1.page_id(), g2.page_id());
    g1.data_mut()[0] = 1;
    g2.data_mut()[0] = 2;

    assert!(matches!(bpm.new_page(), Err(StorageError::PoolExhausted)));
    drop(g1);
    drop(g2);

    // With both pins released, p1 is the least recently unpinned.
    let p3 = bpm.new_page().unwrap().page_id();
    assert_eq!(bpm.pin_count(p1), None);
    assert_eq!(bpm.pin_count(p2), Some(0));
    assert_eq!(bpm.pin_count(p3), Some(0));

    // The evicted dirty page reached disk.
    let mut data = [0u8; PAGE_SIZE];
    bpm.disk_manager().read_page(p1, &mut data).unwrap();
    assert_eq!(data[0], 1);
}

#[test]
fn test_buffer_pool_fetch_after_unpinning_one_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let page_c = dm.allocate_page().unwrap();
    let bpm = BufferPoolManager::new(2, Arc::clone(&dm));

    let mut guard_a = bpm.new_page().unwrap();
    let guard_b = bpm.new_page().unwrap();
    let (page_a, page_b) = (guard_a.page_id(), guard_b.page_id());
    guard_a.data_mut()[0] = 0xAA;

    assert!(matches!(
        bpm.fetch_page_read(page_c),
        Err(StorageError::PoolExhausted)
    ));

    drop(guard_a);
    let guard_c = bpm.fetch_page_read(page_c).unwrap();
    assert_eq!(guard_c.page_id(), page_c);
    assert_eq!(bpm.pin_count(page_a), None);
    assert_eq!(bpm.pin_count(page_b), Some(1));

    let mut data = [0u8; PAGE_SIZE];
    dm.read_page(page_a, &mut data).unwrap();
    assert_eq!(data[0], 0xAA);
}

#[test]
fn test_buffer_pool_round_trip_after_eviction() {
    let (bpm, _temp) = create_bpm(3);

    let page_ids: Vec<PageId> = (0..12u8)
        .map(|i| {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[7] = i;
            guard.data_mut()[PAGE_SIZE - 1] = i;
            guard.page_id()
        })
        .collect();

    for (i, &page_id) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[7], i as u8);
        assert_eq!(guard.data()[PAGE_SIZE - 1], i as u8);
    }
}

#[test]
fn test_buffer_pool_pin_prevents_eviction() {
    let (bpm, _temp) = create_bpm(2);

    let pinned = bpm.new_page().unwrap();
    let pinned_id = pinned.page_id();

    // Cycle pages through the single unpinned frame.
    for _ in 0..5 {
        bpm.new_page().unwrap();
    }
    assert_eq!(bpm.pin_count(pinned_id), Some(1));
    drop(pinned);
    assert_eq!(bpm.pin_count(pinned_id), Some(0));
}

#[test]
fn test_buffer_pool_error_path_releases_pin() {
    let (bpm, _temp) = create_bpm(2);
    let page_id = bpm.new_page().unwrap().page_id();

    let failing = |bpm: &BufferPoolManager| -> pagedb::Result<()> {
        let guard = bpm.fetch_page_read(page_id)?;
        let page = SlottedPageRef::new(guard.data());
        page.get_record(SlotId::new(3))?;
        Ok(())
    };

    assert!(failing(&bpm).is_err());
    assert_eq!(bpm.pin_count(page_id), Some(0));
}

#[test]
fn test_buffer_pool_flush_all() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(8, Arc::clone(&dm));

    let page_ids: Vec<PageId> = (0..5u8)
        .map(|i| {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = i + 10;
            guard.page_id()
        })
        .collect();

    bpm.flush_all_pages().unwrap();
    for (i, &page_id) in page_ids.iter().enumerate() {
        assert_eq!(bpm.is_dirty(page_id), Some(false));
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut data).unwrap();
        assert_eq!(data[0], i as u8 + 10);
    }
}

#[test]
fn test_buffer_pool_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_id = {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(4, dm);
        let mut guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();
        let mut page = SlottedPage::new(guard.data_mut());
        page.init(page_id);
        page.insert(b"Persistence test data").unwrap();
        page_id
        // Dropping the pool flushes it.
    };

    let dm = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = BufferPoolManager::new(4, dm);
    let guard = bpm.fetch_page_read(page_id).unwrap();
    let page = SlottedPageRef::new(guard.data());
    assert_eq!(
        page.get_record(SlotId::new(0)).unwrap(),
        b"Persistence test data"
    );
}

#[test]
fn test_buffer_pool_lru_k_policy() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let config = StorageConfig::default()
        .with_pool_size(3)
        .with_replacer(ReplacerPolicy::LruK(2));
    let bpm = BufferPoolManager::from_config(&config, dm).unwrap();

    let ids: Vec<PageId> = (0..3).map(|_| bpm.new_page().unwrap().page_id()).collect();
    // Second accesses for pages 0 and 2 only.
    drop(bpm.fetch_page_read(ids[0]).unwrap());
    drop(bpm.fetch_page_read(ids[2]).unwrap());

    bpm.new_page().unwrap();
    assert_eq!(bpm.pin_count(ids[1]), None);
    assert!(bpm.pin_count(ids[0]).is_some());
    assert!(bpm.pin_count(ids[2]).is_some());
}

#[test]
fn test_buffer_pool_concurrent_access() {
    let (bpm, _temp) = create_bpm(8);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..4).map(|_| bpm.new_page().unwrap().page_id()).collect();

    let handles: Vec<_> = page_ids
        .iter()
        .map(|&page_id| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for _ in 0..100 {
                    let mut guard = bpm.fetch_page_write(page_id).unwrap();
                    let count = u32::from_le_bytes(guard.data()[..4].try_into().unwrap());
                    guard.data_mut()[..4].copy_from_slice(&(count + 1).to_le_bytes());
                }
                for _ in 0..100 {
                    let guard = bpm.fetch_page_read(page_id).unwrap();
                    let _ = guard.data()[0];
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for page_id in page_ids {
        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(u32::from_le_bytes(guard.data()[..4].try_into().unwrap()), 100);
        drop(guard);
        assert_eq!(bpm.pin_count(page_id), Some(0));
    }
}

#[test]
fn test_buffer_pool_invalid_page_id() {
    let (bpm, _temp) = create_bpm(2);
    assert!(matches!(
        bpm.fetch_page_read(pagedb::common::INVALID_PAGE_ID),
        Err(StorageError::InvalidPageId(_))
    ));
    // A page past the end of the file cannot be read in.
    assert!(bpm.fetch_page_read(PageId::new(40)).is_err());
    assert_eq!(bpm.free_frame_count(), 2);
}

#[test]
fn test_flush_all_while_guard_holder_fetches() {
    let (bpm, _temp) = create_bpm(4);
    let bpm = Arc::new(bpm);
    let held = bpm.new_page().unwrap().page_id();
    let other = bpm.new_page().unwrap().page_id();

    let (latched_tx, latched_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    let holder = {
        let bpm = Arc::clone(&bpm);
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            let mut guard = bpm.fetch_page_write(held).unwrap();
            guard.data_mut()[0] = 7;
            latched_tx.send(()).unwrap();
            // Give the flusher time to block on this latch.
            thread::sleep(Duration::from_millis(100));
            drop(bpm.fetch_page_read(other).unwrap());
            drop(guard);
            done_tx.send("holder").unwrap();
        })
    };

    latched_rx.recv().unwrap();
    let flusher = {
        let bpm = Arc::clone(&bpm);
        thread::spawn(move || {
            bpm.flush_all_pages().unwrap();
            done_tx.send("flusher").unwrap();
        })
    };

    let mut finished: Vec<&str> = (0..2)
        .map(|_| done_rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    finished.sort();
    assert_eq!(finished, vec!["flusher", "holder"]);
    holder.join().unwrap();
    flusher.join().unwrap();

    assert_eq!(bpm.pin_count(held), Some(0));
    assert_eq!(bpm.pin_count(other), Some(0));
    bpm.flush_all_pages().unwrap();
    let mut data = [0u8; PAGE_SIZE];
    bpm.disk_manager().read_page(held, &mut data).unwrap();
    assert_eq!(data[0], 7);
}
