//! Integration tests for slotted page storage

use pagedb::common::{PageId, SlotId, PAGE_SIZE};
use pagedb::storage::page::{SlottedPage, SlottedPageRef, HEADER_SIZE, MAX_RECORD_SIZE, SLOT_SIZE};
use pagedb::StorageError;

fn new_page(data: &mut [u8]) -> SlottedPage<'_> {
    let mut page = SlottedPage::new(data);
    page.init(PageId::new(0));
    page
}

#[test]
fn test_slotted_page_variable_length_records() {
    let mut data = [0u8; PAGE_SIZE];
    let mut page = new_page(&mut data);

    let records = [vec![1u8; 10], vec![2u8; 100], vec![3u8; 500], vec![4u8; 1000]];
    let slot_ids: Vec<SlotId> = records.iter().map(|r| page.insert(r).unwrap()).collect();

    for (slot_id, record) in slot_ids.iter().zip(&records) {
        assert_eq!(page.get_record(*slot_id).unwrap(), record.as_slice());
    }

    let used: usize = records.iter().map(|r| r.len() + SLOT_SIZE).sum();
    assert_eq!(page.free_space(), PAGE_SIZE - HEADER_SIZE - used);
}

#[test]
fn test_slotted_page_fragmentation_and_compact() {
    let mut data = [0u8; PAGE_SIZE];
    let mut page = new_page(&mut data);

    let slot1 = page.insert(&[1u8; 100]).unwrap();
    let slot2 = page.insert(&[2u8; 100]).unwrap();
    let slot3 = page.insert(&[3u8; 100]).unwrap();
    let initial_free = page.free_space();

    page.delete(slot2).unwrap();
    assert_eq!(page.free_space(), initial_free);
    assert_eq!(page.reclaimable_space(), initial_free + 100);

    page.compact();
    assert_eq!(page.free_space(), initial_free + 100);
    assert_eq!(page.reclaimable_space(), page.free_space());

    // Survivors keep their slot numbers.
    assert_eq!(page.get_record(slot1).unwrap(), &[1u8; 100]);
    assert_eq!(page.get_record(slot3).unwrap(), &[3u8; 100]);
    assert!(matches!(
        page.get_record(slot2),
        Err(StorageError::Tombstoned(_))
    ));
}

#[test]
fn test_slotted_page_fills_up() {
    let mut data = [0u8; PAGE_SIZE];
    let mut page = new_page(&mut data);

    let mut count = 0;
    loop {
        match page.insert(&[0xABu8; 96]) {
            Ok(_) => count += 1,
            Err(StorageError::PageFull { .. }) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(count, (PAGE_SIZE - HEADER_SIZE) / (96 + SLOT_SIZE));
    assert!(!page.can_insert(96));
    assert_eq!(page.record_count(), count);
}

#[test]
fn test_slotted_page_largest_record() {
    let mut data = [0u8; PAGE_SIZE];
    let mut page = new_page(&mut data);

    let slot = page.insert(&vec![7u8; MAX_RECORD_SIZE]).unwrap();
    assert_eq!(page.free_space(), 0);
    assert_eq!(page.get_record(slot).unwrap().len(), MAX_RECORD_SIZE);
    assert!(matches!(page.insert(b""), Err(StorageError::PageFull { .. })));
}

#[test]
fn test_slotted_page_update_paths() {
    let mut data = [0u8; PAGE_SIZE];
    let mut page = new_page(&mut data);

    let slot = page.insert(b"medium sized").unwrap();

    // Shrinking stays in place.
    assert_eq!(page.update(slot, b"small").unwrap(), slot);
    assert_eq!(page.get_record(slot).unwrap(), b"small");

    // Growing moves to a new slot on the same page.
    let moved = page.update(slot, &[9u8; 200]).unwrap();
    assert_ne!(moved, slot);
    assert_eq!(page.get_record(moved).unwrap(), &[9u8; 200]);
    assert!(matches!(page.get_record(slot), Err(StorageError::Tombstoned(_))));
}

#[test]
fn test_slotted_page_update_too_large_leaves_page_untouched() {
    let mut data = [0u8; PAGE_SIZE];
    let mut page = new_page(&mut data);

    let a = page.insert(&[1u8; 2000]).unwrap();
    let b = page.insert(&[2u8; 2000]).unwrap();

    assert!(matches!(
        page.update(a, &[3u8; 2100]),
        Err(StorageError::PageFull { .. })
    ));
    assert_eq!(page.get_record(a).unwrap(), &[1u8; 2000][..]);
    assert_eq!(page.get_record(b).unwrap(), &[2u8; 2000][..]);
}

#[test]
fn test_slotted_page_update_compacts_when_needed() {
    let mut data = [0u8; PAGE_SIZE];
    let mut page = new_page(&mut data);

    let a = page.insert(&[1u8; 1500]).unwrap();
    let b = page.insert(&[2u8; 1500]).unwrap();
    let c = page.insert(&[3u8; 900]).unwrap();
    page.delete(a).unwrap();

    // Only fits once a's bytes and c's old copy are reclaimed.
    let moved = page.update(c, &[4u8; 2000]).unwrap();
    assert_eq!(page.get_record(moved).unwrap(), &[4u8; 2000][..]);
    assert_eq!(page.get_record(b).unwrap(), &[2u8; 1500][..]);
    assert_eq!(page.record_count(), 2);
}

#[test]
fn test_slotted_page_links_and_live_slots() {
    let mut data = [0u8; PAGE_SIZE];
    let mut page = new_page(&mut data);

    page.set_next_page_id(Some(PageId::new(4)));
    page.set_prev_page_id(Some(PageId::new(2)));
    for i in 0..5u8 {
        page.insert(&[i; 4]).unwrap();
    }
    page.delete(SlotId::new(1)).unwrap();
    page.delete(SlotId::new(3)).unwrap();

    let view = SlottedPageRef::new(&data);
    assert_eq!(view.next_page_id(), Some(PageId::new(4)));
    assert_eq!(view.prev_page_id(), Some(PageId::new(2)));
    let live: Vec<SlotId> = view.live_slots().collect();
    assert_eq!(live, vec![SlotId::new(0), SlotId::new(2), SlotId::new(4)]);
}
