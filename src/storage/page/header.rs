//! Header shared by every formatted page.
//!
//! | Field            | Offset | Size |
//! |------------------|--------|------|
//! | page_id          | 0      | 4    |
//! | page_kind        | 4      | 1    |
//! | reserved         | 5      | 1    |
//! | num_slots        | 6      | 2    |
//! | free_space_end   | 8      | 2    |
//! | reserved         | 10     | 2    |
//! | next_page_id     | 12     | 4    |
//! | prev_page_id     | 16     | 4    |
//! | parent_page_id   | 20     | 4    |
//!
//! Heap pages use `num_slots` as the directory length and `next_page_id` as
//! the table chain link. B+Tree nodes use `num_slots` as their entry count,
//! `prev/next` as the leaf chain and `parent_page_id` for the parent node.
//! The catalog page keeps its payload length right after the header and
//! leaves the other fields unused.

use crate::common::{PageId, INVALID_PAGE_ID};

pub const HEADER_SIZE: usize = 24;

const PAGE_ID_OFFSET: usize = 0;
const PAGE_KIND_OFFSET: usize = 4;
const NUM_SLOTS_OFFSET: usize = 6;
const FREE_SPACE_END_OFFSET: usize = 8;
const NEXT_PAGE_ID_OFFSET: usize = 12;
const PREV_PAGE_ID_OFFSET: usize = 16;
const PARENT_PAGE_ID_OFFSET: usize = 20;

/// Tag stored in the header byte that says how the rest of the page is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Zeroed page that has not been formatted yet
    Free,
    /// Slotted page belonging to a table heap
    Table,
    /// B+Tree leaf node
    BTreeLeaf,
    /// B+Tree internal node
    BTreeInternal,
    /// Serialized table and index metadata
    Catalog,
}

impl PageKind {
    pub fn as_u8(self) -> u8 {
        match self {
            PageKind::Free => 0,
            PageKind::Table => 1,
            PageKind::BTreeLeaf => 2,
            PageKind::BTreeInternal => 3,
            PageKind::Catalog => 4,
        }
    }

    /// Unknown tags read as `Free`.
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            1 => PageKind::Table,
            2 => PageKind::BTreeLeaf,
            3 => PageKind::BTreeInternal,
            4 => PageKind::Catalog,
            _ => PageKind::Free,
        }
    }
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    let bytes: [u8; 2] = data[offset..offset + 2].try_into().unwrap();
    u16::from_le_bytes(bytes)
}

pub(crate) fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    u32::from_le_bytes(bytes)
}

pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_link(data: &[u8], offset: usize) -> Option<PageId> {
    let value = read_u32(data, offset);
    if value == INVALID_PAGE_ID.as_u32() {
        None
    } else {
        Some(PageId::new(value))
    }
}

fn write_link(data: &mut [u8], offset: usize, page_id: Option<PageId>) {
    let value = page_id.unwrap_or(INVALID_PAGE_ID).as_u32();
    write_u32(data, offset, value);
}

/// Zeroes the page and writes a fresh header with no links.
pub(crate) fn init(data: &mut [u8], page_id: PageId, kind: PageKind, free_space_end: u16) {
    data.fill(0);
    write_u32(data, PAGE_ID_OFFSET, page_id.as_u32());
    data[PAGE_KIND_OFFSET] = kind.as_u8();
    write_u16(data, NUM_SLOTS_OFFSET, 0);
    write_u16(data, FREE_SPACE_END_OFFSET, free_space_end);
    write_link(data, NEXT_PAGE_ID_OFFSET, None);
    write_link(data, PREV_PAGE_ID_OFFSET, None);
    write_link(data, PARENT_PAGE_ID_OFFSET, None);
}

pub(crate) fn page_id(data: &[u8]) -> PageId {
    PageId::new(read_u32(data, PAGE_ID_OFFSET))
}

pub(crate) fn page_kind(data: &[u8]) -> PageKind {
    PageKind::from_u8(data[PAGE_KIND_OFFSET])
}

pub(crate) fn num_slots(data: &[u8]) -> u16 {
    read_u16(data, NUM_SLOTS_OFFSET)
}

pub(crate) fn set_num_slots(data: &mut [u8], num_slots: u16) {
    write_u16(data, NUM_SLOTS_OFFSET, num_slots);
}

pub(crate) fn free_space_end(data: &[u8]) -> u16 {
    read_u16(data, FREE_SPACE_END_OFFSET)
}

pub(crate) fn set_free_space_end(data: &mut [u8], offset: u16) {
    write_u16(data, FREE_SPACE_END_OFFSET, offset);
}

pub(crate) fn next_page_id(data: &[u8]) -> Option<PageId> {
    read_link(data, NEXT_PAGE_ID_OFFSET)
}

pub(crate) fn set_next_page_id(data: &mut [u8], page_id: Option<PageId>) {
    write_link(data, NEXT_PAGE_ID_OFFSET, page_id);
}

pub(crate) fn prev_page_id(data: &[u8]) -> Option<PageId> {
    read_link(data, PREV_PAGE_ID_OFFSET)
}

pub(crate) fn set_prev_page_id(data: &mut [u8], page_id: Option<PageId>) {
    write_link(data, PREV_PAGE_ID_OFFSET, page_id);
}

pub(crate) fn parent_page_id(data: &[u8]) -> Option<PageId> {
    read_link(data, PARENT_PAGE_ID_OFFSET)
}

pub(crate) fn set_parent_page_id(data: &mut [u8], page_id: Option<PageId>) {
    write_link(data, PARENT_PAGE_ID_OFFSET, page_id);
}
