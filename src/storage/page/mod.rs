pub(crate) mod header;
mod slotted_page;

pub use header::{PageKind, HEADER_SIZE};
pub use slotted_page::*;
