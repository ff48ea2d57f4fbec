mod btree_index;
mod btree_iterator;
mod btree_page;

pub use btree_index::BTreeIndex;
pub use btree_iterator::BTreeRangeIter;
pub use btree_page::{
    BTreeNode, BTreeNodeRef, ChildLookup, InternalEntry, LeafEntry, INTERNAL_CAPACITY,
    LEAF_CAPACITY,
};

use crate::common::{Result, StorageError, MIN_BTREE_ORDER};

/// Largest order whose overflowing node (order + 1 entries) still fits a
/// page, for both leaf and internal nodes.
pub fn max_btree_order() -> usize {
    LEAF_CAPACITY.min(INTERNAL_CAPACITY) - 1
}

/// Rejects orders below [`MIN_BTREE_ORDER`] or above [`max_btree_order`].
pub fn validate_order(order: usize) -> Result<()> {
    if order < MIN_BTREE_ORDER || order > max_btree_order() {
        return Err(StorageError::InvalidOrder(order));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_order_bounds() {
        assert!(validate_order(MIN_BTREE_ORDER).is_ok());
        assert!(validate_order(max_btree_order()).is_ok());
        assert!(matches!(validate_order(2), Err(StorageError::InvalidOrder(2))));
        assert!(validate_order(max_btree_order() + 1).is_err());
    }
}
