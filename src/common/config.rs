use super::error::{Result, StorageError};
use super::types::{FrameId, PageId};

/// Size of a page in bytes (4 KB). Fixed for the lifetime of a database file.
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant, also the on-disk "no link" marker
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Default K value for the LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Default B+ tree order (max entries per node)
pub const DEFAULT_BTREE_ORDER: usize = 128;

/// Smallest order that still gives internal nodes a fan-out above two
pub const MIN_BTREE_ORDER: usize = 3;

/// Victim selection policy used by the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerPolicy {
    /// Least recently unpinned frame is evicted first.
    Lru,
    /// Largest backward k-distance is evicted first.
    LruK(usize),
}

impl Default for ReplacerPolicy {
    fn default() -> Self {
        ReplacerPolicy::Lru
    }
}

/// Runtime knobs of the storage core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Number of frames in the buffer pool
    pub pool_size: usize,
    /// Eviction policy
    pub replacer: ReplacerPolicy,
    /// Max entries per B+Tree node
    pub btree_order: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            replacer: ReplacerPolicy::default(),
            btree_order: DEFAULT_BTREE_ORDER,
        }
    }
}

impl StorageConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_replacer(mut self, replacer: ReplacerPolicy) -> Self {
        self.replacer = replacer;
        self
    }

    pub fn with_btree_order(mut self, order: usize) -> Self {
        self.btree_order = order;
        self
    }

    /// Checks that the configuration describes a usable storage core.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(StorageError::InvalidConfig(
                "buffer pool needs at least one frame".to_string(),
            ));
        }
        if let ReplacerPolicy::LruK(0) = self.replacer {
            return Err(StorageError::InvalidConfig(
                "LRU-K needs k >= 1".to_string(),
            ));
        }
        crate::index::validate_order(self.btree_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StorageConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.replacer, ReplacerPolicy::Lru);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(StorageConfig::default().with_pool_size(0).validate().is_err());
        assert!(StorageConfig::default()
            .with_replacer(ReplacerPolicy::LruK(0))
            .validate()
            .is_err());
        assert!(matches!(
            StorageConfig::default().with_btree_order(2).validate(),
            Err(StorageError::InvalidOrder(2))
        ));
    }
}
