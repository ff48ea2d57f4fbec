mod lru;
mod lru_k;

pub use lru::LruReplacer;
pub use lru_k::LruKReplacer;

use crate::common::{FrameId, ReplacerPolicy};

/// Victim selection for the buffer pool.
///
/// The replacer only tracks frames that are eligible for eviction. The pool
/// calls `pin` when a frame's pin count leaves zero and `unpin` when it
/// returns to zero; `victim` hands out one eligible frame and forgets it.
pub trait Replacer: Send + Sync {
    /// Makes the frame ineligible for eviction.
    fn pin(&self, frame_id: FrameId);

    /// Makes the frame eligible for eviction.
    fn unpin(&self, frame_id: FrameId);

    /// Chooses and removes a frame to evict, or `None` if nothing is eligible.
    fn victim(&self) -> Option<FrameId>;

    /// Drops every trace of the frame, eligible or not.
    fn remove(&self, frame_id: FrameId);

    /// Number of frames currently eligible for eviction.
    fn size(&self) -> usize;
}

/// Builds the replacer named by `policy` for a pool of `pool_size` frames.
pub fn create_replacer(policy: ReplacerPolicy, pool_size: usize) -> Box<dyn Replacer> {
    match policy {
        ReplacerPolicy::Lru => Box::new(LruReplacer::new(pool_size)),
        ReplacerPolicy::LruK(k) => Box::new(LruKReplacer::new(k, pool_size)),
    }
}
