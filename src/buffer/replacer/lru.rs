use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use crate::common::FrameId;

use super::Replacer;

/// Least-recently-unpinned replacement policy.
///
/// Eligible frames sit in insertion order; `unpin` moves a frame to the back
/// and `victim` pops the front. Every operation is O(1).
pub struct LruReplacer {
    capacity: usize,
    frames: Mutex<LinkedHashMap<FrameId, ()>>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: Mutex::new(LinkedHashMap::with_capacity(capacity)),
        }
    }
}

impl Replacer for LruReplacer {
    fn pin(&self, frame_id: FrameId) {
        self.frames.lock().remove(&frame_id);
    }

    fn unpin(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.capacity {
            return;
        }
        let mut frames = self.frames.lock();
        // Re-inserting refreshes the position.
        frames.remove(&frame_id);
        frames.insert(frame_id, ());
    }

    fn victim(&self) -> Option<FrameId> {
        self.frames.lock().pop_front().map(|(frame_id, _)| frame_id)
    }

    fn remove(&self, frame_id: FrameId) {
        self.frames.lock().remove(&frame_id);
    }

    fn size(&self) -> usize {
        self.frames.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32) -> FrameId {
        FrameId::new(id)
    }

    #[test]
    fn test_lru_replacer_empty() {
        let replacer = LruReplacer::new(4);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_victim_order() {
        let replacer = LruReplacer::new(8);
        for id in [1, 2, 3, 4, 5, 6] {
            replacer.unpin(frame(id));
        }
        // Duplicate unpin moves frame 1 to the back.
        replacer.unpin(frame(1));
        assert_eq!(replacer.size(), 6);

        assert_eq!(replacer.victim(), Some(frame(2)));
        assert_eq!(replacer.victim(), Some(frame(3)));
        assert_eq!(replacer.victim(), Some(frame(4)));

        replacer.pin(frame(5));
        replacer.pin(frame(6));
        assert_eq!(replacer.size(), 1);

        replacer.unpin(frame(5));
        assert_eq!(replacer.victim(), Some(frame(1)));
        assert_eq!(replacer.victim(), Some(frame(5)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_pin_of_untracked_frame_is_noop() {
        let replacer = LruReplacer::new(4);
        replacer.pin(frame(2));
        replacer.remove(frame(3));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_replacer_ignores_out_of_range_frames() {
        let replacer = LruReplacer::new(2);
        replacer.unpin(frame(7));
        assert_eq!(replacer.size(), 0);
    }
}
