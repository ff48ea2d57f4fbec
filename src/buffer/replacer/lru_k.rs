use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

use super::Replacer;

#[derive(Debug, Default)]
struct AccessHistory {
    /// Last k access timestamps, oldest at the front
    timestamps: VecDeque<Timestamp>,
    evictable: bool,
}

impl AccessHistory {
    fn record(&mut self, now: Timestamp, k: usize) {
        self.timestamps.push_back(now);
        while self.timestamps.len() > k {
            self.timestamps.pop_front();
        }
    }

    /// Ordering key for victim selection: larger is evicted first.
    ///
    /// Frames with fewer than k accesses have infinite backward k-distance
    /// and outrank every finite one; among them the oldest first access wins.
    fn eviction_rank(&self, now: Timestamp, k: usize) -> (bool, Timestamp) {
        if self.timestamps.len() < k {
            let earliest = self.timestamps.front().copied().unwrap_or(0);
            (true, Timestamp::MAX - earliest)
        } else {
            let kth = self.timestamps[self.timestamps.len() - k];
            (false, now - kth)
        }
    }
}

#[derive(Debug, Default)]
struct LruKState {
    clock: Timestamp,
    frames: HashMap<FrameId, AccessHistory>,
    num_evictable: usize,
}

impl LruKState {
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let history = self.frames.entry(frame_id).or_default();
        if history.evictable != evictable {
            history.evictable = evictable;
            if evictable {
                self.num_evictable += 1;
            } else {
                self.num_evictable -= 1;
            }
        }
    }
}

/// LRU-K replacement policy.
///
/// Evicts the eligible frame whose k-th most recent access lies furthest in
/// the past. Every `pin` counts as an access.
pub struct LruKReplacer {
    k: usize,
    capacity: usize,
    state: Mutex<LruKState>,
}

impl LruKReplacer {
    pub fn new(k: usize, capacity: usize) -> Self {
        Self {
            k: k.max(1),
            capacity,
            state: Mutex::new(LruKState::default()),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl Replacer for LruKReplacer {
    fn pin(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.capacity {
            return;
        }
        let mut state = self.state.lock();
        let now = state.clock;
        state.clock += 1;
        state
            .frames
            .entry(frame_id)
            .or_default()
            .record(now, self.k);
        state.set_evictable(frame_id, false);
    }

    fn unpin(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.capacity {
            return;
        }
        self.state.lock().set_evictable(frame_id, true);
    }

    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        let now = state.clock;
        let victim = state
            .frames
            .iter()
            .filter(|(_, history)| history.evictable)
            .max_by_key(|(_, history)| history.eviction_rank(now, self.k))
            .map(|(&frame_id, _)| frame_id)?;

        state.frames.remove(&victim);
        state.num_evictable -= 1;
        Some(victim)
    }

    fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(history) = state.frames.remove(&frame_id) {
            if history.evictable {
                state.num_evictable -= 1;
            }
        }
    }

    fn size(&self) -> usize {
        self.state.lock().num_evictable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32) -> FrameId {
        FrameId::new(id)
    }

    fn touch(replacer: &LruKReplacer, id: u32) {
        replacer.pin(frame(id));
        replacer.unpin(frame(id));
    }

    #[test]
    fn test_lru_k_replacer_empty() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.k(), 2);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_k_replacer_infinite_distance_first() {
        let replacer = LruKReplacer::new(2, 10);

        touch(&replacer, 0);
        touch(&replacer, 0);
        touch(&replacer, 1);

        // Frame 1 has a single access, so its k-distance is infinite.
        assert_eq!(replacer.victim(), Some(frame(1)));
        assert_eq!(replacer.victim(), Some(frame(0)));
    }

    #[test]
    fn test_lru_k_replacer_oldest_first_access_breaks_ties() {
        let replacer = LruKReplacer::new(2, 10);
        for id in [0, 1, 2] {
            touch(&replacer, id);
        }
        assert_eq!(replacer.size(), 3);
        assert_eq!(replacer.victim(), Some(frame(0)));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_lru_k_replacer_largest_k_distance() {
        let replacer = LruKReplacer::new(2, 10);
        for id in [0, 1, 2] {
            touch(&replacer, id);
            touch(&replacer, id);
        }
        // Frame 0 saw its second-most-recent access earliest.
        assert_eq!(replacer.victim(), Some(frame(0)));

        touch(&replacer, 1);
        // Frame 1's k-th access is now t=3, frame 2's is t=4.
        assert_eq!(replacer.victim(), Some(frame(1)));
    }

    #[test]
    fn test_lru_k_replacer_pinned_frames_are_skipped() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.pin(frame(0));
        touch(&replacer, 1);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(frame(1)));
        assert_eq!(replacer.victim(), None);

        replacer.unpin(frame(0));
        assert_eq!(replacer.victim(), Some(frame(0)));
    }

    #[test]
    fn test_lru_k_replacer_remove() {
        let replacer = LruKReplacer::new(2, 10);
        touch(&replacer, 0);
        replacer.pin(frame(1));

        replacer.remove(frame(0));
        replacer.remove(frame(1));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }
}
