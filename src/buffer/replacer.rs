//! Page replacement policies.
//!
//! The replacer tracks the frames that are candidates for eviction
//! (resident, unpinned) and picks a victim when the pool needs a frame.

use hashlink::LinkedHashSet;

use super::frame::FrameId;

/// Victim-selection policy over unpinned frames.
///
/// The replacer is a plain data structure: it is owned by the buffer
/// pool instance and serialized by the instance lock, so implementations
/// need no internal locking, only `Send`.
///
/// # Usage
///
/// ```text
/// // a frame's pin count dropped to 0
/// replacer.unpin(frame_id);
///
/// // a frame was (re-)pinned
/// replacer.pin(frame_id);
///
/// // the pool needs a frame
/// if let Some(victim) = replacer.victim() { /* evict it */ }
/// ```
pub trait Replacer: Send {
    /// Removes and returns the eviction victim, or `None` if every
    /// frame is pinned.
    fn victim(&mut self) -> Option<FrameId>;

    /// Removes `frame_id` from the candidate set. No-op if absent.
    fn pin(&mut self, frame_id: FrameId);

    /// Adds `frame_id` as the most-recent candidate. No-op if already
    /// present.
    fn unpin(&mut self, frame_id: FrameId);

    /// Number of eviction candidates.
    fn size(&self) -> usize;
}

/// Strict least-recently-used replacement.
///
/// Recency is measured over unpin events: `unpin` appends at the
/// most-recent end, `victim` pops the least-recent end, and `pin` of a
/// member removes it without reordering the rest.
///
/// Backed by a [`LinkedHashSet`], a hash index over a doubly linked
/// list, so every operation is O(1).
///
/// The `num_pages` bound caps the candidate set; in correct use it is
/// never reached, because the set only holds frames of one instance's
/// frame array. An `unpin` past the bound is ignored.
pub struct LruReplacer {
    /// Candidates in recency order, least-recent first.
    queue: LinkedHashSet<FrameId>,
    num_pages: usize,
}

impl LruReplacer {
    /// Creates a replacer that will track at most `num_pages` frames.
    pub fn with_capacity(num_pages: usize) -> Self {
        Self {
            queue: LinkedHashSet::with_capacity(num_pages),
            num_pages,
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        self.queue.pop_front()
    }

    fn pin(&mut self, frame_id: FrameId) {
        self.queue.remove(&frame_id);
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if self.queue.contains(&frame_id) {
            return;
        }
        if self.queue.len() >= self.num_pages {
            return;
        }
        self.queue.insert(frame_id);
    }

    fn size(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_returns_least_recent() {
        let mut replacer = LruReplacer::with_capacity(8);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));

        assert_eq!(replacer.size(), 3);
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_removes_without_reordering() {
        let mut replacer = LruReplacer::with_capacity(8);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));

        replacer.pin(FrameId::new(1));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_absent_is_noop() {
        let mut replacer = LruReplacer::with_capacity(8);
        replacer.pin(FrameId::new(99));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_unpin_present_is_noop() {
        let mut replacer = LruReplacer::with_capacity(8);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        // Re-unpinning frame 0 must not refresh its recency.
        replacer.unpin(FrameId::new(0));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_pin_then_unpin_moves_to_most_recent() {
        let mut replacer = LruReplacer::with_capacity(8);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));

        replacer.pin(FrameId::new(0));
        replacer.unpin(FrameId::new(0));

        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_capacity_bound() {
        let mut replacer = LruReplacer::with_capacity(2);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_empty_victim_is_none() {
        let mut replacer = LruReplacer::with_capacity(8);
        assert_eq!(replacer.victim(), None);
    }
}
