//! Native measurement model: the shared counter record and the tracked
//! container that charges its mutations against it.
//!
//! The byte costs are calibration constants of a simplified model, not a
//! description of any real memory layout.

use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Fixed cost of constructing a tracked container.
pub const CONTAINER_BASE_BYTES: u64 = 56;

/// Cost of one element slot.
pub const SLOT_BYTES: u64 = 8;

/// Counters for one execution.
///
/// `peak_mem` never decreases over the lifetime of a state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerState {
    ops: u64,
    current_mem: u64,
    peak_mem: u64,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> u64 {
        self.ops
    }

    pub fn current_mem(&self) -> u64 {
        self.current_mem
    }

    pub fn peak_mem(&self) -> u64 {
        self.peak_mem
    }

    /// One dynamic entry into a countable block.
    pub fn count_op(&mut self) {
        self.ops += 1;
    }

    /// Apply a signed byte delta and re-check the peak.
    pub fn track_mem(&mut self, delta: i64) {
        self.current_mem = self.current_mem.saturating_add_signed(delta);
        if self.current_mem > self.peak_mem {
            self.peak_mem = self.current_mem;
        }
    }
}

/// List-like wrapper whose mutations are charged to a [`TrackerState`].
///
/// Reads go through `Deref<Target = [T]>`; only construct, append, pop and
/// clear carry accounting side effects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedContainer<T> {
    items: Vec<T>,
    size: u64,
}

impl<T> TrackedContainer<T> {
    /// Build from literal elements: `56 + 8 * k` bytes.
    pub fn from_literal(items: Vec<T>, tracker: &mut TrackerState) -> Self {
        let size = CONTAINER_BASE_BYTES + SLOT_BYTES * items.len() as u64;
        tracker.track_mem(size as i64);
        Self { items, size }
    }

    pub fn append(&mut self, item: T, tracker: &mut TrackerState) {
        self.items.push(item);
        self.size += SLOT_BYTES;
        tracker.track_mem(SLOT_BYTES as i64);
    }

    /// Pop the last element. Popping an empty container charges nothing.
    pub fn pop(&mut self, tracker: &mut TrackerState) -> Option<T> {
        let item = self.items.pop()?;
        self.size -= SLOT_BYTES;
        tracker.track_mem(-(SLOT_BYTES as i64));
        Some(item)
    }

    /// Empty the container, freeing `8 * len` bytes.
    pub fn clear(&mut self, tracker: &mut TrackerState) {
        let freed = SLOT_BYTES * self.items.len() as u64;
        self.items.clear();
        self.size -= freed;
        tracker.track_mem(-(freed as i64));
    }

    /// Estimated byte footprint.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl<T> Deref for TrackedContainer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_then_append_matches_reference_costs() {
        let mut tracker = TrackerState::new();
        let mut x = TrackedContainer::from_literal(vec![1, 2, 3], &mut tracker);
        assert_eq!(tracker.current_mem(), 80);
        assert_eq!(x.size(), 80);

        x.append(4, &mut tracker);
        assert_eq!(tracker.current_mem(), 88);
        assert_eq!(tracker.peak_mem(), 88);
        assert_eq!(&*x, &[1, 2, 3, 4]);
    }

    #[test]
    fn pop_frees_slot_and_keeps_peak() {
        let mut tracker = TrackerState::new();
        let mut x = TrackedContainer::from_literal(vec!['a', 'b'], &mut tracker);
        assert_eq!(x.pop(&mut tracker), Some('b'));
        assert_eq!(tracker.current_mem(), 64);
        assert_eq!(tracker.peak_mem(), 72);
    }

    #[test]
    fn pop_from_empty_is_free() {
        let mut tracker = TrackerState::new();
        let mut x: TrackedContainer<u8> = TrackedContainer::from_literal(Vec::new(), &mut tracker);
        assert_eq!(x.pop(&mut tracker), None);
        assert_eq!(tracker.current_mem(), 56);
        assert_eq!(x.size(), 56);
    }

    #[test]
    fn clear_frees_every_slot_but_not_the_base() {
        let mut tracker = TrackerState::new();
        let mut x = TrackedContainer::from_literal(vec![0u8; 5], &mut tracker);
        x.append(9, &mut tracker);
        x.clear(&mut tracker);
        assert!(x.is_empty());
        assert_eq!(tracker.current_mem(), 56);
        assert_eq!(tracker.peak_mem(), 56 + 6 * 8);
    }

    #[test]
    fn peak_is_monotone_over_mixed_operations() {
        let mut tracker = TrackerState::new();
        let mut a = TrackedContainer::from_literal(vec![1u32], &mut tracker);
        let mut b = TrackedContainer::from_literal(Vec::new(), &mut tracker);
        let mut last_peak = tracker.peak_mem();

        for step in 0..200u32 {
            match step % 7 {
                0 | 3 => a.append(step, &mut tracker),
                1 => {
                    a.pop(&mut tracker);
                }
                2 => b.append(step, &mut tracker),
                4 => {
                    b.pop(&mut tracker);
                }
                5 => b.clear(&mut tracker),
                _ => a.clear(&mut tracker),
            }
            assert!(tracker.peak_mem() >= last_peak);
            assert!(tracker.peak_mem() >= tracker.current_mem());
            last_peak = tracker.peak_mem();
        }
    }

    #[test]
    fn count_op_is_independent_of_memory() {
        let mut tracker = TrackerState::new();
        tracker.count_op();
        tracker.count_op();
        assert_eq!(tracker.ops(), 2);
        assert_eq!(tracker.peak_mem(), 0);
    }
}
