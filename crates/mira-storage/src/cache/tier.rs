//! A cache tier: LRU-ordered pages plus an id index and pin counts.
//!
//! The tier keeps its entries in a doubly linked list (most recently
//! used at the head) with a `PageId -> node` index for O(1) lookup, so
//! a hit splices the node to the front without a scan. Victim selection
//! walks from the tail and returns an id; the caller then removes it,
//! which keeps mutation away from live cursors.
//!
//! A tier is not synchronized itself; the cache wraps each tier in a
//! mutex, and that mutex also guards the embedded [`PinTable`].

use std::collections::HashMap;
use std::ptr::NonNull;

use mira_common::types::PageId;

use super::entry::MiraPage;
use super::pin::PinTable;
use crate::page::PageHandle;

/// A node in the LRU linked list.
struct Node {
    entry: MiraPage,
    prev: Option<NonNull<Node>>,
    next: Option<NonNull<Node>>,
}

impl Node {
    fn new(entry: MiraPage) -> Self {
        Self {
            entry,
            prev: None,
            next: None,
        }
    }
}

/// An LRU-ordered set of cached pages with pin tracking.
pub struct Tier {
    /// Tier name for diagnostics ("hot" or "cold").
    name: &'static str,
    /// Soft capacity in pages; exceeded only when every candidate is
    /// pinned.
    capacity: usize,
    /// Map from page id to list node.
    map: HashMap<PageId, NonNull<Node>>,
    /// Head of the list (most recently used).
    head: Option<NonNull<Node>>,
    /// Tail of the list (least recently used).
    tail: Option<NonNull<Node>>,
    /// Pin counts for resident pages.
    pins: PinTable,
}

// Safety: Tier owns its nodes exclusively; the raw pointers never leak
// outside &mut methods, and the cache serializes access via a mutex.
unsafe impl Send for Tier {}

impl Tier {
    /// Creates an empty tier.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            map: HashMap::with_capacity(capacity),
            head: None,
            tail: None,
            pins: PinTable::new(),
        }
    }

    /// Returns the tier name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the current number of resident pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no pages are resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the tier capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if `id` is resident in this tier.
    #[inline]
    pub fn contains(&self, id: PageId) -> bool {
        self.map.contains_key(&id)
    }

    /// Returns the pin count of `id` in this tier.
    #[inline]
    pub fn pin_count(&self, id: PageId) -> u32 {
        self.pins.count(id)
    }

    /// Records a hit on `id`: splices it to the MRU position, updates
    /// its access metadata, and pins it for the caller.
    ///
    /// Returns the page handle and the recomputed heat.
    pub fn hit(&mut self, id: PageId, now_ms: u64) -> Option<(PageHandle, f64)> {
        let node_ptr = *self.map.get(&id)?;
        self.move_to_front(node_ptr);

        // Safety: the pointer came from the map and the list is only
        // mutated through &mut self.
        let entry = unsafe { &mut (*node_ptr.as_ptr()).entry };
        let heat = entry.touch(now_ms);
        let handle = entry.page().clone();

        self.pins.pin(id);
        handle.note_pin();
        Some((handle, heat))
    }

    /// Adds a pin to an already resident page.
    ///
    /// A 0-to-1 transition splices the page to the MRU position.
    /// Returns the new pin count, or `None` if `id` is not resident.
    pub fn pin(&mut self, id: PageId) -> Option<u32> {
        let node_ptr = *self.map.get(&id)?;
        let count = self.pins.pin(id);
        unsafe { (*node_ptr.as_ptr()).entry.page().note_pin() };
        if count == 1 {
            self.move_to_front(node_ptr);
        }
        Some(count)
    }

    /// Releases one pin on `id`.
    ///
    /// Returns the remaining count, or `None` if `id` is not resident
    /// or not pinned (an unpin defect).
    pub fn unpin(&mut self, id: PageId) -> Option<u32> {
        let node_ptr = *self.map.get(&id)?;
        let remaining = self.pins.unpin(id)?;
        unsafe { (*node_ptr.as_ptr()).entry.page().note_unpin() };
        Some(remaining)
    }

    /// Inserts an entry at the MRU position.
    pub fn push_front(&mut self, entry: MiraPage) {
        let id = entry.id();
        debug_assert!(!self.map.contains_key(&id), "page {id} inserted twice");

        let node = Box::new(Node::new(entry));
        let node_ptr = match NonNull::new(Box::into_raw(node)) {
            Some(ptr) => ptr,
            // Box::into_raw never returns null.
            None => unreachable!(),
        };
        self.attach_front(node_ptr);
        self.map.insert(id, node_ptr);
    }

    /// Removes `id` from the tier and returns its entry.
    ///
    /// Callers must not remove pinned pages; that is asserted in debug
    /// builds.
    pub fn remove(&mut self, id: PageId) -> Option<MiraPage> {
        debug_assert!(!self.pins.is_pinned(id), "removing pinned page {id}");
        self.detach(id)
    }

    /// Removes `id` together with its pin count, for a cross-tier move.
    pub fn take_with_pins(&mut self, id: PageId) -> Option<(MiraPage, u32)> {
        let entry = self.detach(id)?;
        let count = self.pins.take(id);
        Some((entry, count))
    }

    /// Inserts an entry carrying a pin count from another tier.
    pub fn insert_with_pins(&mut self, entry: MiraPage, pin_count: u32) {
        let id = entry.id();
        self.push_front(entry);
        self.pins.restore(id, pin_count);
    }

    /// Returns the least recently used unpinned page, if any.
    pub fn lru_unpinned_victim(&self) -> Option<PageId> {
        let mut cursor = self.tail;
        while let Some(node_ptr) = cursor {
            let node = unsafe { &*node_ptr.as_ptr() };
            let id = node.entry.id();
            if !self.pins.is_pinned(id) {
                return Some(id);
            }
            cursor = node.prev;
        }
        None
    }

    /// Returns the unpinned page with the lowest heat strictly below
    /// `threshold`, if any.
    pub fn coolest_below(&self, threshold: f64) -> Option<PageId> {
        let mut best: Option<(PageId, f64)> = None;
        let mut cursor = self.head;
        while let Some(node_ptr) = cursor {
            let node = unsafe { &*node_ptr.as_ptr() };
            let entry = &node.entry;
            let heat = entry.heat();
            if heat < threshold && !self.pins.is_pinned(entry.id()) {
                match best {
                    Some((_, best_heat)) if heat >= best_heat => {}
                    _ => best = Some((entry.id(), heat)),
                }
            }
            cursor = node.next;
        }
        best.map(|(id, _)| id)
    }

    /// Returns the entry for `id` without updating recency.
    pub fn peek(&self, id: PageId) -> Option<&MiraPage> {
        let node_ptr = *self.map.get(&id)?;
        Some(unsafe { &(*node_ptr.as_ptr()).entry })
    }

    /// Iterates entries from most to least recently used.
    pub fn iter(&self) -> TierIter<'_> {
        TierIter {
            cursor: self.head,
            _tier: self,
        }
    }

    // -------------------------------------------------------------------------
    // List plumbing
    // -------------------------------------------------------------------------

    fn detach(&mut self, id: PageId) -> Option<MiraPage> {
        let node_ptr = self.map.remove(&id)?;
        self.unlink(node_ptr);
        // Safety: removed from the map, so this is the sole owner now.
        let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
        Some(node.entry)
    }

    fn move_to_front(&mut self, node_ptr: NonNull<Node>) {
        if Some(node_ptr) == self.head {
            return;
        }
        self.unlink(node_ptr);
        self.attach_front(node_ptr);
    }

    fn attach_front(&mut self, node_ptr: NonNull<Node>) {
        unsafe {
            (*node_ptr.as_ptr()).prev = None;
            (*node_ptr.as_ptr()).next = self.head;

            if let Some(head) = self.head {
                (*head.as_ptr()).prev = Some(node_ptr);
            }

            self.head = Some(node_ptr);

            if self.tail.is_none() {
                self.tail = Some(node_ptr);
            }
        }
    }

    fn unlink(&mut self, node_ptr: NonNull<Node>) {
        unsafe {
            let prev = (*node_ptr.as_ptr()).prev;
            let next = (*node_ptr.as_ptr()).next;

            if let Some(prev) = prev {
                (*prev.as_ptr()).next = next;
            } else {
                self.head = next;
            }

            if let Some(next) = next {
                (*next.as_ptr()).prev = prev;
            } else {
                self.tail = prev;
            }
        }
    }

    /// Checks list/index agreement; test support.
    #[cfg(test)]
    fn assert_consistent(&self) {
        let mut seen = 0;
        let mut cursor = self.head;
        while let Some(node_ptr) = cursor {
            let node = unsafe { &*node_ptr.as_ptr() };
            assert!(self.map.contains_key(&node.entry.id()));
            seen += 1;
            cursor = node.next;
        }
        assert_eq!(seen, self.map.len());
    }
}

impl Drop for Tier {
    fn drop(&mut self) {
        let mut cursor = self.head;
        while let Some(node_ptr) = cursor {
            unsafe {
                cursor = (*node_ptr.as_ptr()).next;
                drop(Box::from_raw(node_ptr.as_ptr()));
            }
        }
    }
}

impl std::fmt::Debug for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("pinned", &self.pins.pinned_pages())
            .finish()
    }
}

/// Iterator over tier entries, most recently used first.
pub struct TierIter<'a> {
    cursor: Option<NonNull<Node>>,
    _tier: &'a Tier,
}

impl<'a> Iterator for TierIter<'a> {
    type Item = &'a MiraPage;

    fn next(&mut self) -> Option<Self::Item> {
        let node_ptr = self.cursor?;
        // Safety: the borrow of the tier keeps the list alive and
        // unmodified for 'a.
        let node = unsafe { &*node_ptr.as_ptr() };
        self.cursor = node.next;
        Some(&node.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;
    use std::sync::Arc;

    fn entry(id: u32) -> MiraPage {
        MiraPage::new(Arc::new(Page::new(PageId::new(id), 512)), 0)
    }

    fn tier_with(ids: &[u32]) -> Tier {
        let mut tier = Tier::new("test", 16);
        for &id in ids {
            tier.push_front(entry(id));
        }
        tier
    }

    fn order(tier: &Tier) -> Vec<u32> {
        tier.iter().map(|e| e.id().as_u32()).collect()
    }

    #[test]
    fn test_push_front_orders_mru_first() {
        let tier = tier_with(&[0, 1, 2]);
        assert_eq!(order(&tier), vec![2, 1, 0]);
        assert_eq!(tier.len(), 3);
        tier.assert_consistent();
    }

    #[test]
    fn test_hit_moves_to_front() {
        let mut tier = tier_with(&[0, 1, 2]);

        let (handle, heat) = tier.hit(PageId::new(0), 5).unwrap();
        assert_eq!(handle.id(), PageId::new(0));
        assert!(heat > 0.0);
        assert_eq!(order(&tier), vec![0, 2, 1]);
        assert_eq!(tier.pin_count(PageId::new(0)), 1);
        tier.assert_consistent();
    }

    #[test]
    fn test_hit_absent() {
        let mut tier = tier_with(&[0]);
        assert!(tier.hit(PageId::new(9), 0).is_none());
    }

    #[test]
    fn test_remove() {
        let mut tier = tier_with(&[0, 1, 2]);

        let removed = tier.remove(PageId::new(1)).unwrap();
        assert_eq!(removed.id(), PageId::new(1));
        assert_eq!(order(&tier), vec![2, 0]);
        assert!(!tier.contains(PageId::new(1)));
        tier.assert_consistent();
    }

    #[test]
    fn test_lru_victim_skips_pinned() {
        let mut tier = tier_with(&[0, 1, 2]);
        // LRU end is id 0.
        assert_eq!(tier.lru_unpinned_victim(), Some(PageId::new(0)));

        tier.pin(PageId::new(0)).unwrap();
        // Pinning splices 0 to the front; LRU end is now id 1.
        assert_eq!(tier.lru_unpinned_victim(), Some(PageId::new(1)));

        tier.pin(PageId::new(1)).unwrap();
        tier.pin(PageId::new(2)).unwrap();
        assert_eq!(tier.lru_unpinned_victim(), None);
    }

    #[test]
    fn test_pin_unpin_round_trip() {
        let mut tier = tier_with(&[0]);
        let id = PageId::new(0);

        assert_eq!(tier.pin(id), Some(1));
        assert_eq!(tier.pin(id), Some(2));
        assert_eq!(tier.unpin(id), Some(1));
        assert_eq!(tier.unpin(id), Some(0));
        assert_eq!(tier.unpin(id), None);
    }

    #[test]
    fn test_second_pin_does_not_resplice() {
        let mut tier = tier_with(&[0, 1]);

        tier.pin(PageId::new(0)).unwrap();
        assert_eq!(order(&tier), vec![0, 1]);

        // Another page becomes MRU; a second pin of 0 must not splice.
        tier.hit(PageId::new(1), 1).unwrap();
        assert_eq!(order(&tier), vec![1, 0]);
        tier.pin(PageId::new(0)).unwrap();
        assert_eq!(order(&tier), vec![1, 0]);
    }

    #[test]
    fn test_coolest_below() {
        let mut tier = tier_with(&[0, 1, 2]);

        // Heat id 1 well above the others.
        for _ in 0..8 {
            tier.hit(PageId::new(1), 0).unwrap();
            tier.unpin(PageId::new(1)).unwrap();
        }

        let coolest = tier.coolest_below(f64::INFINITY).unwrap();
        assert_ne!(coolest, PageId::new(1));

        // A tight threshold excludes everything.
        assert_eq!(tier.coolest_below(0.0), None);
    }

    #[test]
    fn test_coolest_below_skips_pinned() {
        let mut tier = tier_with(&[0, 1]);
        tier.pin(PageId::new(0)).unwrap();
        tier.pin(PageId::new(1)).unwrap();
        assert_eq!(tier.coolest_below(f64::INFINITY), None);
    }

    #[test]
    fn test_cross_tier_move_carries_pins() {
        let mut hot = Tier::new("hot", 4);
        let mut cold = tier_with(&[0]);

        cold.pin(PageId::new(0)).unwrap();
        let (entry, pins) = cold.take_with_pins(PageId::new(0)).unwrap();
        assert_eq!(pins, 1);
        assert!(cold.is_empty());

        hot.insert_with_pins(entry, pins);
        assert!(hot.contains(PageId::new(0)));
        assert_eq!(hot.pin_count(PageId::new(0)), 1);
        hot.assert_consistent();
    }
}
