//! Pin tracking for cached pages.

use std::collections::HashMap;

use mira_common::types::PageId;

/// Pin counts for the pages resident in one tier.
///
/// Absence of an entry means a count of zero. The table is not
/// synchronized itself; it lives inside a [`Tier`](super::tier::Tier)
/// and inherits the tier mutex, so eviction can test pin counts without
/// touching any per-page state.
#[derive(Debug, Default)]
pub struct PinTable {
    counts: HashMap<PageId, u32>,
}

impl PinTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the pin count for `id` and returns the new count.
    pub fn pin(&mut self, id: PageId) -> u32 {
        let count = self.counts.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrements the pin count for `id` and returns the new count.
    ///
    /// Returns `None` if the page was not pinned; the caller treats that
    /// as a defect (debug assertion upstream, no-op in release).
    pub fn unpin(&mut self, id: PageId) -> Option<u32> {
        match self.counts.get_mut(&id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                let remaining = *count;
                if remaining == 0 {
                    self.counts.remove(&id);
                }
                Some(remaining)
            }
            _ => None,
        }
    }

    /// Returns the pin count for `id`.
    pub fn count(&self, id: PageId) -> u32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    /// Returns true if `id` has a nonzero pin count.
    pub fn is_pinned(&self, id: PageId) -> bool {
        self.count(id) > 0
    }

    /// Removes and returns the pin count for `id` (zero if absent).
    ///
    /// Used when moving a page across tiers: the count travels with it.
    pub fn take(&mut self, id: PageId) -> u32 {
        self.counts.remove(&id).unwrap_or(0)
    }

    /// Restores a pin count taken from another tier.
    pub fn restore(&mut self, id: PageId, count: u32) {
        if count > 0 {
            self.counts.insert(id, count);
        }
    }

    /// Returns the number of distinct pinned pages.
    pub fn pinned_pages(&self) -> usize {
        self.counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_unpin() {
        let mut pins = PinTable::new();
        let id = PageId::new(1);

        assert_eq!(pins.count(id), 0);
        assert!(!pins.is_pinned(id));

        assert_eq!(pins.pin(id), 1);
        assert_eq!(pins.pin(id), 2);
        assert!(pins.is_pinned(id));

        assert_eq!(pins.unpin(id), Some(1));
        assert_eq!(pins.unpin(id), Some(0));
        assert!(!pins.is_pinned(id));
        assert_eq!(pins.pinned_pages(), 0);
    }

    #[test]
    fn test_unpin_underflow() {
        let mut pins = PinTable::new();
        assert_eq!(pins.unpin(PageId::new(1)), None);

        pins.pin(PageId::new(1));
        pins.unpin(PageId::new(1));
        assert_eq!(pins.unpin(PageId::new(1)), None);
    }

    #[test]
    fn test_take_and_restore() {
        let mut from = PinTable::new();
        let mut to = PinTable::new();
        let id = PageId::new(3);

        from.pin(id);
        from.pin(id);

        let count = from.take(id);
        assert_eq!(count, 2);
        assert_eq!(from.count(id), 0);

        to.restore(id, count);
        assert_eq!(to.count(id), 2);

        // Restoring zero leaves no entry behind.
        to.restore(PageId::new(4), 0);
        assert_eq!(to.pinned_pages(), 1);
    }
}
