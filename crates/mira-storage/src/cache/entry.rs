//! Cached-page access metadata.

use mira_common::constants::MIN_HEAT_INTERVAL_MS;
use mira_common::types::PageId;

use crate::page::PageHandle;

/// A cached page together with its access metadata.
///
/// Heat rewards frequency and recency: it is recomputed on every access
/// as `access_count / ln(1 + elapsed_ms)`, where `elapsed_ms` is the
/// time since the *previous* access, clamped to at least 1 ms. A page
/// hammered in quick succession heats up fast; a stale page cools
/// because the logarithmic denominator grows.
///
/// `access_count` saturates rather than decaying, so a long-lived page
/// with a large count needs a correspondingly long idle gap to cool
/// below a threshold.
#[derive(Debug)]
pub struct MiraPage {
    page: PageHandle,
    /// Milliseconds since cache start at the previous access.
    last_access_ms: u64,
    /// Saturating access counter.
    access_count: u32,
    /// Derived heat value; higher means hotter.
    heat: f64,
}

impl MiraPage {
    /// Wraps a freshly materialized page.
    pub fn new(page: PageHandle, now_ms: u64) -> Self {
        Self {
            page,
            last_access_ms: now_ms,
            access_count: 1,
            heat: 1.0,
        }
    }

    /// Returns the wrapped page handle.
    #[inline]
    pub fn page(&self) -> &PageHandle {
        &self.page
    }

    /// Returns the page id.
    #[inline]
    pub fn id(&self) -> PageId {
        self.page.id()
    }

    /// Returns the current heat.
    #[inline]
    pub fn heat(&self) -> f64 {
        self.heat
    }

    /// Returns the access count.
    #[inline]
    pub fn access_count(&self) -> u32 {
        self.access_count
    }

    /// Returns the timestamp of the last access, in milliseconds since
    /// cache start.
    #[inline]
    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms
    }

    /// Records an access at `now_ms` and recomputes heat.
    ///
    /// The elapsed time is measured against the previous access before
    /// the timestamp is advanced.
    pub fn touch(&mut self, now_ms: u64) -> f64 {
        let elapsed = now_ms
            .saturating_sub(self.last_access_ms)
            .max(MIN_HEAT_INTERVAL_MS);
        self.access_count = self.access_count.saturating_add(1);
        self.heat = f64::from(self.access_count) / (1.0 + elapsed as f64).ln();
        self.last_access_ms = now_ms;
        self.heat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;
    use std::sync::Arc;

    fn entry(id: u32, now_ms: u64) -> MiraPage {
        MiraPage::new(Arc::new(Page::new(PageId::new(id), 512)), now_ms)
    }

    #[test]
    fn test_initial_state() {
        let entry = entry(0, 100);
        assert_eq!(entry.access_count(), 1);
        assert_eq!(entry.last_access_ms(), 100);
        assert!((entry.heat() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rapid_access_heats_up() {
        let mut entry = entry(0, 0);

        // Back-to-back accesses clamp elapsed time to 1 ms.
        let mut previous = entry.heat();
        for _ in 0..4 {
            let heat = entry.touch(0);
            assert!(heat > previous);
            previous = heat;
        }
        // 5 accesses over ln(2) each.
        assert!((entry.heat() - 5.0 / 2.0f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_stale_access_cools_down() {
        let mut entry = entry(0, 0);
        let hot = entry.touch(1);

        // Same count trajectory, but a long gap before the next access.
        let cool = entry.touch(100_000);
        assert!(cool < hot);
    }

    #[test]
    fn test_elapsed_measured_before_timestamp_update() {
        let mut entry = entry(0, 0);
        entry.touch(1000);
        assert_eq!(entry.last_access_ms(), 1000);

        // Elapsed for this touch is 500ms, not zero.
        let heat = entry.touch(1500);
        assert!((heat - 3.0 / 501.0f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_access_count_increments() {
        let mut entry = entry(0, 0);
        for _ in 0..10 {
            entry.touch(0);
        }
        assert_eq!(entry.access_count(), 11);
    }
}
