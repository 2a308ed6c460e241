//! The tiered, heat-aware page cache.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use mira_common::types::PageId;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::admission::{AdmissionEngine, Placement};
use super::config::CacheConfig;
use super::entry::MiraPage;
use super::error::{CacheError, CacheResult};
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::tier::Tier;
use super::PageCache;
use crate::heap::HeapFile;
use crate::page::{Page, PageHandle};

/// Which tier a page currently resides in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    /// The small, reuse-reserved tier.
    Hot,
    /// The large default tier.
    Cold,
}

/// Runtime-settable policy knobs.
#[derive(Debug, Clone, Copy)]
struct Tunables {
    promotion_threshold: f64,
    admission_probability: f64,
    force_miss_probability: f64,
}

/// A tiered page cache over a heap file.
///
/// Pages live in one of two LRU tiers. Fresh pages are admitted to cold
/// with high probability; a page whose heat crosses the promotion
/// threshold moves to hot, and cooled-off hot pages are demoted back
/// when room is needed. Eviction only ever removes unpinned pages and
/// writes dirty victims back first.
///
/// Lock order is `hot` before `cold`; the heap file's internal mutex is
/// innermost and is never held while a tier mutex is acquired.
pub struct MiraCache {
    /// Backing store.
    heap: HeapFile,
    /// Page size in bytes, fixed at construction.
    page_size: usize,
    /// Hot tier; lock before `cold` when both are needed.
    hot: Mutex<Tier>,
    /// Cold tier.
    cold: Mutex<Tier>,
    /// Policy knobs.
    tunables: RwLock<Tunables>,
    /// Admission and forced-miss rolls.
    admission: AdmissionEngine,
    /// Activity counters.
    stats: CacheStats,
    /// Epoch for access timestamps.
    start: Instant,
}

impl MiraCache {
    /// Opens a cache over the configured heap file.
    pub fn open(config: CacheConfig) -> CacheResult<Self> {
        Self::build(config, AdmissionEngine::new())
    }

    /// Opens a cache whose admission rolls are seeded, for
    /// deterministic tests.
    pub fn open_seeded(config: CacheConfig, seed: u64) -> CacheResult<Self> {
        Self::build(config, AdmissionEngine::with_seed(seed))
    }

    fn build(config: CacheConfig, admission: AdmissionEngine) -> CacheResult<Self> {
        config.validate().map_err(CacheError::config)?;
        let heap = HeapFile::open(&config.path, config.create, config.page_size)?;

        info!(
            path = %config.path.display(),
            hot_capacity = config.hot_capacity,
            cold_capacity = config.cold_capacity,
            page_size = config.page_size,
            "opened page cache"
        );

        Ok(Self {
            heap,
            page_size: config.page_size,
            hot: Mutex::new(Tier::new("hot", config.hot_capacity)),
            cold: Mutex::new(Tier::new("cold", config.cold_capacity)),
            tunables: RwLock::new(Tunables {
                promotion_threshold: config.promotion_threshold,
                admission_probability: config.admission_probability,
                force_miss_probability: config.force_miss_probability,
            }),
            admission,
            stats: CacheStats::new(),
            start: Instant::now(),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        self.heap.path()
    }

    /// Returns a snapshot of the activity counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Zeroes the activity counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Emits the counters as human-readable log lines.
    pub fn log_stats(&self) {
        self.stats.log();
    }

    /// Returns current (hot, cold) occupancy.
    pub fn occupancy(&self) -> (usize, usize) {
        let hot = self.hot.lock().len();
        let cold = self.cold.lock().len();
        (hot, cold)
    }

    /// Returns which tier currently holds `id`, if any.
    pub fn tier_of(&self, id: PageId) -> Option<TierKind> {
        if self.hot.lock().contains(id) {
            return Some(TierKind::Hot);
        }
        if self.cold.lock().contains(id) {
            return Some(TierKind::Cold);
        }
        None
    }

    /// Returns the current pin count of `id`, for diagnostics.
    pub fn pin_count(&self, id: PageId) -> u32 {
        let count = self.hot.lock().pin_count(id);
        if count > 0 {
            return count;
        }
        self.cold.lock().pin_count(id)
    }

    /// Sets the heat threshold governing promotion and demotion.
    pub fn set_promotion_threshold(&self, threshold: f64) {
        if !threshold.is_nan() {
            self.tunables.write().promotion_threshold = threshold;
        }
    }

    /// Sets the probability of admitting a fresh page straight to hot.
    pub fn set_admission_probability(&self, probability: f64) {
        self.tunables.write().admission_probability = probability.clamp(0.0, 1.0);
    }

    /// Sets the probability that a fetch pretends the page is absent
    /// and re-reads it from disk. Stress-testing only.
    pub fn set_force_miss_probability(&self, probability: f64) {
        self.tunables.write().force_miss_probability = probability.clamp(0.0, 1.0);
    }

    /// Frees up to `n` unpinned pages, draining the cold LRU end first
    /// (up to `n / 2`) and the hot LRU end for the remainder.
    ///
    /// Returns the number of pages actually freed; fewer when pinned
    /// pages exhaust the candidates.
    pub fn evict_under_pressure(&self, n: usize) -> usize {
        let mut freed = 0;

        {
            let mut cold = self.cold.lock();
            while freed < n / 2 {
                match self.evict_strict(&mut cold) {
                    Ok(true) => freed += 1,
                    Ok(false) => break,
                    Err(e) => {
                        error!(error = %e, "pressure eviction stopped on writeback failure");
                        return freed;
                    }
                }
            }
        }

        {
            let mut hot = self.hot.lock();
            while freed < n {
                match self.evict_strict(&mut hot) {
                    Ok(true) => freed += 1,
                    Ok(false) => break,
                    Err(e) => {
                        error!(error = %e, "pressure eviction stopped on writeback failure");
                        break;
                    }
                }
            }
        }

        info!(requested = n, freed, "evicted under memory pressure");
        freed
    }

    // -------------------------------------------------------------------------
    // Lookup and admission
    // -------------------------------------------------------------------------

    /// Milliseconds since cache start.
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn lookup_hot(&self, id: PageId, now: u64) -> Option<PageHandle> {
        self.hot.lock().hit(id, now).map(|(handle, _)| handle)
    }

    fn lookup_cold(&self, id: PageId, now: u64) -> Option<(PageHandle, f64)> {
        self.cold.lock().hit(id, now)
    }

    /// Builds a page and fills it from disk.
    fn materialize(&self, id: PageId) -> CacheResult<PageHandle> {
        let page = Arc::new(Page::new(id, self.page_size));
        {
            let mut data = page.write();
            self.heap.read_page(id, &mut data)?;
        }
        Ok(page)
    }

    /// Places a freshly materialized page into a tier and pins it.
    fn admit(&self, page: PageHandle, now: u64) -> CacheResult<PageHandle> {
        let id = page.id();
        let (threshold, admit_p) = {
            let t = self.tunables.read();
            (t.promotion_threshold, t.admission_probability)
        };
        let placement = self.admission.decide(admit_p);

        let mut hot = self.hot.lock();
        let mut cold = self.cold.lock();

        // Another thread may have materialized the same id in the
        // window after our tier lookups; keep the resident copy.
        if let Some((existing, _)) = hot.hit(id, now) {
            return Ok(existing);
        }
        if let Some((existing, _)) = cold.hit(id, now) {
            return Ok(existing);
        }

        let entry = MiraPage::new(Arc::clone(&page), now);
        match placement {
            Placement::Hot => {
                self.make_room_in_hot(&mut hot, &mut cold, threshold)?;
                hot.push_front(entry);
                let _ = hot.pin(id);
            }
            Placement::Cold => {
                self.make_room_in_cold(&mut cold)?;
                cold.push_front(entry);
                let _ = cold.pin(id);
            }
        }
        self.stats.record_insert();
        Ok(page)
    }

    /// Serves a forced miss: a resident page has its bytes re-read from
    /// disk in place, an absent one takes the ordinary miss path.
    fn forced_refresh(&self, id: PageId, now: u64) -> CacheResult<PageHandle> {
        let resident = {
            let mut hot = self.hot.lock();
            let quiescent = hot.pin_count(id) == 0;
            hot.hit(id, now).map(|(handle, _)| (handle, quiescent))
        };
        let resident = match resident {
            Some(found) => Some(found),
            None => {
                let mut cold = self.cold.lock();
                let quiescent = cold.pin_count(id) == 0;
                cold.hit(id, now).map(|(handle, _)| (handle, quiescent))
            }
        };

        match resident {
            Some((handle, quiescent)) => {
                // A page pinned by another consumer may have writes in
                // flight; leave its buffer alone.
                if quiescent {
                    self.write_back(&handle)?;
                    let mut data = handle.write();
                    self.heap.read_page(id, &mut data)?;
                }
                Ok(handle)
            }
            None => {
                let page = self.materialize(id)?;
                self.admit(page, now)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Promotion, demotion, eviction
    // -------------------------------------------------------------------------

    /// Moves `id` from cold to hot, making room first.
    ///
    /// A no-op when `id` already left the cold tier.
    fn promote(&self, id: PageId) -> CacheResult<()> {
        let threshold = self.tunables.read().promotion_threshold;
        let mut hot = self.hot.lock();
        let mut cold = self.cold.lock();

        if !cold.contains(id) {
            return Ok(());
        }

        if hot.len() >= hot.capacity() {
            self.demote_coolest(&mut hot, &mut cold, threshold)?;
        }
        self.make_room_in_hot(&mut hot, &mut cold, threshold)?;

        if let Some((entry, pins)) = cold.take_with_pins(id) {
            hot.insert_with_pins(entry, pins);
            self.stats.record_promote();
            debug!(page = %id, "promoted cold -> hot");
        }
        Ok(())
    }

    /// Evicts cold LRU victims until the tier is under capacity.
    fn make_room_in_cold(&self, cold: &mut Tier) -> CacheResult<()> {
        while cold.len() >= cold.capacity() {
            if !self.evict_strict(cold)? {
                warn!(
                    tier = cold.name(),
                    len = cold.len(),
                    capacity = cold.capacity(),
                    "every candidate pinned; tier over capacity"
                );
                break;
            }
        }
        Ok(())
    }

    /// Frees hot slots until the tier is under capacity, preferring to
    /// demote cooled-off victims over dropping them.
    fn make_room_in_hot(&self, hot: &mut Tier, cold: &mut Tier, threshold: f64) -> CacheResult<()> {
        while hot.len() >= hot.capacity() {
            if !self.evict_or_demote_hot(hot, cold, threshold)? {
                warn!(
                    tier = hot.name(),
                    len = hot.len(),
                    capacity = hot.capacity(),
                    "every candidate pinned; tier over capacity"
                );
                break;
            }
        }
        Ok(())
    }

    /// Removes the tier's LRU unpinned page, writing it back first if
    /// dirty. Returns false when every resident page is pinned.
    fn evict_strict(&self, tier: &mut Tier) -> CacheResult<bool> {
        let Some(victim) = tier.lru_unpinned_victim() else {
            return Ok(false);
        };
        if let Some(entry) = tier.peek(victim) {
            self.write_back(entry.page())?;
        }
        tier.remove(victim);
        self.stats.record_eviction();
        debug!(tier = tier.name(), page = %victim, "evicted");
        Ok(true)
    }

    /// Frees one hot slot: the LRU unpinned victim is written back if
    /// dirty, then demoted when its heat is below the threshold and
    /// dropped otherwise.
    fn evict_or_demote_hot(
        &self,
        hot: &mut Tier,
        cold: &mut Tier,
        threshold: f64,
    ) -> CacheResult<bool> {
        let Some(victim) = hot.lru_unpinned_victim() else {
            return Ok(false);
        };

        let mut heat = f64::INFINITY;
        if let Some(entry) = hot.peek(victim) {
            heat = entry.heat();
            self.write_back(entry.page())?;
        }

        if heat < threshold {
            self.make_room_in_cold(cold)?;
            if let Some((entry, pins)) = hot.take_with_pins(victim) {
                cold.insert_with_pins(entry, pins);
            }
            self.stats.record_demote();
            debug!(page = %victim, "demoted hot -> cold");
        } else {
            hot.remove(victim);
            self.stats.record_eviction();
            debug!(tier = "hot", page = %victim, "evicted");
        }
        Ok(true)
    }

    /// Demotes the coolest unpinned hot page below the threshold, if
    /// one exists. Its writeback is deferred to the eventual eviction.
    fn demote_coolest(&self, hot: &mut Tier, cold: &mut Tier, threshold: f64) -> CacheResult<bool> {
        let Some(victim) = hot.coolest_below(threshold) else {
            return Ok(false);
        };
        self.make_room_in_cold(cold)?;
        if let Some((entry, pins)) = hot.take_with_pins(victim) {
            cold.insert_with_pins(entry, pins);
            self.stats.record_demote();
            debug!(page = %victim, "demoted hot -> cold");
        }
        Ok(true)
    }

    /// Writes the page to the heap file if dirty and clears the flag.
    ///
    /// The dirty flag is cleared while the shared read lock is still
    /// held, so a writer that sneaks in afterwards re-dirties the page
    /// rather than losing its flag.
    fn write_back(&self, page: &Page) -> CacheResult<()> {
        if page.is_dirty() {
            let data = page.read();
            self.heap.write_page(page.id(), &data)?;
            page.set_dirty(false);
            self.stats.record_flush();
        }
        Ok(())
    }
}

impl PageCache for MiraCache {
    fn new_page(&self) -> CacheResult<PageHandle> {
        let id = self.heap.new_page_id()?;
        let page = Arc::new(Page::new(id, self.page_size));
        let now = self.now_ms();
        self.admit(page, now)
    }

    fn fetch_page(&self, id: PageId) -> CacheResult<PageHandle> {
        if id.as_u32() >= self.heap.page_count() {
            return Err(CacheError::page_not_found(id));
        }
        let now = self.now_ms();

        let force_p = self.tunables.read().force_miss_probability;
        if force_p > 0.0 && self.admission.roll(force_p) {
            self.stats.record_miss();
            return self.forced_refresh(id, now);
        }

        if let Some(handle) = self.lookup_hot(id, now) {
            self.stats.record_hit();
            return Ok(handle);
        }

        if let Some((handle, heat)) = self.lookup_cold(id, now) {
            self.stats.record_hit();
            let threshold = self.tunables.read().promotion_threshold;
            if heat > threshold {
                if let Err(e) = self.promote(id) {
                    warn!(page = %id, error = %e, "promotion aborted on writeback failure");
                }
            }
            return Ok(handle);
        }

        self.stats.record_miss();
        let page = self.materialize(id)?;
        self.admit(page, now)
    }

    fn pin_page(&self, page: &Page) {
        let id = page.id();
        let mut hot = self.hot.lock();
        let mut cold = self.cold.lock();

        if hot.pin(id).is_some() || cold.pin(id).is_some() {
            return;
        }
        debug_assert!(false, "pin of page {id} that is not resident");
        warn!(page = %id, "pin of uncached page ignored");
    }

    fn unpin_page(&self, page: &Page, dirty: bool) {
        if dirty {
            page.set_dirty(true);
        }
        let id = page.id();

        let reached_zero = {
            let mut hot = self.hot.lock();
            let mut cold = self.cold.lock();
            match hot.unpin(id).or_else(|| cold.unpin(id)) {
                Some(0) => true,
                Some(_) => false,
                None => {
                    debug_assert!(false, "unpin of page {id} that is not pinned");
                    warn!(page = %id, "unbalanced unpin ignored");
                    false
                }
            }
        };

        // Last pin gone on a dirty page: write it back synchronously,
        // outside the tier mutexes. A concurrent fetch may re-pin the
        // page first; the write is then merely early, never wrong.
        if reached_zero && page.is_dirty() {
            if let Err(e) = self.write_back(page) {
                error!(page = %id, error = %e, "writeback after unpin failed");
            }
        }
    }

    fn flush_page(&self, page: &Page) -> CacheResult<()> {
        self.write_back(page)
    }

    fn flush_all(&self) -> usize {
        let mut flushed = 0;
        for tier_mutex in [&self.hot, &self.cold] {
            let tier = tier_mutex.lock();
            for entry in tier.iter() {
                let page = entry.page();
                if !page.is_dirty() {
                    continue;
                }
                match self.write_back(page) {
                    Ok(()) => flushed += 1,
                    Err(e) => {
                        error!(page = %page.id(), error = %e, "flush failed; continuing");
                    }
                }
            }
        }
        flushed
    }

    fn size(&self) -> usize {
        let hot = self.hot.lock().len();
        let cold = self.cold.lock().len();
        hot + cold
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

impl Drop for MiraCache {
    fn drop(&mut self) {
        let flushed = self.flush_all();
        if flushed > 0 {
            debug!(flushed, "flushed dirty pages on cache drop");
        }
    }
}

impl std::fmt::Debug for MiraCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (hot, cold) = self.occupancy();
        f.debug_struct("MiraCache")
            .field("path", &self.heap.path())
            .field("page_size", &self.page_size)
            .field("hot_len", &hot)
            .field("cold_len", &cold)
            .field("stats", &self.stats())
            .finish()
    }
}
