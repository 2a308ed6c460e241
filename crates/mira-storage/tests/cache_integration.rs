//! End-to-end tests for the tiered page cache over a real heap file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mira_common::types::PageId;
use mira_storage::cache::{CacheConfig, MiraCache, PageCache, TierKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn small_config(dir: &tempfile::TempDir, hot: usize, cold: usize) -> CacheConfig {
    CacheConfig::new(dir.path().join("cache.heap"), true)
        .with_page_size(512)
        .with_capacities(hot, cold)
        .with_admission_probability(0.0)
}

/// Allocates `count` pages and unpins each, returning their ids.
fn allocate_unpinned(cache: &MiraCache, count: usize) -> Vec<PageId> {
    (0..count)
        .map(|_| {
            let page = cache.new_page().unwrap();
            let id = page.id();
            cache.unpin_page(&page, false);
            id
        })
        .collect()
}

#[test]
fn cold_page_promotes_to_hot_under_repeated_access() {
    let dir = tempdir().unwrap();
    let cache = MiraCache::open(small_config(&dir, 2, 4).with_promotion_threshold(2.0)).unwrap();

    let ids = allocate_unpinned(&cache, 6);
    assert_eq!(cache.tier_of(ids[3]), Some(TierKind::Cold));

    for _ in 0..4 {
        let page = cache.fetch_page(ids[3]).unwrap();
        cache.unpin_page(&page, false);
    }

    assert_eq!(cache.tier_of(ids[3]), Some(TierKind::Hot));
    assert!(cache.stats().promotes >= 1);
}

#[test]
fn cold_tier_evicts_in_lru_order() {
    let dir = tempdir().unwrap();
    let cache =
        MiraCache::open(small_config(&dir, 1, 3).with_promotion_threshold(f64::INFINITY)).unwrap();

    let ids = allocate_unpinned(&cache, 4);

    // The oldest insertion went first.
    assert_eq!(cache.tier_of(ids[0]), None);
    for id in &ids[1..] {
        assert_eq!(cache.tier_of(*id), Some(TierKind::Cold));
    }

    let page = cache.fetch_page(ids[0]).unwrap();
    cache.unpin_page(&page, false);
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn pinned_pages_survive_capacity_pressure() {
    let dir = tempdir().unwrap();
    let cache = MiraCache::open(small_config(&dir, 1, 2)).unwrap();

    let a = cache.new_page().unwrap();
    let b = cache.new_page().unwrap();

    // Overflows the cold tier while both residents are pinned.
    let c = cache.new_page().unwrap();
    assert_eq!(cache.stats().evictions, 0);
    let (_, cold_len) = cache.occupancy();
    assert_eq!(cold_len, 3);

    cache.unpin_page(&a, false);
    let d = cache.new_page().unwrap();
    assert_eq!(cache.tier_of(a.id()), None);
    assert!(cache.stats().evictions >= 1);

    for page in [&b, &c, &d] {
        cache.unpin_page(page, false);
    }
}

#[test]
fn dirty_page_survives_eviction_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.heap");
    let id;
    {
        let cache = MiraCache::open(
            CacheConfig::new(&path, true)
                .with_page_size(512)
                .with_capacities(1, 2)
                .with_admission_probability(0.0),
        )
        .unwrap();

        let page = cache.new_page().unwrap();
        id = page.id();
        page.write().fill(0xAB);
        cache.unpin_page(&page, true);
        assert!(cache.stats().flushes >= 1);

        // Push the page out of the cache entirely.
        allocate_unpinned(&cache, 4);
        assert_eq!(cache.tier_of(id), None);
    }

    let cache = MiraCache::open(
        CacheConfig::new(&path, false)
            .with_page_size(512)
            .with_capacities(1, 2),
    )
    .unwrap();
    let page = cache.fetch_page(id).unwrap();
    assert!(page.read().iter().all(|&b| b == 0xAB));
    cache.unpin_page(&page, false);
}

#[test]
fn flush_all_twice_flushes_nothing_the_second_time() {
    let dir = tempdir().unwrap();
    let cache = MiraCache::open(small_config(&dir, 2, 8)).unwrap();

    let pages: Vec<_> = (0..5).map(|_| cache.new_page().unwrap()).collect();
    for (i, page) in pages.iter().enumerate() {
        page.write().fill(i as u8 + 1);
        page.set_dirty(true);
    }

    let first = cache.flush_all();
    assert_eq!(first, 5);
    let flushes_after_first = cache.stats().flushes;

    let second = cache.flush_all();
    assert_eq!(second, 0);
    assert_eq!(cache.stats().flushes, flushes_after_first);

    for page in &pages {
        cache.unpin_page(page, false);
    }
}

#[test]
fn pressure_eviction_prefers_cold() {
    let dir = tempdir().unwrap();
    let cache = MiraCache::open(
        CacheConfig::new(dir.path().join("cache.heap"), true)
            .with_page_size(512)
            .with_capacities(8, 8)
            .with_promotion_threshold(f64::INFINITY)
            .with_admission_probability(1.0),
    )
    .unwrap();

    allocate_unpinned(&cache, 8); // fills hot
    cache.set_admission_probability(0.0);
    allocate_unpinned(&cache, 8); // fills cold
    assert_eq!(cache.occupancy(), (8, 8));

    let (_, cold_before) = cache.occupancy();
    let freed = cache.evict_under_pressure(6);
    let (_, cold_after) = cache.occupancy();

    assert!(freed >= 6);
    assert!(cold_before - cold_after >= 3);
}

#[test]
fn random_bytes_round_trip_through_eviction() {
    let dir = tempdir().unwrap();
    let cache = MiraCache::open(small_config(&dir, 1, 2)).unwrap();
    let mut rng = StdRng::seed_from_u64(0xB10C_CAFE);

    let page = cache.new_page().unwrap();
    let id = page.id();
    let mut expected = vec![0u8; 512];
    rng.fill(expected.as_mut_slice());
    {
        let mut data = page.write();
        data.copy_from_slice(&expected);
    }
    cache.unpin_page(&page, true);

    assert!(cache.evict_under_pressure(8) >= 1);
    assert_eq!(cache.tier_of(id), None);

    let fetched = cache.fetch_page(id).unwrap();
    assert_eq!(&fetched.read()[..], expected.as_slice());
    cache.unpin_page(&fetched, false);
}

#[test]
fn marker_survives_flush_and_new_cache_over_same_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.heap");
    let id;
    {
        let cache = MiraCache::open(
            CacheConfig::new(&path, true)
                .with_page_size(512)
                .with_capacities(2, 4),
        )
        .unwrap();
        let page = cache.new_page().unwrap();
        id = page.id();
        page.write()[0..4].copy_from_slice(b"mira");
        cache.unpin_page(&page, true);
        cache.flush_all();
    }

    let cache = MiraCache::open(
        CacheConfig::new(&path, false)
            .with_page_size(512)
            .with_capacities(2, 4),
    )
    .unwrap();
    let page = cache.fetch_page(id).unwrap();
    assert_eq!(&page.read()[0..4], b"mira");
    cache.unpin_page(&page, false);
}

#[test]
fn fetch_on_empty_file_fails() {
    let dir = tempdir().unwrap();
    let cache = MiraCache::open(small_config(&dir, 2, 4)).unwrap();
    assert!(cache.fetch_page(PageId::new(0)).is_err());
}

#[test]
fn new_page_succeeds_with_every_candidate_pinned() {
    let dir = tempdir().unwrap();
    let cache = MiraCache::open(small_config(&dir, 1, 2)).unwrap();

    // Pin enough pages to fill both tiers past capacity.
    let held: Vec<_> = (0..4).map(|_| cache.new_page().unwrap()).collect();

    let extra = cache.new_page().unwrap();
    assert_eq!(cache.stats().evictions, 0);
    assert_eq!(cache.size(), 5);

    cache.unpin_page(&extra, false);
    for page in &held {
        cache.unpin_page(page, false);
    }
}

#[test]
fn concurrent_writers_round_trip_their_pages() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(
        MiraCache::open(
            CacheConfig::new(dir.path().join("cache.heap"), true)
                .with_page_size(512)
                .with_capacities(16, 48)
                .with_admission_probability(0.1),
        )
        .unwrap(),
    );
    let fetches = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for tid in 0..8u64 {
        let cache = Arc::clone(&cache);
        let fetches = Arc::clone(&fetches);
        handles.push(std::thread::spawn(move || {
            let mut owned = Vec::new();
            for i in 0..50u64 {
                let marker = 1 + ((tid * 53 + i) % 255) as u8;
                let page = cache.new_page().unwrap();
                page.write().fill(marker);
                let id = page.id();
                cache.unpin_page(&page, true);
                owned.push((id, marker));

                // Revisit an earlier page now and then.
                if i % 7 == 0 && !owned.is_empty() {
                    let (id, marker) = owned[(i as usize / 7) % owned.len()];
                    let page = cache.fetch_page(id).unwrap();
                    fetches.fetch_add(1, Ordering::Relaxed);
                    assert!(page.read().iter().all(|&b| b == marker));
                    cache.unpin_page(&page, false);
                }
            }
            owned
        }));
    }

    let mut all_pages = Vec::new();
    for handle in handles {
        all_pages.extend(handle.join().unwrap());
    }
    assert_eq!(all_pages.len(), 400);

    // Every page still carries its marker, resident or not.
    for (id, marker) in &all_pages {
        let page = cache.fetch_page(*id).unwrap();
        fetches.fetch_add(1, Ordering::Relaxed);
        assert!(page.read().iter().all(|&b| b == *marker));
        cache.unpin_page(&page, false);
    }

    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, fetches.load(Ordering::Relaxed));

    // With every pin released, the tiers are back within capacity.
    let (hot, cold) = cache.occupancy();
    assert!(hot <= 16);
    assert!(cold <= 48);
}

#[test]
fn random_operation_sequence_preserves_content_and_counters() {
    let dir = tempdir().unwrap();
    let cache = MiraCache::open(
        CacheConfig::new(dir.path().join("cache.heap"), true)
            .with_page_size(512)
            .with_capacities(4, 12)
            .with_promotion_threshold(2.0)
            .with_admission_probability(0.1),
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(20_240_601);
    let mut allocated: Vec<PageId> = Vec::new();
    let mut written: Vec<PageId> = Vec::new();
    let mut held = Vec::new();
    let mut fetch_calls = 0u64;

    for step in 0..2000 {
        match rng.gen_range(0..100) {
            0..=24 => {
                let page = cache.new_page().unwrap();
                allocated.push(page.id());
                cache.unpin_page(&page, false);
            }
            25..=69 if !allocated.is_empty() => {
                let id = allocated[rng.gen_range(0..allocated.len())];
                let page = cache.fetch_page(id).unwrap();
                fetch_calls += 1;
                let dirty = rng.gen_bool(0.4);
                if dirty {
                    page.write().fill(pattern_for(id));
                    written.push(id);
                }
                if rng.gen_bool(0.1) {
                    held.push(page);
                } else {
                    cache.unpin_page(&page, dirty);
                }
            }
            70..=79 if !held.is_empty() => {
                let page = held.swap_remove(rng.gen_range(0..held.len()));
                cache.unpin_page(&page, false);
            }
            80..=89 => {
                cache.flush_all();
            }
            90..=94 => {
                cache.evict_under_pressure(rng.gen_range(1..8));
            }
            _ => {
                // Counter sums stay coherent throughout.
                let stats = cache.stats();
                assert_eq!(stats.hits + stats.misses, fetch_calls, "at step {step}");
            }
        }
    }

    // Pages parked in `held` were possibly written but never declared
    // dirty at unpin time; flush their bytes explicitly.
    for page in held.drain(..) {
        cache.unpin_page(&page, true);
    }
    cache.flush_all();
    assert_eq!(cache.flush_all(), 0);

    // Every page that was ever written still reads back its pattern;
    // untouched pages read back zeroes.
    for &id in &allocated {
        let page = cache.fetch_page(id).unwrap();
        fetch_calls += 1;
        let expected = if written.contains(&id) {
            pattern_for(id)
        } else {
            0
        };
        assert!(
            page.read().iter().all(|&b| b == expected),
            "page {id} lost its content"
        );
        cache.unpin_page(&page, false);
    }

    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, fetch_calls);
}

fn pattern_for(id: PageId) -> u8 {
    1 + (id.as_u32() % 255) as u8
}
