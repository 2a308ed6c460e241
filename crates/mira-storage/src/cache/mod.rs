//! The tiered page cache.
//!
//! The cache sits between a paged index and a heap file, keeping
//! recently used pages in memory across two tiers:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        MiraCache                           │
//! │   ┌───────────────────────┐   ┌────────────────────────┐   │
//! │   │       hot tier        │   │       cold tier        │   │
//! │   │  LRU list + id index  │◄──┤  LRU list + id index   │   │
//! │   │  + pin table          ├──►│  + pin table           │   │
//! │   └───────────────────────┘   └────────────────────────┘   │
//! │        promotion (heat > threshold)  /  demotion           │
//! │                            │                               │
//! │                            ▼                               │
//! │   ┌────────────────────────────────────────────────────┐   │
//! │   │        HeapFile (reads, writebacks, new ids)       │   │
//! │   └────────────────────────────────────────────────────┘   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! New pages are admitted to cold with high probability; pages whose
//! heat (access frequency weighted by recency) crosses a threshold are
//! promoted to hot, and cooled-off hot pages are demoted back. Pinned
//! pages are never evicted; dirty pages are written back before they
//! leave the cache.
//!
//! # Lock order
//!
//! `hot` before `cold` before the heap file's internal mutex. A page's
//! content lock is only ever held across tier operations for the page
//! being inserted or returned.

mod admission;
mod config;
mod entry;
mod error;
mod mem;
mod mira;
mod pin;
mod stats;
mod tier;

pub use admission::{AdmissionEngine, Placement};
pub use config::CacheConfig;
pub use entry::MiraPage;
pub use error::{CacheError, CacheResult};
pub use mem::MemPageCache;
pub use mira::{MiraCache, TierKind};
pub use pin::PinTable;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use tier::Tier;

use mira_common::types::PageId;

use crate::page::{Page, PageHandle};

/// The page cache contract consumed by a paged index.
///
/// Handles returned by [`new_page`](PageCache::new_page) and
/// [`fetch_page`](PageCache::fetch_page) arrive pinned; the consumer
/// releases them with [`unpin_page`](PageCache::unpin_page), declaring
/// at that point whether the content was modified. Content access goes
/// through the page's own lock ([`Page::upgradable_read`] and friends).
pub trait PageCache: Send + Sync {
    /// Allocates a fresh page with a new unique id and a zeroed buffer.
    ///
    /// The returned handle is pinned once.
    fn new_page(&self) -> CacheResult<PageHandle>;

    /// Returns the page named `id`, reading it from the backing store
    /// on a miss.
    ///
    /// The returned handle is pinned once. Fails with
    /// [`CacheError::PageNotFound`] if `id` was never allocated.
    fn fetch_page(&self, id: PageId) -> CacheResult<PageHandle>;

    /// Adds a pin to a live page.
    fn pin_page(&self, page: &Page);

    /// Releases one pin on a live page.
    ///
    /// With `dirty` set, the page is marked modified; when the last pin
    /// drops on a dirty page it is written back.
    fn unpin_page(&self, page: &Page, dirty: bool);

    /// Writes the page back if dirty and clears its dirty flag.
    fn flush_page(&self, page: &Page) -> CacheResult<()>;

    /// Writes back every dirty cached page, best-effort.
    ///
    /// Returns the number of pages written.
    fn flush_all(&self) -> usize;

    /// Returns the number of cached pages.
    fn size(&self) -> usize;

    /// Returns the page size in bytes.
    fn page_size(&self) -> usize;
}
