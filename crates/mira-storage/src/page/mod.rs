//! Page buffers and their locking.
//!
//! A [`Page`] is the unit of caching and I/O: a fixed-size byte buffer
//! tagged with its [`PageId`], a dirty flag, and a reader/writer lock
//! over the contents. The lock supports an **upgradable read** mode so a
//! consumer can inspect a page under a shared lock and atomically
//! upgrade to an exclusive writer without releasing it in between.
//!
//! The cache hands out pinned `Arc<Page>` handles; content access always
//! goes through [`Page::read`], [`Page::upgradable_read`] or
//! [`Page::write`]. The dirty flag is an atomic so it can be set and
//! cleared without touching the content lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mira_common::types::PageId;
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};

#[cfg(debug_assertions)]
use std::sync::atomic::AtomicU32;

/// Shared handle to a cached page.
///
/// A handle returned by the cache is pinned: the page will not be
/// evicted until the handle's pin is released via `unpin_page`.
pub type PageHandle = Arc<Page>;

/// Shared read guard over a page's contents.
pub type PageReadGuard<'a> = RwLockReadGuard<'a, Box<[u8]>>;

/// Upgradable read guard over a page's contents.
///
/// Upgrade with [`RwLockUpgradableReadGuard::upgrade`]; the upgrade
/// blocks until concurrent shared readers drain.
pub type PageUpgradeGuard<'a> = RwLockUpgradableReadGuard<'a, Box<[u8]>>;

/// Exclusive write guard over a page's contents.
pub type PageWriteGuard<'a> = RwLockWriteGuard<'a, Box<[u8]>>;

/// A fixed-size page buffer identified by a [`PageId`].
///
/// Pin counts are tracked by the cache's pin table, guarded by the tier
/// mutexes; the page itself carries a pin mirror only in debug builds,
/// to catch unbalanced pin/unpin sequences.
pub struct Page {
    /// Identifier within the backing heap file.
    id: PageId,
    /// Page contents.
    data: RwLock<Box<[u8]>>,
    /// Whether the in-memory bytes differ from the on-disk copy.
    dirty: AtomicBool,
    /// Debug-only mirror of the cache's pin count.
    #[cfg(debug_assertions)]
    pin_mirror: AtomicU32,
}

impl Page {
    /// Creates a new page with a zeroed buffer of `page_size` bytes.
    pub fn new(id: PageId, page_size: usize) -> Self {
        Self {
            id,
            data: RwLock::new(vec![0u8; page_size].into_boxed_slice()),
            dirty: AtomicBool::new(false),
            #[cfg(debug_assertions)]
            pin_mirror: AtomicU32::new(0),
        }
    }

    /// Returns the page ID.
    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Returns the size of the page buffer in bytes.
    ///
    /// The content lock is taken briefly; the size never changes after
    /// construction.
    pub fn page_size(&self) -> usize {
        self.data.read().len()
    }

    /// Acquires a shared read lock on the page contents.
    #[inline]
    pub fn read(&self) -> PageReadGuard<'_> {
        self.data.read()
    }

    /// Acquires an upgradable read lock on the page contents.
    ///
    /// At most one upgradable reader exists at a time; it coexists with
    /// shared readers and can be upgraded to an exclusive writer.
    #[inline]
    pub fn upgradable_read(&self) -> PageUpgradeGuard<'_> {
        self.data.upgradable_read()
    }

    /// Acquires an exclusive write lock on the page contents.
    ///
    /// Writing does not set the dirty flag by itself; callers declare
    /// dirtiness through `unpin_page(.., dirty: true)` or
    /// [`Page::set_dirty`].
    #[inline]
    pub fn write(&self) -> PageWriteGuard<'_> {
        self.data.write()
    }

    /// Returns true if the page is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Sets or clears the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Records a pin in the debug mirror.
    #[inline]
    pub(crate) fn note_pin(&self) {
        #[cfg(debug_assertions)]
        self.pin_mirror.fetch_add(1, Ordering::AcqRel);
    }

    /// Records an unpin in the debug mirror.
    #[inline]
    pub(crate) fn note_unpin(&self) {
        #[cfg(debug_assertions)]
        {
            let old = self.pin_mirror.fetch_sub(1, Ordering::AcqRel);
            debug_assert!(old > 0, "unpinned page {} with pin count 0", self.id);
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
