//! Trivial in-memory page cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use mira_common::types::PageId;
use parking_lot::RwLock;

use super::error::{CacheError, CacheResult};
use super::PageCache;
use crate::page::{Page, PageHandle};

/// A [`PageCache`] that keeps every page in memory and never evicts.
///
/// Useful for testing a paged index without a backing file: ids are
/// issued from an in-process counter, pins are ignored, and flushes
/// only clear dirty flags.
pub struct MemPageCache {
    page_size: usize,
    next_id: AtomicU32,
    pages: RwLock<HashMap<PageId, PageHandle>>,
}

impl MemPageCache {
    /// Creates an empty cache producing pages of `page_size` bytes.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            next_id: AtomicU32::new(0),
            pages: RwLock::new(HashMap::new()),
        }
    }
}

impl PageCache for MemPageCache {
    fn new_page(&self) -> CacheResult<PageHandle> {
        let id = PageId::new(self.next_id.fetch_add(1, Ordering::AcqRel));
        let page = Arc::new(Page::new(id, self.page_size));
        self.pages.write().insert(id, Arc::clone(&page));
        Ok(page)
    }

    fn fetch_page(&self, id: PageId) -> CacheResult<PageHandle> {
        self.pages
            .read()
            .get(&id)
            .cloned()
            .ok_or(CacheError::PageNotFound { page_id: id })
    }

    fn pin_page(&self, _page: &Page) {}

    fn unpin_page(&self, page: &Page, dirty: bool) {
        if dirty {
            page.set_dirty(true);
        }
    }

    fn flush_page(&self, page: &Page) -> CacheResult<()> {
        page.set_dirty(false);
        Ok(())
    }

    fn flush_all(&self) -> usize {
        let pages = self.pages.read();
        let mut cleared = 0;
        for page in pages.values() {
            if page.is_dirty() {
                page.set_dirty(false);
                cleared += 1;
            }
        }
        cleared
    }

    fn size(&self) -> usize {
        self.pages.read().len()
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

impl std::fmt::Debug for MemPageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemPageCache")
            .field("page_size", &self.page_size)
            .field("pages", &self.size())
            .finish()
    }
}
