use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::storage::bufferpool::BufferPoolManager;
use crate::storage::page::{Page, PageData, PageId};

/// RAII wrapper over a pinned page: the pin taken at construction is
/// released exactly once when the guard goes out of scope, together
/// with the dirty mark the holder accumulated.
///
/// The page's reader/writer latch is taken per access through read()
/// and write() rather than held for the guard's lifetime; the pin, not
/// the latch, is what the guard holds on to.
pub struct PageGuard {
    bpm: BufferPoolManager,
    page: Arc<Page>,
    page_id: PageId,
    is_dirty: bool,
}

impl PageGuard {
    pub(crate) fn new(bpm: BufferPoolManager, page: Arc<Page>, page_id: PageId) -> Self {
        PageGuard { bpm, page, page_id, is_dirty: false }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Latch the page for reading.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, PageData>> {
        Ok(self.page.read()?)
    }

    /// Latch the page for writing; the guard remembers the page was
    /// modified and reports it dirty on drop.
    pub fn write(&mut self) -> Result<RwLockWriteGuard<'_, PageData>> {
        self.is_dirty = true;
        Ok(self.page.write()?)
    }

    /// Record that the holder modified the page without going through
    /// write().
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        // the pool tolerates a page deleted underneath the guard
        let _ = self.bpm.unpin_page(self.page_id, self.is_dirty);
    }
}

/// Guard for shared access: exposes only the read latch.
pub struct ReadPageGuard {
    inner: PageGuard,
}

impl ReadPageGuard {
    pub(crate) fn new(inner: PageGuard) -> Self {
        ReadPageGuard { inner }
    }

    pub fn page_id(&self) -> PageId {
        self.inner.page_id()
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, PageData>> {
        self.inner.read()
    }
}

/// Guard for exclusive access, marked dirty from construction: the
/// holder is assumed to modify the page.
pub struct WritePageGuard {
    inner: PageGuard,
}

impl WritePageGuard {
    pub(crate) fn new(mut inner: PageGuard) -> Self {
        inner.mark_dirty();
        WritePageGuard { inner }
    }

    pub fn page_id(&self) -> PageId {
        self.inner.page_id()
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, PageData>> {
        self.inner.read()
    }

    pub fn write(&mut self) -> Result<RwLockWriteGuard<'_, PageData>> {
        self.inner.write()
    }
}
