use std::ops::Deref;
use std::sync::RwLock;

/// Size of a data page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Invalid page id, carried by frames with no page mapped in.
pub const INVALID_PAGE_ID: PageId = -1;

/// Page ids are allocated monotonically by the buffer pool and never
/// reused.
pub type PageId = i64;

/// Frame ids index the buffer pool's page array, in [0, pool_size).
pub type FrameId = usize;

/// The actual page frame content: the on-disk image plus the in-memory
/// bookkeeping (dirty bit, pin count).
pub struct PageData {
    pub id: PageId,
    pub data: Vec<u8>,
    pub is_dirty: bool,
    pub pin_count: u32,
}

impl PageData {
    fn new() -> Self {
        PageData {
            id: INVALID_PAGE_ID,
            data: vec![0; PAGE_SIZE],
            is_dirty: false,
            pin_count: 0,
        }
    }

    /// Restore the frame to its freshly-allocated state: zeroed data,
    /// no page id, clean, unpinned.
    pub fn reset(&mut self) {
        self.id = INVALID_PAGE_ID;
        self.is_dirty = false;
        self.pin_count = 0;
        self.data.fill(0);
    }
}

/// Page acts as the container of the actual page data, providing the
/// per-page reader/writer latch.
pub struct Page {
    inner: RwLock<PageData>,
}

impl Page {
    /// Allocate a page frame in memory with PAGE_SIZE zeroed bytes and
    /// the metadata in its initial state.
    pub fn new() -> Self {
        Page { inner: RwLock::new(PageData::new()) }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}

impl Deref for Page {
    type Target = RwLock<PageData>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset() {
        let page = Page::new();
        let mut guard = page.write().unwrap();
        guard.id = 3;
        guard.pin_count = 2;
        guard.is_dirty = true;
        guard.data[0] = 0xff;

        guard.reset();
        assert_eq!(INVALID_PAGE_ID, guard.id);
        assert_eq!(0, guard.pin_count);
        assert!(!guard.is_dirty);
        assert_eq!(vec![0u8; PAGE_SIZE], guard.data);
    }
}
