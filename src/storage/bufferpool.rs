use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::{Error, Result};
use crate::storage::page::{FrameId, Page, PageId, PAGE_SIZE};
use crate::storage::page_guard::{PageGuard, ReadPageGuard, WritePageGuard};
use crate::storage::replacer::{AccessType, Replacer, SyncLRUKReplacer};
use crate::storage::scheduler::{DiskData, DiskRequest, DiskScheduler};
use crate::storage::DiskManager;

/// The buffer pool is responsible for moving physical pages back and
/// forth between main memory and the disk. It allows the DBMS to
/// support databases larger than the amount of memory available to the
/// system.
///
/// The buffer pool's operations are transparent to the rest of the
/// system: callers ask for a page by its page id and do not know
/// whether it is already in memory or has to be brought in from disk.
struct BufferPool {
    /// array of page frames. the array index is the FrameId, i.e. the
    /// FrameId is in range [0, pool_size).
    pages: Vec<Arc<Page>>,
    /// page table keeping track of resident pages.
    page_table: HashMap<PageId, FrameId>,
    /// frames currently holding no page.
    free_list: Vec<FrameId>,
    /// replacer to find unpinned frames for replacement.
    replacer: Arc<dyn Replacer>,
    /// dispatches reads and writes to the disk manager.
    scheduler: DiskScheduler,
    /// next page id to allocate. allocated ids are never reused.
    next_page_id: PageId,
}

impl BufferPool {
    fn new(disk: Arc<dyn DiskManager>, pool_size: usize, replacer_k: usize) -> Self {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            pages.push(Arc::new(Page::new()));
            // initially, every frame is in the free list
            free_list.push(i);
        }
        BufferPool {
            pages,
            page_table: HashMap::new(),
            free_list,
            replacer: Arc::new(SyncLRUKReplacer::new(pool_size, replacer_k)),
            scheduler: DiskScheduler::new(disk),
            next_page_id: 0,
        }
    }

    /// Create a new page in the buffer pool and return it pinned; the
    /// caller owns one pin and must balance it with unpin_page. Returns
    /// BufferPoolNoAvailableFrame when every frame is in use and
    /// non-evictable, in which case no page id is allocated.
    fn new_page(&mut self) -> Result<Arc<Page>> {
        let frame_id = self.acquire_frame()?;
        let page_id = self.allocate_page();
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        guard.id = page_id;
        guard.pin_count = 1;
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id, AccessType::Unknown);
        self.replacer.set_evictable(frame_id, false);

        drop(guard);
        Ok(page)
    }

    /// Fetch the page with the given page id, reading it from disk if
    /// it is not resident. The caller takes a pin on both a hit and a
    /// miss. Returns BufferPoolNoAvailableFrame when the page would
    /// have to be read but no frame can be freed.
    fn fetch_page(&mut self, page_id: PageId, access_type: AccessType) -> Result<Arc<Page>> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let page = Arc::clone(&self.pages[frame_id]);
            let mut guard = page.write()?;
            guard.pin_count += 1;
            self.replacer.record_access(frame_id, access_type);
            self.replacer.set_evictable(frame_id, false);

            drop(guard);
            return Ok(page);
        }

        let frame_id = self.acquire_frame()?;
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        self.read_from_disk(page_id, &mut guard.data)?;
        guard.id = page_id;
        guard.pin_count = 1;
        guard.is_dirty = false;
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id, access_type);
        self.replacer.set_evictable(frame_id, false);

        drop(guard);
        Ok(page)
    }

    /// Unpin the target page. Returns false if the page is not resident
    /// or its pin count is already zero.
    ///
    /// The dirty flag is a sticky OR: unpinning with is_dirty = false
    /// never cleans a page, only flushing does. When the pin count
    /// reaches zero the frame becomes evictable.
    fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let frame_id = match self.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let page = &self.pages[frame_id];
        let mut guard = page.write()?;
        if is_dirty {
            guard.is_dirty = true;
        }
        if guard.pin_count == 0 {
            return Ok(false);
        }
        guard.pin_count -= 1;
        if guard.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        Ok(true)
    }

    /// Flush the target page to disk regardless of the dirty flag, then
    /// unset the dirty flag. Returns false if the page is not resident.
    fn flush_page(&mut self, page_id: PageId) -> Result<bool> {
        let frame_id = match self.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let page = &self.pages[frame_id];
        let mut guard = page.write()?;
        self.write_to_disk(page_id, &guard.data)?;
        guard.is_dirty = false;
        Ok(true)
    }

    /// Flush every resident page.
    fn flush_all_pages(&mut self) -> Result<()> {
        let page_ids: Vec<PageId> = self.page_table.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Delete a page from the buffer pool. A page that is not resident
    /// needs nothing done and reports true; a pinned page cannot be
    /// deleted and reports false. Otherwise the frame is reset and goes
    /// back on the free list, and the replacer stops tracking it.
    fn delete_page(&mut self, page_id: PageId) -> Result<bool> {
        let frame_id = match self.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        if guard.pin_count > 0 {
            return Ok(false);
        }
        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        self.free_list.push(frame_id);
        guard.reset();
        self.deallocate_page(page_id);
        Ok(true)
    }

    /// Pick a frame to hold a page: the free list first, then an
    /// eviction victim from the replacer. An evicted dirty page is
    /// written back before the frame is handed out, and the old page is
    /// unmapped in every replacement case.
    fn acquire_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.pop() {
            return Ok(frame_id);
        }
        let frame_id = self.replacer.evict().ok_or(Error::BufferPoolNoAvailableFrame)?;
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        if guard.is_dirty {
            debug!("writing back dirty page {} from frame {}", guard.id, frame_id);
            self.write_to_disk(guard.id, &guard.data)?;
        }
        self.page_table.remove(&guard.id);
        guard.reset();
        Ok(frame_id)
    }

    /// Issue a write through the disk scheduler and wait for it.
    fn write_to_disk(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let (promise, future) = self.scheduler.create_promise();
        self.scheduler.schedule(DiskRequest {
            is_write: true,
            data: DiskData::Owned(data.to_vec()),
            page_id,
            done: promise,
        })?;
        if !future.wait()? {
            return Err(Error::internal(format!("write of page {} failed", page_id)));
        }
        Ok(())
    }

    /// Issue a read through the disk scheduler, wait for it, and copy
    /// the result into `data`.
    fn read_from_disk(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        let buf = Arc::new(Mutex::new(vec![0u8; PAGE_SIZE]));
        let (promise, future) = self.scheduler.create_promise();
        self.scheduler.schedule(DiskRequest {
            is_write: false,
            data: DiskData::Shared(Arc::clone(&buf)),
            page_id,
            done: promise,
        })?;
        if !future.wait()? {
            return Err(Error::internal(format!("read of page {} failed", page_id)));
        }
        data.copy_from_slice(&buf.lock()?);
        Ok(())
    }

    fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        page_id
    }

    /// Deallocation is a no-op for the monotonic allocator; page ids
    /// are never reused.
    fn deallocate_page(&mut self, _page_id: PageId) {}
}

/// Buffer pool manager wraps the buffer pool with a mutex for
/// concurrent access; basically all the heavy lifting happens in the
/// buffer pool. The pool latch is held across disk I/O, which
/// serializes all traffic through the pool. The manager is cheap to
/// clone and clones share the same pool.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<Mutex<BufferPool>>,
}

impl BufferPoolManager {
    pub fn new(disk: Arc<dyn DiskManager>, pool_size: usize, replacer_k: usize) -> Self {
        let inner = BufferPool::new(disk, pool_size, replacer_k);
        BufferPoolManager { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Create a new page in the buffer pool, returned pinned.
    pub fn new_page(&self) -> Result<Arc<Page>> {
        let mut inner = self.inner.lock()?;
        inner.new_page()
    }

    /// Fetch the page with the given page id, pinning it.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        self.fetch_page_with(page_id, AccessType::Unknown)
    }

    /// Fetch the page with the given page id, recording the access kind
    /// with the replacer.
    pub fn fetch_page_with(&self, page_id: PageId, access_type: AccessType) -> Result<Arc<Page>> {
        let mut inner = self.inner.lock()?;
        inner.fetch_page(page_id, access_type)
    }

    /// Unpin the target page, recording whether the caller dirtied it.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.unpin_page(page_id, is_dirty)
    }

    /// Flush the target page to disk regardless of the dirty flag.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.flush_page(page_id)
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        inner.flush_all_pages()
    }

    /// Delete a page from the buffer pool; see BufferPool::delete_page.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.delete_page(page_id)
    }

    /// Create a new page and wrap it in a guard that unpins on drop.
    pub fn new_page_guarded(&self) -> Result<PageGuard> {
        let page = self.new_page()?;
        let page_id = page.read()?.id;
        Ok(PageGuard::new(self.clone(), page, page_id))
    }

    /// Fetch a page wrapped in a guard that unpins on drop.
    pub fn fetch_page_guarded(&self, page_id: PageId) -> Result<PageGuard> {
        let page = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self.clone(), page, page_id))
    }

    /// Fetch a page for shared read access.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        Ok(ReadPageGuard::new(self.fetch_page_guarded(page_id)?))
    }

    /// Fetch a page for exclusive write access; the page will be marked
    /// dirty when the guard drops.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        Ok(WritePageGuard::new(self.fetch_page_guarded(page_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::Memory;

    fn new_bpm(pool_size: usize, replacer_k: usize) -> (BufferPoolManager, Arc<Memory>) {
        let disk = Arc::new(Memory::new());
        let bpm = BufferPoolManager::new(disk.clone() as Arc<dyn DiskManager>, pool_size, replacer_k);
        (bpm, disk)
    }

    /// free-list and page-table membership must be mutually exclusive
    /// and cover every frame.
    fn check_frame_bookkeeping(bpm: &BufferPoolManager) {
        let inner = bpm.inner.lock().unwrap();
        let mapped: Vec<FrameId> = inner.page_table.values().copied().collect();
        for frame_id in 0..inner.pages.len() {
            let in_free = inner.free_list.contains(&frame_id);
            let in_table = mapped.contains(&frame_id);
            assert!(in_free ^ in_table, "frame {} free={} mapped={}", frame_id, in_free, in_table);
        }
    }

    #[test]
    fn test_buffer_pool_basic() -> Result<()> {
        let buffer_pool_size = 10;
        let (bpm, _disk) = new_bpm(buffer_pool_size, 5);

        // Scenario: the buffer pool is empty, we should be able to
        // create a new page.
        let page0 = bpm.new_page()?;
        let page0_id = page0.read()?.id;
        assert_eq!(0, page0_id);

        // Scenario: once we have a page, we should be able to read and
        // write its content.
        let mut guard = page0.write()?;
        guard.data[..5].copy_from_slice(b"hello");
        drop(guard);
        assert_eq!(b"hello", &page0.read()?.data[..5]);

        // Scenario: we should be able to create pages until we fill up
        // the buffer pool, and not one more after that.
        for _ in 1..buffer_pool_size {
            assert!(bpm.new_page().is_ok());
        }
        for _ in buffer_pool_size..buffer_pool_size * 2 {
            assert_eq!(Err(Error::BufferPoolNoAvailableFrame), bpm.new_page().map(|_| ()));
        }

        // Scenario: after unpinning pages {0,1,2,3,4} and pinning four
        // new pages, there is still one frame left for reading page 0.
        for page_id in 0..5 {
            assert!(bpm.unpin_page(page_id, true)?);
        }
        for _ in 0..4 {
            assert!(bpm.new_page().is_ok());
        }

        // Scenario: we should be able to fetch the data we wrote a
        // while ago; the eviction wrote it to disk.
        let page0 = bpm.fetch_page(0)?;
        assert_eq!(b"hello", &page0.read()?.data[..5]);

        // Scenario: unpinning page 0 and creating one more page pins
        // every frame again, so fetching page 0 must fail.
        assert!(bpm.unpin_page(0, true)?);
        assert!(bpm.new_page().is_ok());
        assert_eq!(Err(Error::BufferPoolNoAvailableFrame), bpm.fetch_page(0).map(|_| ()));

        check_frame_bookkeeping(&bpm);
        Ok(())
    }

    #[test]
    fn test_eviction_writes_back_dirty_page() -> Result<()> {
        // Scenario: a pool with a single frame forces every fetch to
        // evict the previous page.
        let (bpm, disk) = new_bpm(1, 2);

        let page0 = bpm.new_page()?;
        assert_eq!(0, page0.read()?.id);

        // the only frame is pinned, nothing can be evicted
        assert_eq!(Err(Error::BufferPoolNoAvailableFrame), bpm.fetch_page(1).map(|_| ()));

        page0.write()?.data[..3].copy_from_slice(b"old");
        assert!(bpm.unpin_page(0, true)?);

        // now the fetch succeeds, and page 0 hits the disk on the way
        // out because it was dirty
        let page1 = bpm.fetch_page(1)?;
        assert_eq!(1, page1.read()?.id);
        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(0, &mut buf)?;
        assert_eq!(b"old", &buf[..3]);

        check_frame_bookkeeping(&bpm);
        Ok(())
    }

    #[test]
    fn test_unpin_page() -> Result<()> {
        let (bpm, _disk) = new_bpm(2, 2);

        let page0 = bpm.new_page()?;
        let page_id = page0.read()?.id;

        // unknown pages report false
        assert!(!bpm.unpin_page(99, false)?);

        // a second fetch stacks a second pin; both must be released
        let _again = bpm.fetch_page(page_id)?;
        assert_eq!(2, page0.read()?.pin_count);
        assert!(bpm.unpin_page(page_id, false)?);
        assert!(bpm.unpin_page(page_id, true)?);
        assert_eq!(0, page0.read()?.pin_count);

        // unpinning below zero reports false
        assert!(!bpm.unpin_page(page_id, false)?);

        // the dirty mark stuck even though the last unpin said clean
        assert!(page0.read()?.is_dirty);
        Ok(())
    }

    #[test]
    fn test_flush_page() -> Result<()> {
        let (bpm, disk) = new_bpm(2, 2);

        let page = bpm.new_page()?;
        let page_id = page.read()?.id;
        page.write()?.data[..2].copy_from_slice(b"hi");
        assert!(bpm.unpin_page(page_id, true)?);

        // unpin + flush leaves the page clean and on disk
        assert!(bpm.flush_page(page_id)?);
        assert!(!page.read()?.is_dirty);
        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(page_id, &mut buf)?;
        assert_eq!(b"hi", &buf[..2]);

        // a second flush is an idempotent clean write
        assert!(bpm.flush_page(page_id)?);
        assert!(!page.read()?.is_dirty);

        // flushing a page that is not resident reports false
        assert!(!bpm.flush_page(99)?);
        Ok(())
    }

    #[test]
    fn test_flush_all_pages() -> Result<()> {
        let (bpm, disk) = new_bpm(3, 2);
        for i in 0..3u8 {
            let page = bpm.new_page()?;
            let page_id = page.read()?.id;
            page.write()?.data[0] = i;
            bpm.unpin_page(page_id, true)?;
        }

        bpm.flush_all_pages()?;
        let mut buf = vec![0u8; PAGE_SIZE];
        for i in 0..3u8 {
            disk.read_page(i as PageId, &mut buf)?;
            assert_eq!(i, buf[0]);
        }
        Ok(())
    }

    #[test]
    fn test_delete_page() -> Result<()> {
        let (bpm, _disk) = new_bpm(2, 2);

        let page = bpm.new_page()?;
        let page_id = page.read()?.id;

        // Scenario: a pinned page cannot be deleted.
        assert!(!bpm.delete_page(page_id)?);

        // Scenario: after unpinning, deletion succeeds and the frame
        // goes back to the free list.
        assert!(bpm.unpin_page(page_id, false)?);
        assert!(bpm.delete_page(page_id)?);
        check_frame_bookkeeping(&bpm);

        // deleting a page that is not resident has nothing to do
        assert!(bpm.delete_page(page_id)?);
        assert!(bpm.delete_page(99)?);

        // page ids are never reused, even after a delete
        let next = bpm.new_page()?;
        assert_eq!(1, next.read()?.id);
        Ok(())
    }

    #[test]
    fn test_page_data_round_trip() -> Result<()> {
        // write through one pool instance, read through another backed
        // by the same disk
        let disk = Arc::new(Memory::new());
        {
            let bpm =
                BufferPoolManager::new(disk.clone() as Arc<dyn DiskManager>, 2, 2);
            let page = bpm.new_page()?;
            let page_id = page.read()?.id;
            page.write()?.data[..4].copy_from_slice(b"data");
            bpm.unpin_page(page_id, true)?;
            bpm.flush_page(page_id)?;
        }
        let bpm = BufferPoolManager::new(disk as Arc<dyn DiskManager>, 2, 2);
        let page = bpm.fetch_page(0)?;
        assert_eq!(b"data", &page.read()?.data[..4]);
        Ok(())
    }
}
