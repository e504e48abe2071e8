use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::page::PageId;

pub mod bufferpool;
pub mod disk;
pub mod page;
pub mod page_guard;
pub mod replacer;
pub mod scheduler;

/// A blocking page-addressable store. Pages are fixed-size blocks
/// addressed by page id; the buffer pool is the only component that
/// talks to it, through the disk scheduler.
///
/// The trait is object safe so the pool can hold `Arc<dyn DiskManager>`
/// and tests can swap the file store for the in-memory one.
pub trait DiskManager: Debug + Send + Sync {
    /// Read the page into `buf`, which must be exactly PAGE_SIZE bytes.
    /// Reading a page that was never written yields zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()>;

    /// Write the page from `buf`, which must be exactly PAGE_SIZE bytes.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()>;
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Memory,
    File,
}

pub fn new_disk_manager(typ: StorageType, path: &str) -> Result<Arc<dyn DiskManager>> {
    match typ {
        StorageType::Memory => Ok(Arc::new(disk::Memory::new())),
        StorageType::File => Ok(Arc::new(disk::FileDisk::open(path)?)),
    }
}
