use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::storage::page::{PageId, PAGE_SIZE};
use crate::storage::DiskManager;

fn check_page_buffer(len: usize) -> Result<()> {
    if len != PAGE_SIZE {
        return Err(Error::value(format!(
            "page buffer must be {} bytes, got {}",
            PAGE_SIZE, len
        )));
    }
    Ok(())
}

fn page_offset(page_id: PageId) -> Result<u64> {
    if page_id < 0 {
        return Err(Error::value(format!("invalid page id {}", page_id)));
    }
    Ok(page_id as u64 * PAGE_SIZE as u64)
}

/// In-memory disk manager, used by tests and as the default storage.
/// Pages are kept verbatim in a hash map.
#[derive(Debug, Default)]
pub struct Memory {
    pages: Mutex<HashMap<PageId, Vec<u8>>>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory { pages: Mutex::new(HashMap::new()) }
    }
}

impl DiskManager for Memory {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        check_page_buffer(buf.len())?;
        page_offset(page_id)?;
        let pages = self.pages.lock()?;
        match pages.get(&page_id) {
            Some(data) => buf.copy_from_slice(data),
            // never-written pages read as zeroes
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        check_page_buffer(buf.len())?;
        page_offset(page_id)?;
        self.pages.lock()?.insert(page_id, buf.to_vec());
        Ok(())
    }
}

/// File-backed disk manager. Page `i` lives at byte offset
/// `i * PAGE_SIZE` in a single database file.
#[derive(Debug)]
pub struct FileDisk {
    file: Mutex<File>,
}

impl FileDisk {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileDisk> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        Ok(FileDisk { file: Mutex::new(file) })
    }
}

impl DiskManager for FileDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        check_page_buffer(buf.len())?;
        let offset = page_offset(page_id)?;
        let mut file = self.file.lock()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        // a page at or past the end of the file reads as zeroes
        buf[total..].fill(0);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        check_page_buffer(buf.len())?;
        let offset = page_offset(page_id)?;
        let mut file = self.file.lock()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }
}
