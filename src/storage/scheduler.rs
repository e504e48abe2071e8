use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use log::{debug, error};

use crate::error::Result;
use crate::storage::page::PageId;
use crate::storage::DiskManager;

/// Buffer carried by a disk request: writes move an owned page image to
/// the worker, reads hand it a shared target buffer to fill.
pub enum DiskData {
    Owned(Vec<u8>),
    Shared(Arc<Mutex<Vec<u8>>>),
}

/// A request to perform disk I/O. The issuer keeps the paired future and
/// blocks on it when it needs the result.
pub struct DiskRequest {
    pub is_write: bool,
    pub data: DiskData,
    pub page_id: PageId,
    pub done: DiskPromise,
}

/// Completion side of a request, signalled by the worker exactly once
/// with the success flag.
pub type DiskPromise = mpsc::Sender<bool>;

/// Blocks the calling thread until the paired promise is signalled.
pub struct DiskFuture {
    rx: mpsc::Receiver<bool>,
}

impl DiskFuture {
    /// Wait for the request to complete; returns whether it succeeded.
    pub fn wait(self) -> Result<bool> {
        Ok(self.rx.recv()?)
    }
}

/// Dispatches disk requests to a background worker thread, which drains
/// them in FIFO order against the disk manager. Dropping the scheduler
/// disconnects the queue and the worker exits after the requests already
/// enqueued.
pub struct DiskScheduler {
    queue: mpsc::Sender<DiskRequest>,
}

impl DiskScheduler {
    pub fn new(disk: Arc<dyn DiskManager>) -> DiskScheduler {
        let (tx, rx) = mpsc::channel::<DiskRequest>();
        thread::spawn(move || Self::worker(disk, rx));
        DiskScheduler { queue: tx }
    }

    /// Create a linked promise/future pair for a single request.
    pub fn create_promise(&self) -> (DiskPromise, DiskFuture) {
        let (tx, rx) = mpsc::channel();
        (tx, DiskFuture { rx })
    }

    /// Enqueue a request. The worker signals the request's promise with
    /// true on success and false on an I/O failure.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        Ok(self.queue.send(request)?)
    }

    fn worker(disk: Arc<dyn DiskManager>, queue: mpsc::Receiver<DiskRequest>) {
        debug!("disk scheduler worker started");
        while let Ok(request) = queue.recv() {
            let ok = Self::dispatch(disk.as_ref(), &request);
            if !ok {
                let kind = if request.is_write { "write" } else { "read" };
                error!("disk {} of page {} failed", kind, request.page_id);
            }
            // the issuer may have stopped waiting; a dead receiver is fine
            let _ = request.done.send(ok);
        }
        debug!("disk scheduler worker stopped");
    }

    /// Run one request to completion on the worker thread. I/O failures
    /// are reported through the completion flag, never by panicking the
    /// worker.
    fn dispatch(disk: &dyn DiskManager, request: &DiskRequest) -> bool {
        match (&request.data, request.is_write) {
            (DiskData::Owned(data), true) => disk.write_page(request.page_id, data).is_ok(),
            (DiskData::Shared(buf), false) => match buf.lock() {
                Ok(mut buf) => disk.read_page(request.page_id, &mut buf).is_ok(),
                Err(_) => false,
            },
            // a request whose buffer kind does not match its direction
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk;
    use crate::storage::page::PAGE_SIZE;

    #[test]
    fn test_schedule_write_then_read() -> Result<()> {
        let disk: Arc<dyn DiskManager> = Arc::new(disk::Memory::new());
        let scheduler = DiskScheduler::new(Arc::clone(&disk));

        // Scenario: schedule a write, wait for it, then read the page
        // back through the scheduler.
        let (promise, future) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            is_write: true,
            data: DiskData::Owned(vec![0x5a; PAGE_SIZE]),
            page_id: 4,
            done: promise,
        })?;
        assert!(future.wait()?);

        let buf = Arc::new(Mutex::new(vec![0u8; PAGE_SIZE]));
        let (promise, future) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            is_write: false,
            data: DiskData::Shared(Arc::clone(&buf)),
            page_id: 4,
            done: promise,
        })?;
        assert!(future.wait()?);
        assert_eq!(vec![0x5a; PAGE_SIZE], *buf.lock()?);
        Ok(())
    }

    #[test]
    fn test_failed_request_signals_false() -> Result<()> {
        let disk: Arc<dyn DiskManager> = Arc::new(disk::Memory::new());
        let scheduler = DiskScheduler::new(disk);

        // an undersized write buffer fails in the disk manager; the
        // worker reports it through the future instead of dying
        let (promise, future) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            is_write: true,
            data: DiskData::Owned(vec![0u8; 8]),
            page_id: 0,
            done: promise,
        })?;
        assert!(!future.wait()?);

        // the worker is still alive and serves the next request
        let (promise, future) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            is_write: true,
            data: DiskData::Owned(vec![1u8; PAGE_SIZE]),
            page_id: 0,
            done: promise,
        })?;
        assert!(future.wait()?);
        Ok(())
    }
}
