use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{DbError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

enum DiskRequest {
    Read {
        page_id: PageId,
        callback: std::sync::mpsc::Sender<Result<Box<[u8; PAGE_SIZE]>>>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
        callback: std::sync::mpsc::Sender<Result<()>>,
    },
}

/// DiskScheduler manages a background worker thread that processes
/// disk I/O requests from a bounded queue.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::worker_loop(dm_clone, receiver, shutdown_clone);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Schedules a read and waits for the page contents.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        self.request_sender
            .send(DiskRequest::Read { page_id, callback: tx })
            .map_err(|e| DbError::Internal(format!("disk scheduler send: {}", e)))?;

        let page = rx
            .recv()
            .map_err(|e| DbError::Internal(format!("disk scheduler recv: {}", e)))??;
        data.copy_from_slice(&page[..]);
        Ok(())
    }

    /// Schedules a write and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut boxed = Box::new([0u8; PAGE_SIZE]);
        boxed.copy_from_slice(data);

        let (tx, rx) = std::sync::mpsc::channel();
        self.request_sender
            .send(DiskRequest::Write {
                page_id,
                data: boxed,
                callback: tx,
            })
            .map_err(|e| DbError::Internal(format!("disk scheduler send: {}", e)))?;

        rx.recv()
            .map_err(|e| DbError::Internal(format!("disk scheduler recv: {}", e)))?
    }

    fn worker_loop(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, callback } => {
                let mut page = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager
                    .read_page(page_id, &mut page[..])
                    .map(|_| page);
                let _ = callback.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                callback,
            } => {
                let _ = callback.send(disk_manager.write_page(page_id, &data[..]));
            }
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_scheduler_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let dm = Arc::new(DiskManager::new());
        dm.create_file(&path).unwrap();
        let fd = dm.open_file(&path).unwrap();
        let scheduler = DiskScheduler::new(dm);

        let page_no = scheduler.disk_manager().allocate_page(fd).unwrap();
        let page_id = PageId::new(fd, page_no);

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.schedule_write_sync(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler
            .schedule_read_sync(page_id, &mut read_data)
            .unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_multiple_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let dm = Arc::new(DiskManager::new());
        dm.create_file(&path).unwrap();
        let fd = dm.open_file(&path).unwrap();
        let scheduler = DiskScheduler::new(dm);

        let p1 = PageId::new(fd, scheduler.disk_manager().allocate_page(fd).unwrap());
        let p2 = PageId::new(fd, scheduler.disk_manager().allocate_page(fd).unwrap());

        scheduler.schedule_write_sync(p1, &[1u8; PAGE_SIZE]).unwrap();
        scheduler.schedule_write_sync(p2, &[2u8; PAGE_SIZE]).unwrap();

        let mut r1 = [0u8; PAGE_SIZE];
        let mut r2 = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(p1, &mut r1).unwrap();
        scheduler.schedule_read_sync(p2, &mut r2).unwrap();

        assert_eq!(r1[0], 1);
        assert_eq!(r2[0], 2);
    }
}
