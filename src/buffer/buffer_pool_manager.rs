use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{DbError, FileId, FrameId, PageId, Result, PAGE_SIZE};
use crate::storage::{DiskManager, DiskScheduler};

use super::{Frame, LruKReplacer, ReadPageGuard, WritePageGuard};

struct PoolState {
    frames: Vec<Arc<Frame>>,
    /// Maps cached pages to their frames
    page_table: Mutex<HashMap<PageId, FrameId>>,
    /// Frames not currently holding any page
    free_list: Mutex<Vec<FrameId>>,
    replacer: LruKReplacer,
}

impl PoolState {
    /// Unpin path shared by both guard kinds.
    fn release(&self, page_id: PageId, dirty: bool) {
        let page_table = self.page_table.lock();
        if let Some(&frame_id) = page_table.get(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            if frame.release(dirty) {
                self.replacer.set_evictable(frame_id, true);
            }
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of frames,
/// keyed by (file, page number). Eviction follows LRU-K; access goes
/// through RAII guards that pin the page for their lifetime and mark
/// it dirty on mutable access.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push(frame_id);
        }

        Self {
            pool_size,
            state: Arc::new(PoolState {
                frames,
                page_table: Mutex::new(HashMap::new()),
                free_list: Mutex::new(free_list),
                replacer: LruKReplacer::new(k),
            }),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a new page in the given file and returns its id. The
    /// page is cached but unpinned; acquire a guard to use it.
    pub fn new_page(&self, fd: FileId) -> Result<PageId> {
        let frame_id = self.acquire_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let page_no = self.disk_scheduler.disk_manager().allocate_page(fd)?;
        let page_id = PageId::new(fd, page_no);

        frame.reset();
        frame.set_page_id(Some(page_id));

        self.state.page_table.lock().insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, true);

        Ok(page_id)
    }

    /// Fetches a page for shared access, pinning it for the guard's
    /// lifetime.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_page(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let state = Arc::clone(&self.state);
        let guard = unsafe {
            ReadPageGuard::new(frame, Box::new(move |dirty| state.release(page_id, dirty)))
        };
        Ok(guard)
    }

    /// Fetches a page for exclusive access, pinning it for the guard's
    /// lifetime.
    pub fn write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_page(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let state = Arc::clone(&self.state);
        let guard = unsafe {
            WritePageGuard::new(frame, Box::new(move |dirty| state.release(page_id, dirty)))
        };
        Ok(guard)
    }

    /// Writes a page back to disk if cached; clears its dirty flag.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let page_table = self.state.page_table.lock();
        if let Some(&frame_id) = page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.clear_dirty();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Flushes every dirty page in the pool.
    pub fn flush_all(&self) -> Result<()> {
        let page_table = self.state.page_table.lock();
        for (&page_id, &frame_id) in page_table.iter() {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler.schedule_write_sync(page_id, &data)?;
                frame.clear_dirty();
            }
        }
        Ok(())
    }

    /// Flushes and drops every cached page belonging to the file.
    /// Used when a table or index file is closed or destroyed.
    pub fn flush_file(&self, fd: FileId) -> Result<()> {
        let mut page_table = self.state.page_table.lock();
        let pages: Vec<(PageId, FrameId)> = page_table
            .iter()
            .filter(|(pid, _)| pid.fd == fd)
            .map(|(&pid, &fid)| (pid, fid))
            .collect();
        for (page_id, frame_id) in pages {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            }
            frame.reset();
            page_table.remove(&page_id);
            self.state.replacer.remove(frame_id);
            self.state.free_list.lock().push(frame_id);
        }
        Ok(())
    }

    /// Drops a page from the pool without writing it back.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut page_table = self.state.page_table.lock();
        if let Some(frame_id) = page_table.remove(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin_count() > 0 {
                page_table.insert(page_id, frame_id);
                return Err(DbError::PageStillPinned);
            }
            frame.reset();
            self.state.replacer.remove(frame_id);
            self.state.free_list.lock().push(frame_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Brings the page into the pool (if absent) and pins it.
    fn fetch_page(&self, page_id: PageId) -> Result<FrameId> {
        {
            let page_table = self.state.page_table.lock();
            if let Some(&frame_id) = page_table.get(&page_id) {
                let frame = &self.state.frames[frame_id.as_usize()];
                frame.pin();
                self.state.replacer.record_access(frame_id);
                self.state.replacer.set_evictable(frame_id, false);
                return Ok(frame_id);
            }
        }

        let frame_id = self.acquire_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        // The frame came back from acquire_frame reset, so it is clean
        frame.set_page_id(Some(page_id));
        frame.copy_from(&data);
        frame.pin();

        self.state.page_table.lock().insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    /// Takes a frame from the free list, evicting a victim if needed.
    fn acquire_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.state.free_list.lock().pop() {
            return Ok(frame_id);
        }

        let frame_id = self
            .state
            .replacer
            .evict()
            .ok_or(DbError::BufferPoolFull)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
            }
            self.state.page_table.lock().remove(&old_page_id);
        }
        frame.reset();
        Ok(frame_id)
    }
}
