use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::common::{DbError, FileId, PageId, Result, PAGE_SIZE};

struct OpenFile {
    file: Mutex<File>,
    path: PathBuf,
    /// Number of pages allocated in this file
    num_pages: AtomicU32,
}

/// DiskManager reads and writes pages to/from disk. Files are opened
/// by path and addressed afterwards by FileId; each open file tracks
/// its own page count for allocation. A separate log channel serves
/// the write-ahead log with byte-granular appends and offset reads.
pub struct DiskManager {
    /// Map of FileId -> open file. The outer RwLock allows concurrent
    /// access to different files; the inner Mutex serializes the file
    /// cursor.
    files: RwLock<HashMap<FileId, OpenFile>>,
    /// Next FileId to hand out
    next_fd: AtomicU32,
    /// The write-ahead log file, if opened
    log_file: Mutex<Option<File>>,
}

impl DiskManager {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            next_fd: AtomicU32::new(0),
            log_file: Mutex::new(None),
        }
    }

    /// Creates a new file on disk. Fails if it already exists.
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            return Err(DbError::Internal(format!(
                "file {} already exists",
                path.display()
            )));
        }
        File::create(path)?;
        Ok(())
    }

    /// Removes a file from disk. The file must not be open.
    pub fn destroy_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let files = self.files.read();
        if files.values().any(|f| f.path == path) {
            return Err(DbError::Internal(format!(
                "cannot destroy open file {}",
                path.display()
            )));
        }
        drop(files);
        fs::remove_file(path)?;
        Ok(())
    }

    /// Opens an existing file and returns its FileId.
    pub fn open_file<P: AsRef<Path>>(&self, path: P) -> Result<FileId> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let fd = FileId::new(self.next_fd.fetch_add(1, Ordering::SeqCst));
        self.files.write().insert(
            fd,
            OpenFile {
                file: Mutex::new(file),
                path,
                num_pages: AtomicU32::new(num_pages),
            },
        );
        Ok(fd)
    }

    /// Closes an open file, syncing it first.
    pub fn close_file(&self, fd: FileId) -> Result<()> {
        let entry = self
            .files
            .write()
            .remove(&fd)
            .ok_or(DbError::Internal(format!("close of unknown fd {}", fd)))?;
        entry.file.lock().sync_all()?;
        Ok(())
    }

    /// Reads a page into the provided buffer. Reading past the end of
    /// the file yields zeroes, matching freshly allocated pages.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let files = self.files.read();
        let entry = files
            .get(&page_id.fd)
            .ok_or(DbError::InvalidPageId(page_id.page_no))?;

        let mut file = entry.file.lock();
        file.seek(SeekFrom::Start(
            page_id.page_no as u64 * PAGE_SIZE as u64,
        ))?;
        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }
        Ok(())
    }

    /// Writes a page from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let files = self.files.read();
        let entry = files
            .get(&page_id.fd)
            .ok_or(DbError::InvalidPageId(page_id.page_no))?;

        let mut file = entry.file.lock();
        file.seek(SeekFrom::Start(
            page_id.page_no as u64 * PAGE_SIZE as u64,
        ))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Allocates a new page at the end of the file and returns its
    /// page number. The page contents start out zeroed.
    pub fn allocate_page(&self, fd: FileId) -> Result<u32> {
        let files = self.files.read();
        let entry = files
            .get(&fd)
            .ok_or(DbError::Internal(format!("allocate on unknown fd {}", fd)))?;
        let page_no = entry.num_pages.fetch_add(1, Ordering::SeqCst);
        drop(files);

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(PageId::new(fd, page_no), &zeros)?;
        Ok(page_no)
    }

    /// Returns the number of pages allocated in the file.
    pub fn num_pages(&self, fd: FileId) -> u32 {
        self.files
            .read()
            .get(&fd)
            .map(|e| e.num_pages.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn create_dir<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::create_dir(path)?;
        Ok(())
    }

    pub fn destroy_dir<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::remove_dir_all(path)?;
        Ok(())
    }

    pub fn is_dir<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().is_dir()
    }

    /// Opens (creating if needed) the write-ahead log file.
    pub fn open_log<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        *self.log_file.lock() = Some(file);
        Ok(())
    }

    pub fn close_log(&self) -> Result<()> {
        if let Some(file) = self.log_file.lock().take() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Reads up to `buf.len()` bytes of the log starting at `offset`.
    /// Returns the number of bytes read; 0 at end of log.
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut guard = self.log_file.lock();
        let file = guard
            .as_mut()
            .ok_or(DbError::Internal("log file not open".into()))?;
        let len = file.metadata()?.len();
        if offset >= len {
            return Ok(0);
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Appends bytes to the log and syncs them to disk.
    pub fn write_log(&self, buf: &[u8]) -> Result<()> {
        let mut guard = self.log_file.lock();
        let file = guard
            .as_mut()
            .ok_or(DbError::Internal("log file not open".into()))?;
        file.seek(SeekFrom::End(0))?;
        file.write_all(buf)?;
        file.sync_data()?;
        Ok(())
    }
}

impl Default for DiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let files = self.files.get_mut();
        for entry in files.values_mut() {
            let _ = entry.file.get_mut().sync_all();
        }
        if let Some(file) = self.log_file.get_mut() {
            let _ = file.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_open_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table");
        let dm = DiskManager::new();

        dm.create_file(&path).unwrap();
        let fd = dm.open_file(&path).unwrap();

        let page_no = dm.allocate_page(fd).unwrap();
        assert_eq!(page_no, 0);

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[PAGE_SIZE - 1] = 128;
        dm.write_page(PageId::new(fd, page_no), &data).unwrap();

        let mut read = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(fd, page_no), &mut read).unwrap();
        assert_eq!(read[0], 42);
        assert_eq!(read[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn test_read_past_end_yields_zeroes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let dm = DiskManager::new();
        dm.create_file(&path).unwrap();
        let fd = dm.open_file(&path).unwrap();

        let mut read = [7u8; PAGE_SIZE];
        dm.read_page(PageId::new(fd, 3), &mut read).unwrap();
        assert!(read.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_count_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        {
            let dm = DiskManager::new();
            dm.create_file(&path).unwrap();
            let fd = dm.open_file(&path).unwrap();
            dm.allocate_page(fd).unwrap();
            dm.allocate_page(fd).unwrap();
            dm.close_file(fd).unwrap();
        }
        let dm = DiskManager::new();
        let fd = dm.open_file(&path).unwrap();
        assert_eq!(dm.num_pages(fd), 2);
        assert_eq!(dm.allocate_page(fd).unwrap(), 2);
    }

    #[test]
    fn test_log_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new();
        dm.open_log(dir.path().join("log")).unwrap();

        dm.write_log(b"hello ").unwrap();
        dm.write_log(b"world").unwrap();

        let mut buf = [0u8; 64];
        let n = dm.read_log(&mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"hello world");

        let n = dm.read_log(&mut buf, 6).unwrap();
        assert_eq!(&buf[..n], b"world");

        assert_eq!(dm.read_log(&mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn test_destroy_open_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let dm = DiskManager::new();
        dm.create_file(&path).unwrap();
        let fd = dm.open_file(&path).unwrap();
        assert!(dm.destroy_file(&path).is_err());
        dm.close_file(fd).unwrap();
        dm.destroy_file(&path).unwrap();
        assert!(!path.exists());
    }
}
