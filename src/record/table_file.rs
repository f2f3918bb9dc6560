use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{
    DbError, FileId, PageId, Result, Rid, INVALID_PAGE_NO, PAGE_SIZE, RM_FILE_HDR_PAGE,
    RM_FIRST_RECORD_PAGE,
};
use crate::execution::Context;
use crate::storage::DiskManager;
use crate::tuple::Record;

use super::table_page::{page_capacity, TablePage, TablePageRef};

/// Persistent header of a table heap file, serialized on page 0.
#[derive(Debug, Clone)]
pub struct TableFileHeader {
    pub record_size: usize,
    pub num_records_per_page: usize,
    pub bitmap_size: usize,
    /// Total pages in the file, header page included
    pub num_pages: u32,
    /// Head of the linked list of pages with at least one empty slot
    pub first_free_page_no: u32,
}

impl TableFileHeader {
    fn serialize(&self) -> [u8; 20] {
        let mut buf = [0u8; 20];
        buf[0..4].copy_from_slice(&(self.record_size as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&(self.num_records_per_page as u32).to_le_bytes());
        buf[8..12].copy_from_slice(&(self.bitmap_size as u32).to_le_bytes());
        buf[12..16].copy_from_slice(&self.num_pages.to_le_bytes());
        buf[16..20].copy_from_slice(&self.first_free_page_no.to_le_bytes());
        buf
    }

    fn deserialize(data: &[u8]) -> Self {
        Self {
            record_size: u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize,
            num_records_per_page: u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize,
            bitmap_size: u32::from_le_bytes(data[8..12].try_into().unwrap()) as usize,
            num_pages: u32::from_le_bytes(data[12..16].try_into().unwrap()),
            first_free_page_no: u32::from_le_bytes(data[16..20].try_into().unwrap()),
        }
    }
}

/// A heap file of fixed-size records organized in bitmap slotted
/// pages. Mutating operations acquire locks through the context when
/// one is supplied: reads take a shared row lock, inserts an exclusive
/// table lock, updates and deletes exclusive row locks.
pub struct TableFile {
    fd: FileId,
    bpm: Arc<BufferPoolManager>,
    hdr: RwLock<TableFileHeader>,
}

impl TableFile {
    /// Creates a table file on disk with a header page sized for
    /// `record_size` records.
    pub fn create<P: AsRef<Path>>(
        dm: &DiskManager,
        path: P,
        record_size: usize,
    ) -> Result<()> {
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;
        let page_no = dm.allocate_page(fd)?;
        assert_eq!(page_no, RM_FILE_HDR_PAGE);

        let (num_records_per_page, bitmap_size) = page_capacity(record_size);
        let hdr = TableFileHeader {
            record_size,
            num_records_per_page,
            bitmap_size,
            num_pages: 1,
            first_free_page_no: INVALID_PAGE_NO,
        };
        let mut page = [0u8; PAGE_SIZE];
        page[..20].copy_from_slice(&hdr.serialize());
        dm.write_page(PageId::new(fd, RM_FILE_HDR_PAGE), &page)?;
        dm.close_file(fd)?;
        Ok(())
    }

    /// Opens an existing table file and caches its header. The header
    /// page is only rewritten on a clean close, so the page count is
    /// reconciled with the physical file and the free-page list is
    /// rebuilt from the slot bitmaps.
    pub fn open<P: AsRef<Path>>(bpm: Arc<BufferPoolManager>, path: P) -> Result<TableFile> {
        let fd = bpm.disk_manager().open_file(path)?;
        let mut hdr = {
            let guard = bpm.read_page(PageId::new(fd, RM_FILE_HDR_PAGE))?;
            TableFileHeader::deserialize(guard.data())
        };
        hdr.num_pages = hdr.num_pages.max(bpm.disk_manager().num_pages(fd));

        let mut first_free = INVALID_PAGE_NO;
        for page_no in (RM_FIRST_RECORD_PAGE..hdr.num_pages).rev() {
            let mut guard = bpm.write_page(PageId::new(fd, page_no))?;
            let mut page = TablePage::new(guard.data_mut(), &hdr);
            if !page.is_full() {
                page.set_next_free_page_no(first_free);
                first_free = page_no;
            }
        }
        hdr.first_free_page_no = first_free;

        Ok(TableFile {
            fd,
            bpm,
            hdr: RwLock::new(hdr),
        })
    }

    /// Writes the cached header back, flushes all pages of the file,
    /// and closes it.
    pub fn close(&self) -> Result<()> {
        self.write_header()?;
        self.bpm.flush_file(self.fd)?;
        self.bpm.disk_manager().close_file(self.fd)
    }

    fn write_header(&self) -> Result<()> {
        let hdr = self.hdr.read().clone();
        let mut guard = self.bpm.write_page(PageId::new(self.fd, RM_FILE_HDR_PAGE))?;
        guard.data_mut()[..20].copy_from_slice(&hdr.serialize());
        Ok(())
    }

    pub fn fd(&self) -> FileId {
        self.fd
    }

    pub fn record_size(&self) -> usize {
        self.hdr.read().record_size
    }

    pub fn num_pages(&self) -> u32 {
        self.hdr.read().num_pages
    }

    pub fn header(&self) -> TableFileHeader {
        self.hdr.read().clone()
    }

    /// Reads the record at `rid`. Fails with RecordNotFound if the
    /// slot is empty.
    pub fn get(&self, rid: Rid, ctx: Option<&Context>) -> Result<Record> {
        if let Some(ctx) = ctx {
            ctx.lock_mgr
                .lock_shared_on_record(&ctx.txn, rid, self.fd)?;
        }
        let hdr = self.hdr.read().clone();
        self.check_page(&hdr, rid.page_no)?;

        let guard = self.bpm.read_page(PageId::new(self.fd, rid.page_no))?;
        let page = TablePageRef::new(guard.data(), &hdr);
        if !page.slot_occupied(rid.slot_no as usize) {
            return Err(DbError::RecordNotFound(rid));
        }
        Ok(Record::from_bytes(page.slot(rid.slot_no as usize)))
    }

    /// Inserts a record into the first free page, returning its rid.
    pub fn insert(&self, buf: &[u8], ctx: Option<&Context>) -> Result<Rid> {
        if let Some(ctx) = ctx {
            ctx.lock_mgr.lock_exclusive_on_table(&ctx.txn, self.fd)?;
        }
        let mut hdr = self.hdr.write();
        assert_eq!(buf.len(), hdr.record_size);

        let page_no = if hdr.first_free_page_no == INVALID_PAGE_NO {
            self.allocate_record_page(&mut hdr)?
        } else {
            hdr.first_free_page_no
        };

        let mut guard = self.bpm.write_page(PageId::new(self.fd, page_no))?;
        let mut page = TablePage::new(guard.data_mut(), &hdr);
        let slot_no = page
            .first_free_slot()
            .ok_or_else(|| DbError::Internal("free-list page has no empty slot".into()))?;
        page.write_slot(slot_no, buf);
        if page.is_full() {
            hdr.first_free_page_no = page.next_free_page_no();
        }
        Ok(Rid::new(page_no, slot_no as u32))
    }

    /// Inserts a record at a specific rid. Used by abort and recovery
    /// to reconstruct rows at their original position. A no-op on the
    /// bitmap if the slot is already occupied (the bytes are still
    /// overwritten).
    pub fn insert_at(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        let mut hdr = self.hdr.write();
        if rid.page_no >= hdr.num_pages {
            return Err(DbError::PageNotExist(rid.page_no));
        }
        let mut guard = self.bpm.write_page(PageId::new(self.fd, rid.page_no))?;
        let mut unlink = None;
        {
            let mut page = TablePage::new(guard.data_mut(), &hdr);
            let was_empty = page.write_slot(rid.slot_no as usize, buf);
            if was_empty && page.is_full() {
                unlink = Some(page.next_free_page_no());
            }
        }
        drop(guard);
        if let Some(next) = unlink {
            self.unlink_free_page(&mut hdr, rid.page_no, next)?;
        }
        Ok(())
    }

    /// Overwrites the record at `rid`.
    pub fn update(&self, rid: Rid, buf: &[u8], ctx: Option<&Context>) -> Result<()> {
        if let Some(ctx) = ctx {
            ctx.lock_mgr
                .lock_exclusive_on_record(&ctx.txn, rid, self.fd)?;
        }
        let hdr = self.hdr.read().clone();
        self.check_page(&hdr, rid.page_no)?;

        let mut guard = self.bpm.write_page(PageId::new(self.fd, rid.page_no))?;
        let mut page = TablePage::new(guard.data_mut(), &hdr);
        if !page.slot_occupied(rid.slot_no as usize) {
            return Err(DbError::RecordNotFound(rid));
        }
        page.overwrite_slot(rid.slot_no as usize, buf);
        Ok(())
    }

    /// Deletes the record at `rid`; a page going from full to
    /// not-full rejoins the free list.
    pub fn delete(&self, rid: Rid, ctx: Option<&Context>) -> Result<()> {
        if let Some(ctx) = ctx {
            ctx.lock_mgr
                .lock_exclusive_on_record(&ctx.txn, rid, self.fd)?;
        }
        let mut hdr = self.hdr.write();
        if rid.page_no >= hdr.num_pages {
            return Err(DbError::PageNotExist(rid.page_no));
        }

        let mut guard = self.bpm.write_page(PageId::new(self.fd, rid.page_no))?;
        let mut page = TablePage::new(guard.data_mut(), &hdr);
        let was_full = page.is_full();
        if !page.clear_slot(rid.slot_no as usize) {
            return Err(DbError::RecordNotFound(rid));
        }
        if was_full {
            page.set_next_free_page_no(hdr.first_free_page_no);
            hdr.first_free_page_no = rid.page_no;
        }
        Ok(())
    }

    /// Allocates and initializes a fresh record page at the head of
    /// the free list.
    fn allocate_record_page(&self, hdr: &mut TableFileHeader) -> Result<u32> {
        let page_id = self.bpm.new_page(self.fd)?;
        let mut guard = self.bpm.write_page(page_id)?;
        let mut page = TablePage::new(guard.data_mut(), hdr);
        page.init(hdr.first_free_page_no);
        hdr.first_free_page_no = page_id.page_no;
        hdr.num_pages += 1;
        Ok(page_id.page_no)
    }

    /// Removes `page_no` from the free list wherever it sits; `next`
    /// is that page's own next pointer.
    fn unlink_free_page(&self, hdr: &mut TableFileHeader, page_no: u32, next: u32) -> Result<()> {
        if hdr.first_free_page_no == page_no {
            hdr.first_free_page_no = next;
            return Ok(());
        }
        let mut cur = hdr.first_free_page_no;
        while cur != INVALID_PAGE_NO {
            let mut guard = self.bpm.write_page(PageId::new(self.fd, cur))?;
            let mut page = TablePage::new(guard.data_mut(), hdr);
            if page.next_free_page_no() == page_no {
                page.set_next_free_page_no(next);
                return Ok(());
            }
            cur = page.next_free_page_no();
        }
        Ok(())
    }

    fn check_page(&self, hdr: &TableFileHeader, page_no: u32) -> Result<()> {
        if page_no == INVALID_PAGE_NO || page_no >= hdr.num_pages {
            return Err(DbError::PageNotExist(page_no));
        }
        Ok(())
    }

    /// Reads a page's bitmap-visible occupancy for scans: returns the
    /// first occupied slot at or after `start`, if any.
    pub(crate) fn next_occupied(&self, page_no: u32, start: usize) -> Result<Option<usize>> {
        let hdr = self.hdr.read().clone();
        let guard = self.bpm.read_page(PageId::new(self.fd, page_no))?;
        let page = TablePageRef::new(guard.data(), &hdr);
        Ok(page.next_occupied_slot(start))
    }
}
