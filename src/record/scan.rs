use std::sync::Arc;

use crate::common::{Result, Rid, RM_FIRST_RECORD_PAGE};

use super::table_file::TableFile;

/// Forward scan over every occupied slot of a table file, yielding
/// rids in (page_no, slot_no) order.
pub struct TableScan {
    file: Arc<TableFile>,
    rid: Option<Rid>,
}

impl TableScan {
    /// Creates a scan positioned at the first occupied slot.
    pub fn new(file: Arc<TableFile>) -> Result<Self> {
        let mut scan = Self { file, rid: None };
        scan.rid = scan.find_from(RM_FIRST_RECORD_PAGE, 0)?;
        Ok(scan)
    }

    pub fn is_end(&self) -> bool {
        self.rid.is_none()
    }

    /// Current position; None once the scan is exhausted.
    pub fn rid(&self) -> Option<Rid> {
        self.rid
    }

    /// Advances to the next occupied slot.
    pub fn next(&mut self) -> Result<()> {
        let Some(cur) = self.rid else {
            return Ok(());
        };
        self.rid = self.find_from(cur.page_no, cur.slot_no as usize + 1)?;
        Ok(())
    }

    fn find_from(&self, mut page_no: u32, mut slot_start: usize) -> Result<Option<Rid>> {
        let num_pages = self.file.num_pages();
        while page_no < num_pages {
            if let Some(slot) = self.file.next_occupied(page_no, slot_start)? {
                return Ok(Some(Rid::new(page_no, slot as u32)));
            }
            page_no += 1;
            slot_start = 0;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::storage::DiskManager;

    fn open_table(record_size: usize) -> (Arc<TableFile>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t");
        let dm = Arc::new(DiskManager::new());
        TableFile::create(&dm, &path, record_size).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(64, 2, dm));
        (Arc::new(TableFile::open(bpm, &path).unwrap()), dir)
    }

    fn collect(file: &Arc<TableFile>) -> Vec<Rid> {
        let mut scan = TableScan::new(file.clone()).unwrap();
        let mut rids = Vec::new();
        while let Some(rid) = scan.rid() {
            rids.push(rid);
            scan.next().unwrap();
        }
        rids
    }

    #[test]
    fn test_empty_scan() {
        let (tf, _dir) = open_table(8);
        assert!(collect(&tf).is_empty());
    }

    #[test]
    fn test_scan_order_after_churn() {
        let (tf, _dir) = open_table(900);
        let mut live: Vec<Rid> = Vec::new();
        for i in 0..10u8 {
            live.push(tf.insert(&[i; 900], None).unwrap());
        }
        // Delete every other record
        for rid in live.iter().step_by(2) {
            tf.delete(*rid, None).unwrap();
        }
        live = live.into_iter().skip(1).step_by(2).collect();

        let mut expected = live.clone();
        expected.sort();
        assert_eq!(collect(&tf), expected);

        // Reinsert fills freed slots; scan stays in rid order
        for i in 0..3u8 {
            tf.insert(&[100 + i; 900], None).unwrap();
        }
        let rids = collect(&tf);
        let mut sorted = rids.clone();
        sorted.sort();
        assert_eq!(rids, sorted);
        assert_eq!(rids.len(), 8);
    }

    #[test]
    fn test_scan_spans_pages() {
        let (tf, _dir) = open_table(1500);
        let per_page = tf.header().num_records_per_page;
        let total = per_page * 2 + 1;
        for i in 0..total {
            tf.insert(&[i as u8; 1500], None).unwrap();
        }
        let rids = collect(&tf);
        assert_eq!(rids.len(), total);
        assert!(rids.windows(2).all(|w| w[0] < w[1]));
    }
}
