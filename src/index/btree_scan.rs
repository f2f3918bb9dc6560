use std::sync::Arc;

use crate::common::{Iid, Result, Rid};

use super::btree_index::BTreeIndex;

/// Range iterator over index entries in key order, from a start
/// position (inclusive) to an end position (exclusive). Advances slot
/// by slot and hops across the leaf chain at page boundaries.
pub struct IxScan {
    index: Arc<BTreeIndex>,
    iid: Iid,
    end: Iid,
}

impl IxScan {
    pub fn new(index: Arc<BTreeIndex>, start: Iid, end: Iid) -> Self {
        Self {
            index,
            iid: start,
            end,
        }
    }

    pub fn is_end(&self) -> bool {
        self.iid == self.end
    }

    pub fn iid(&self) -> Iid {
        self.iid
    }

    /// The heap rid at the current position.
    pub fn rid(&self) -> Result<Rid> {
        self.index.get_rid(self.iid)
    }

    pub fn next(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }
        self.iid.slot_no += 1;
        if self.iid.page_no != self.end.page_no {
            let (num_keys, next_leaf) = self.index.leaf_info(self.iid.page_no)?;
            if self.iid.slot_no == num_keys {
                self.iid = Iid::new(next_leaf, 0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::storage::DiskManager;
    use crate::tuple::{ColType, Value};

    fn int_key(v: i32) -> Vec<u8> {
        Value::Int(v).to_bytes(4).unwrap()
    }

    fn build_index() -> (Arc<BTreeIndex>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ix");
        let dm = Arc::new(DiskManager::new());
        BTreeIndex::create(&dm, &path, vec![ColType::Int], vec![4], Some(3)).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(64, 2, dm));
        let ix = Arc::new(BTreeIndex::open(bpm, &path).unwrap());
        for v in 1..=15 {
            ix.insert_entry(&int_key(v), Rid::new(v as u32, 0)).unwrap();
        }
        (ix, dir)
    }

    fn drain(mut scan: IxScan) -> Vec<u32> {
        let mut out = Vec::new();
        while !scan.is_end() {
            out.push(scan.rid().unwrap().page_no);
            scan.next().unwrap();
        }
        out
    }

    #[test]
    fn test_full_scan() {
        let (ix, _dir) = build_index();
        let start = ix.leaf_begin().unwrap();
        let end = ix.leaf_end().unwrap();
        let got = drain(IxScan::new(ix, start, end));
        assert_eq!(got, (1..=15).collect::<Vec<u32>>());
    }

    #[test]
    fn test_bounded_scan() {
        let (ix, _dir) = build_index();
        let start = ix.lower_bound(&int_key(5)).unwrap();
        let end = ix.upper_bound(&int_key(11)).unwrap();
        let got = drain(IxScan::new(ix, start, end));
        assert_eq!(got, (5..=11).collect::<Vec<u32>>());
    }

    #[test]
    fn test_empty_range() {
        let (ix, _dir) = build_index();
        let start = ix.lower_bound(&int_key(99)).unwrap();
        let end = ix.leaf_end().unwrap();
        assert!(IxScan::new(ix, start, end).is_end());
    }
}
