use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{
    DbError, FileId, Iid, PageId, Result, Rid, INVALID_PAGE_NO, IX_FILE_HDR_PAGE,
    IX_INIT_ROOT_PAGE, IX_LEAF_HEADER_PAGE, PAGE_SIZE,
};
use crate::storage::DiskManager;
use crate::tuple::ColType;

use super::btree_page::{max_order_for, BTreeNode, BTreeNodeRef};
use super::key_comparator::{CompositeComparator, KeyComparator};

/// Persistent header of an index file, serialized on page 0.
#[derive(Debug, Clone)]
pub struct IxFileHeader {
    /// Maximum number of keys a node may hold; a node reaching this
    /// count is split.
    pub btree_order: usize,
    /// Total width of the serialized composite key
    pub col_tot_len: usize,
    pub col_types: Vec<ColType>,
    pub col_lens: Vec<usize>,
    pub root_page: u32,
    pub first_leaf: u32,
    pub last_leaf: u32,
    pub num_pages: u32,
}

impl IxFileHeader {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.btree_order as u32).to_le_bytes());
        buf.extend_from_slice(&(self.col_tot_len as u32).to_le_bytes());
        buf.extend_from_slice(&(self.col_types.len() as u32).to_le_bytes());
        for (t, len) in self.col_types.iter().zip(self.col_lens.iter()) {
            buf.push(t.type_id());
            buf.extend_from_slice(&(*len as u32).to_le_bytes());
        }
        buf.extend_from_slice(&self.root_page.to_le_bytes());
        buf.extend_from_slice(&self.first_leaf.to_le_bytes());
        buf.extend_from_slice(&self.last_leaf.to_le_bytes());
        buf.extend_from_slice(&self.num_pages.to_le_bytes());
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let mut u32_at = |p: &mut usize| -> u32 {
            let v = u32::from_le_bytes(data[*p..*p + 4].try_into().unwrap());
            *p += 4;
            v
        };
        let btree_order = u32_at(&mut pos) as usize;
        let col_tot_len = u32_at(&mut pos) as usize;
        let num_cols = u32_at(&mut pos) as usize;
        let mut col_types = Vec::with_capacity(num_cols);
        let mut col_lens = Vec::with_capacity(num_cols);
        for _ in 0..num_cols {
            let t = ColType::from_type_id(data[pos])
                .ok_or_else(|| DbError::Internal("bad column type in index header".into()))?;
            pos += 1;
            col_types.push(t);
            col_lens.push(u32_at(&mut pos) as usize);
        }
        Ok(Self {
            btree_order,
            col_tot_len,
            col_types,
            col_lens,
            root_page: u32_at(&mut pos),
            first_leaf: u32_at(&mut pos),
            last_leaf: u32_at(&mut pos),
            num_pages: u32_at(&mut pos),
        })
    }
}

/// Disk-backed B+ tree over composite fixed-width keys, mapping each
/// key to one heap rid. Keys are unique: a duplicate insert is
/// reported to the caller instead of applied. A single tree-wide
/// latch (the header mutex) covers each public operation.
pub struct BTreeIndex {
    fd: FileId,
    bpm: Arc<BufferPoolManager>,
    hdr: Mutex<IxFileHeader>,
    cmp: CompositeComparator,
}

impl BTreeIndex {
    /// Creates an index file: header page, leaf-chain sentinel page,
    /// and an empty root leaf. `order` overrides the page-capacity
    /// default, clamped to what fits.
    pub fn create<P: AsRef<Path>>(
        dm: &DiskManager,
        path: P,
        col_types: Vec<ColType>,
        col_lens: Vec<usize>,
        order: Option<usize>,
    ) -> Result<()> {
        let col_tot_len: usize = col_lens.iter().sum();
        let max_order = max_order_for(col_tot_len);
        if max_order < 3 {
            return Err(DbError::Internal(format!(
                "index key of {} bytes is too wide for a page",
                col_tot_len
            )));
        }
        let btree_order = order.map_or(max_order, |o| o.clamp(3, max_order));

        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;
        for expect in [IX_FILE_HDR_PAGE, IX_LEAF_HEADER_PAGE, IX_INIT_ROOT_PAGE] {
            let page_no = dm.allocate_page(fd)?;
            assert_eq!(page_no, expect);
        }

        let hdr = IxFileHeader {
            btree_order,
            col_tot_len,
            col_types,
            col_lens,
            root_page: IX_INIT_ROOT_PAGE,
            first_leaf: IX_INIT_ROOT_PAGE,
            last_leaf: IX_INIT_ROOT_PAGE,
            num_pages: 3,
        };
        let mut page = [0u8; PAGE_SIZE];
        let bytes = hdr.serialize();
        page[..bytes.len()].copy_from_slice(&bytes);
        dm.write_page(PageId::new(fd, IX_FILE_HDR_PAGE), &page)?;

        // Sentinel: next_leaf tracks the first leaf, prev_leaf the last
        let mut page = [0u8; PAGE_SIZE];
        {
            let mut node = BTreeNode::new(&mut page, col_tot_len, btree_order);
            node.init(false);
            node.set_next_leaf(IX_INIT_ROOT_PAGE);
            node.set_prev_leaf(IX_INIT_ROOT_PAGE);
        }
        dm.write_page(PageId::new(fd, IX_LEAF_HEADER_PAGE), &page)?;

        let mut page = [0u8; PAGE_SIZE];
        {
            let mut node = BTreeNode::new(&mut page, col_tot_len, btree_order);
            node.init(true);
            node.set_prev_leaf(IX_LEAF_HEADER_PAGE);
            node.set_next_leaf(IX_LEAF_HEADER_PAGE);
        }
        dm.write_page(PageId::new(fd, IX_INIT_ROOT_PAGE), &page)?;

        dm.close_file(fd)?;
        Ok(())
    }

    pub fn open<P: AsRef<Path>>(bpm: Arc<BufferPoolManager>, path: P) -> Result<BTreeIndex> {
        let fd = bpm.disk_manager().open_file(path)?;
        let hdr = {
            let guard = bpm.read_page(PageId::new(fd, IX_FILE_HDR_PAGE))?;
            IxFileHeader::deserialize(guard.data())?
        };
        let cmp = CompositeComparator::new(hdr.col_types.clone(), hdr.col_lens.clone());
        Ok(BTreeIndex {
            fd,
            bpm,
            hdr: Mutex::new(hdr),
            cmp,
        })
    }

    /// Writes the header back, flushes the file's pages, and closes it.
    pub fn close(&self) -> Result<()> {
        {
            let hdr = self.hdr.lock();
            let bytes = hdr.serialize();
            let mut guard = self.bpm.write_page(PageId::new(self.fd, IX_FILE_HDR_PAGE))?;
            guard.data_mut()[..bytes.len()].copy_from_slice(&bytes);
        }
        self.bpm.flush_file(self.fd)?;
        self.bpm.disk_manager().close_file(self.fd)
    }

    pub fn fd(&self) -> FileId {
        self.fd
    }

    pub fn key_len(&self) -> usize {
        self.cmp.total_len()
    }

    pub fn comparator(&self) -> &CompositeComparator {
        &self.cmp
    }

    fn pid(&self, page_no: u32) -> PageId {
        PageId::new(self.fd, page_no)
    }

    /// Point lookup: the rid stored under `key`, if present.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<Rid>> {
        let hdr = self.hdr.lock();
        let leaf_no = self.find_leaf(&hdr, key)?;
        let guard = self.bpm.read_page(self.pid(leaf_no))?;
        let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
        let pos = node.lower_bound(key, &self.cmp);
        if pos < node.num_keys()
            && self.cmp.compare(node.key(pos), key) == std::cmp::Ordering::Equal
        {
            Ok(Some(node.rid(pos)))
        } else {
            Ok(None)
        }
    }

    /// Inserts a unique key. Returns false (and changes nothing) if
    /// the key is already present.
    pub fn insert_entry(&self, key: &[u8], rid: Rid) -> Result<bool> {
        let mut hdr = self.hdr.lock();
        let leaf_no = self.find_leaf(&hdr, key)?;

        let num_after = {
            let mut guard = self.bpm.write_page(self.pid(leaf_no))?;
            let mut node = BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
            if node.insert(key, rid, &self.cmp).is_none() {
                return Ok(false);
            }
            node.num_keys()
        };

        self.maintain_parent(&hdr, leaf_no)?;
        if num_after == hdr.btree_order {
            self.split_and_propagate(&mut hdr, leaf_no)?;
        }
        Ok(true)
    }

    /// Deletes a key. Returns false if it was not present.
    pub fn delete_entry(&self, key: &[u8]) -> Result<bool> {
        let mut hdr = self.hdr.lock();
        let leaf_no = self.find_leaf(&hdr, key)?;

        let removed = {
            let mut guard = self.bpm.write_page(self.pid(leaf_no))?;
            let mut node = BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
            node.remove(key, &self.cmp)
        };
        let Some(idx) = removed else {
            return Ok(false);
        };
        if idx == 0 {
            self.maintain_parent(&hdr, leaf_no)?;
        }
        self.coalesce_or_redistribute(&mut hdr, leaf_no)?;
        Ok(true)
    }

    /// Position of the first entry >= key.
    pub fn lower_bound(&self, key: &[u8]) -> Result<Iid> {
        let hdr = self.hdr.lock();
        self.bound(&hdr, key, false)
    }

    /// Position of the first entry > key.
    pub fn upper_bound(&self, key: &[u8]) -> Result<Iid> {
        let hdr = self.hdr.lock();
        self.bound(&hdr, key, true)
    }

    /// Position of the first entry in the tree.
    pub fn leaf_begin(&self) -> Result<Iid> {
        let hdr = self.hdr.lock();
        Ok(Iid::new(hdr.first_leaf, 0))
    }

    /// One past the last entry in the tree.
    pub fn leaf_end(&self) -> Result<Iid> {
        let hdr = self.hdr.lock();
        self.leaf_end_locked(&hdr)
    }

    /// Resolves a scan position to the heap rid stored there.
    pub fn get_rid(&self, iid: Iid) -> Result<Rid> {
        let hdr = self.hdr.lock();
        let guard = self.bpm.read_page(self.pid(iid.page_no))?;
        let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
        if iid.slot_no >= node.num_keys() {
            return Err(DbError::IndexEntryNotFound);
        }
        Ok(node.rid(iid.slot_no))
    }

    /// Key count and next-leaf pointer of a leaf, for scan stepping.
    pub(crate) fn leaf_info(&self, page_no: u32) -> Result<(usize, u32)> {
        let hdr = self.hdr.lock();
        let guard = self.bpm.read_page(self.pid(page_no))?;
        let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
        Ok((node.num_keys(), node.next_leaf()))
    }

    fn leaf_end_locked(&self, hdr: &IxFileHeader) -> Result<Iid> {
        let guard = self.bpm.read_page(self.pid(hdr.last_leaf))?;
        let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
        Ok(Iid::new(hdr.last_leaf, node.num_keys()))
    }

    fn bound(&self, hdr: &IxFileHeader, key: &[u8], upper: bool) -> Result<Iid> {
        let leaf_no = self.find_leaf(hdr, key)?;
        let (pos, num, next) = {
            let guard = self.bpm.read_page(self.pid(leaf_no))?;
            let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
            let pos = if upper {
                node.upper_bound(key, &self.cmp)
            } else {
                node.lower_bound(key, &self.cmp)
            };
            (pos, node.num_keys(), node.next_leaf())
        };
        if pos == num {
            if leaf_no == hdr.last_leaf {
                self.leaf_end_locked(hdr)
            } else {
                Ok(Iid::new(next, 0))
            }
        } else {
            Ok(Iid::new(leaf_no, pos))
        }
    }

    /// Descends from the root to the leaf that covers `key`.
    fn find_leaf(&self, hdr: &IxFileHeader, key: &[u8]) -> Result<u32> {
        let mut cur = hdr.root_page;
        loop {
            let guard = self.bpm.read_page(self.pid(cur))?;
            let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
            if node.is_leaf() {
                return Ok(cur);
            }
            cur = node.internal_lookup(key, &self.cmp);
        }
    }

    /// Walks up from `page_no`, refreshing each parent's separator to
    /// its child's first key until a separator already matches.
    fn maintain_parent(&self, hdr: &IxFileHeader, page_no: u32) -> Result<()> {
        let mut cur = page_no;
        loop {
            let (parent_no, first_key) = {
                let guard = self.bpm.read_page(self.pid(cur))?;
                let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
                if node.parent() == INVALID_PAGE_NO || node.num_keys() == 0 {
                    return Ok(());
                }
                (node.parent(), node.key(0).to_vec())
            };
            let changed = {
                let mut guard = self.bpm.write_page(self.pid(parent_no))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                let rank = node.find_child(cur).ok_or_else(|| {
                    DbError::Internal("child missing from parent node".into())
                })?;
                if node.key(rank) == &first_key[..] {
                    false
                } else {
                    node.set_key(rank, &first_key);
                    true
                }
            };
            if !changed {
                return Ok(());
            }
            cur = parent_no;
        }
    }

    /// Points a moved child's parent pointer at its new internal node.
    fn maintain_child(&self, hdr: &IxFileHeader, child_no: u32, parent_no: u32) -> Result<()> {
        let mut guard = self.bpm.write_page(self.pid(child_no))?;
        let mut node = BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
        node.set_parent(parent_no);
        Ok(())
    }

    /// Splits the full node at `page_no` and propagates the new
    /// separator upward, growing the tree at the root if necessary.
    fn split_and_propagate(&self, hdr: &mut IxFileHeader, page_no: u32) -> Result<()> {
        let (new_no, sep_key) = self.split_node(hdr, page_no)?;
        self.insert_into_parent(hdr, page_no, &sep_key, new_no)
    }

    /// Moves the upper half of a full node into a fresh right sibling.
    /// Returns the sibling's page and its first key.
    fn split_node(&self, hdr: &mut IxFileHeader, old_no: u32) -> Result<(u32, Vec<u8>)> {
        let new_no = self.bpm.new_page(self.fd)?.page_no;
        hdr.num_pages += 1;

        let left = hdr.btree_order / 2;
        let (is_leaf, parent, old_next, moved_keys, moved_rids) = {
            let mut guard = self.bpm.write_page(self.pid(old_no))?;
            let mut node = BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
            let total = node.num_keys();
            let (keys, rids) = node.extract_pairs(left, total - left);
            node.set_num_keys(left);
            (node.is_leaf(), node.parent(), node.next_leaf(), keys, rids)
        };

        {
            let mut guard = self.bpm.write_page(self.pid(new_no))?;
            let mut node = BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
            node.init(is_leaf);
            node.set_parent(parent);
            node.insert_pairs(0, &moved_keys, &moved_rids);
            if is_leaf {
                node.set_prev_leaf(old_no);
                node.set_next_leaf(old_next);
            }
        }

        if is_leaf {
            {
                let mut guard = self.bpm.write_page(self.pid(old_no))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                node.set_next_leaf(new_no);
            }
            // The old successor may be the sentinel, whose prev_leaf
            // tracks the last leaf.
            {
                let mut guard = self.bpm.write_page(self.pid(old_next))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                node.set_prev_leaf(new_no);
            }
            if hdr.last_leaf == old_no {
                hdr.last_leaf = new_no;
            }
        } else {
            for rid in &moved_rids {
                self.maintain_child(hdr, rid.page_no, new_no)?;
            }
        }

        let sep_key = moved_keys[..hdr.col_tot_len].to_vec();
        Ok((new_no, sep_key))
    }

    fn insert_into_parent(
        &self,
        hdr: &mut IxFileHeader,
        old_no: u32,
        sep_key: &[u8],
        new_no: u32,
    ) -> Result<()> {
        if hdr.root_page == old_no {
            let root_no = self.bpm.new_page(self.fd)?.page_no;
            hdr.num_pages += 1;

            let old_first = {
                let guard = self.bpm.read_page(self.pid(old_no))?;
                let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
                node.key(0).to_vec()
            };
            {
                let mut guard = self.bpm.write_page(self.pid(root_no))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                node.init(false);
                let mut keys = old_first;
                keys.extend_from_slice(sep_key);
                node.insert_pairs(0, &keys, &[Rid::new(old_no, 0), Rid::new(new_no, 0)]);
            }
            self.maintain_child(hdr, old_no, root_no)?;
            self.maintain_child(hdr, new_no, root_no)?;
            hdr.root_page = root_no;
            return Ok(());
        }

        let parent_no = {
            let guard = self.bpm.read_page(self.pid(old_no))?;
            let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
            node.parent()
        };
        self.maintain_child(hdr, new_no, parent_no)?;

        let num_after = {
            let mut guard = self.bpm.write_page(self.pid(parent_no))?;
            let mut node = BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
            let _ = node.insert(sep_key, Rid::new(new_no, 0), &self.cmp);
            node.num_keys()
        };
        if num_after == hdr.btree_order {
            self.split_and_propagate(hdr, parent_no)?;
        }
        Ok(())
    }

    /// Restores minimum occupancy after a delete, borrowing from or
    /// merging with a sibling (the left one when present) and
    /// recursing on the parent after a merge.
    fn coalesce_or_redistribute(&self, hdr: &mut IxFileHeader, node_no: u32) -> Result<()> {
        if node_no == hdr.root_page {
            return self.adjust_root(hdr, node_no);
        }

        let (num, parent_no) = {
            let guard = self.bpm.read_page(self.pid(node_no))?;
            let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
            (node.num_keys(), node.parent())
        };
        let min = hdr.btree_order / 2;
        if num >= min {
            return Ok(());
        }

        let (pos, neighbor_no) = {
            let guard = self.bpm.read_page(self.pid(parent_no))?;
            let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
            let pos = node.find_child(node_no).ok_or_else(|| {
                DbError::Internal("underflowed node missing from parent".into())
            })?;
            let idx = if pos == 0 { pos + 1 } else { pos - 1 };
            (pos, node.child(idx))
        };
        let neighbor_num = {
            let guard = self.bpm.read_page(self.pid(neighbor_no))?;
            BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order).num_keys()
        };

        if num + neighbor_num >= 2 * min {
            self.redistribute(hdr, neighbor_no, node_no, pos)
        } else {
            let (lt, rt) = if pos == 0 {
                (node_no, neighbor_no)
            } else {
                (neighbor_no, node_no)
            };
            self.coalesce(hdr, lt, rt, parent_no)?;
            self.coalesce_or_redistribute(hdr, parent_no)
        }
    }

    /// Rebalances entries between a node and its sibling so both end
    /// at half of their combined count.
    fn redistribute(
        &self,
        hdr: &IxFileHeader,
        neighbor_no: u32,
        node_no: u32,
        pos: usize,
    ) -> Result<()> {
        let (lt, rt) = if pos == 0 {
            (node_no, neighbor_no)
        } else {
            (neighbor_no, node_no)
        };

        let (lt_num, is_leaf) = {
            let guard = self.bpm.read_page(self.pid(lt))?;
            let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
            (node.num_keys(), node.is_leaf())
        };
        let rt_num = {
            let guard = self.bpm.read_page(self.pid(rt))?;
            BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order).num_keys()
        };
        let target_left = (lt_num + rt_num) / 2;

        if lt_num < target_left {
            // Shift the head of the right node onto the left
            let cnt = target_left - lt_num;
            let (keys, rids) = {
                let mut guard = self.bpm.write_page(self.pid(rt))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                let pairs = node.extract_pairs(0, cnt);
                node.erase_pairs(0, cnt);
                pairs
            };
            {
                let mut guard = self.bpm.write_page(self.pid(lt))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                node.insert_pairs(lt_num, &keys, &rids);
            }
            if !is_leaf {
                for rid in &rids {
                    self.maintain_child(hdr, rid.page_no, lt)?;
                }
            }
        } else if lt_num > target_left {
            // Shift the tail of the left node onto the right
            let cnt = lt_num - target_left;
            let (keys, rids) = {
                let mut guard = self.bpm.write_page(self.pid(lt))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                let pairs = node.extract_pairs(target_left, cnt);
                node.erase_pairs(target_left, cnt);
                pairs
            };
            {
                let mut guard = self.bpm.write_page(self.pid(rt))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                node.insert_pairs(0, &keys, &rids);
            }
            if !is_leaf {
                for rid in &rids {
                    self.maintain_child(hdr, rid.page_no, rt)?;
                }
            }
        }

        self.maintain_parent(hdr, rt)
    }

    /// Merges the right node into the left, unlinks it from the leaf
    /// chain, and drops its entry from the parent.
    fn coalesce(&self, hdr: &mut IxFileHeader, lt: u32, rt: u32, parent_no: u32) -> Result<()> {
        let (keys, rids, rt_is_leaf, rt_prev, rt_next) = {
            let guard = self.bpm.read_page(self.pid(rt))?;
            let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
            let num = node.num_keys();
            let mut keys = Vec::with_capacity(num * hdr.col_tot_len);
            let mut rids = Vec::with_capacity(num);
            for i in 0..num {
                keys.extend_from_slice(node.key(i));
                rids.push(node.rid(i));
            }
            (keys, rids, node.is_leaf(), node.prev_leaf(), node.next_leaf())
        };

        {
            let mut guard = self.bpm.write_page(self.pid(lt))?;
            let mut node = BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
            let pos = node.num_keys();
            node.insert_pairs(pos, &keys, &rids);
        }
        if !rt_is_leaf {
            for rid in &rids {
                self.maintain_child(hdr, rid.page_no, lt)?;
            }
        }

        {
            let mut guard = self.bpm.write_page(self.pid(parent_no))?;
            let mut node = BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
            let pos = node.find_child(rt).ok_or_else(|| {
                DbError::Internal("merged node missing from parent".into())
            })?;
            node.erase_pairs(pos, 1);
        }

        if rt_is_leaf {
            {
                let mut guard = self.bpm.write_page(self.pid(rt_prev))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                node.set_next_leaf(rt_next);
            }
            {
                let mut guard = self.bpm.write_page(self.pid(rt_next))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                node.set_prev_leaf(rt_prev);
            }
            if hdr.last_leaf == rt {
                hdr.last_leaf = lt;
            }
        }
        hdr.num_pages -= 1;
        Ok(())
    }

    /// Shrinks the tree at the root: a single-child internal root
    /// promotes its child; an empty leaf root stays as a degenerate
    /// empty tree with sentinel pointers.
    fn adjust_root(&self, hdr: &mut IxFileHeader, root_no: u32) -> Result<()> {
        let (is_leaf, num) = {
            let guard = self.bpm.read_page(self.pid(root_no))?;
            let node = BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order);
            (node.is_leaf(), node.num_keys())
        };

        if !is_leaf && num == 1 {
            let child_no = {
                let guard = self.bpm.read_page(self.pid(root_no))?;
                BTreeNodeRef::new(guard.data(), hdr.col_tot_len, hdr.btree_order).child(0)
            };
            self.maintain_child(hdr, child_no, INVALID_PAGE_NO)?;
            hdr.root_page = child_no;
            hdr.num_pages -= 1;
        } else if is_leaf && num == 0 {
            {
                let mut guard = self.bpm.write_page(self.pid(root_no))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                node.set_parent(INVALID_PAGE_NO);
                node.set_prev_leaf(IX_LEAF_HEADER_PAGE);
                node.set_next_leaf(IX_LEAF_HEADER_PAGE);
            }
            {
                let mut guard = self.bpm.write_page(self.pid(IX_LEAF_HEADER_PAGE))?;
                let mut node =
                    BTreeNode::new(guard.data_mut(), hdr.col_tot_len, hdr.btree_order);
                node.set_prev_leaf(root_no);
                node.set_next_leaf(root_no);
            }
            hdr.first_leaf = root_no;
            hdr.last_leaf = root_no;
        }
        Ok(())
    }
}
