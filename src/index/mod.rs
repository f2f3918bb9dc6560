mod btree_index;
mod btree_page;
mod btree_scan;
mod key_comparator;

pub use btree_index::{BTreeIndex, IxFileHeader};
pub use btree_page::{max_order_for, BTreeNode, BTreeNodeRef};
pub use btree_scan::IxScan;
pub use key_comparator::{
    max_col_bytes, min_col_bytes, CompositeComparator, KeyComparator,
};
