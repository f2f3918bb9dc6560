/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page number, used as the end-of-list marker in free lists
/// and leaf chains.
pub const INVALID_PAGE_NO: u32 = u32::MAX;

/// Default number of frames in the buffer pool
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 256;

/// Default K value for the LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Capacity of the in-memory log buffer; the buffer is spilled to the
/// log file whenever an append would overflow it.
pub const LOG_BUFFER_SIZE: usize = 32 * 1024;

/// Number of outer tuples buffered per block by the nested-loop join
pub const JOIN_BUFFER_SIZE: usize = 100;

/// Page 0 of every table file holds the serialized file header.
pub const RM_FILE_HDR_PAGE: u32 = 0;

/// First data page of a table file
pub const RM_FIRST_RECORD_PAGE: u32 = 1;

/// Page 0 of every index file holds the serialized file header.
pub const IX_FILE_HDR_PAGE: u32 = 0;

/// Page 1 of every index file is the leaf-chain sentinel: its
/// next_leaf always points at the first leaf and its prev_leaf at the
/// last leaf.
pub const IX_LEAF_HEADER_PAGE: u32 = 1;

/// Page 2 of every index file is the initial root (an empty leaf).
pub const IX_INIT_ROOT_PAGE: u32 = 2;

/// Catalog file name inside a database directory
pub const DB_META_NAME: &str = "db.meta";

/// Write-ahead log file name inside a database directory
pub const LOG_FILE_NAME: &str = "log";

/// File that SELECT output is appended to unless ellipsis mode is set
pub const OUTPUT_FILE_NAME: &str = "output.txt";
