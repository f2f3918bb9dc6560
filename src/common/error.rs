use thiserror::Error;

use super::types::Rid;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database {0} already exists")]
    DatabaseExists(String),

    #[error("Database {0} not found")]
    DatabaseNotFound(String),

    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Column {0} not found")]
    ColumnNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Index entry not found")]
    IndexEntryNotFound,

    #[error("Record not found at {0}")]
    RecordNotFound(Rid),

    #[error("Page {0} does not exist")]
    PageNotExist(u32),

    #[error("Invalid value count: expected {expected}, got {got}")]
    InvalidValueCount { expected: usize, got: usize },

    #[error("Incompatible types: {lhs} and {rhs}")]
    IncompatibleType { lhs: String, rhs: String },

    #[error("String of length {len} overflows column of length {max}")]
    StringOverflow { len: usize, max: usize },

    #[error("Unique constraint violated on index {0}")]
    UniqueViolation(String),

    #[error("Transaction {0} aborted by deadlock prevention")]
    DeadlockPrevention(u32),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(u32),

    #[error("Page is still pinned")]
    PageStillPinned,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
