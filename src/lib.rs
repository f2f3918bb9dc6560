//! ferrodb - a disk-oriented relational database engine in Rust
//!
//! The engine executes SQL over disk-resident tables with indexed
//! access, transactional semantics, and crash recovery. A database is
//! a directory: a catalog file, one heap file per table, one B+-tree
//! file per index, and a write-ahead log.
//!
//! # Architecture
//!
//! Bottom-up:
//!
//! - **Storage** (`storage`): page-granular file I/O by (file, page)
//!   plus a background disk scheduler.
//! - **Buffer pool** (`buffer`): fixed frame set with LRU-K
//!   replacement; pages are accessed through RAII guards that pin for
//!   their lifetime and record dirtiness.
//! - **Record manager** (`record`): bitmap slotted pages of
//!   fixed-width records with a free-page list threaded through page
//!   headers.
//! - **B+-tree index** (`index`): order-parameterized, disk-backed,
//!   composite fixed-width keys, unique, with a doubly linked leaf
//!   chain for range scans.
//! - **Catalog** (`catalog`): table/column/index metadata, rewritten
//!   in full after every DDL statement.
//! - **Transactions** (`txn`): strict two-phase locking at table and
//!   record granularity with wound-wait deadlock prevention.
//! - **Recovery** (`recovery`): write-ahead log with per-transaction
//!   LSN chains and analyze/redo/undo restart recovery.
//! - **Execution** (`execution`): pull-based executor trees for SQL
//!   DML, driven by plans from the `planner`.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrodb::catalog::ColDef;
//! use ferrodb::planner::Statement;
//! use ferrodb::tuple::{ColType, Value};
//! use ferrodb::{Engine, Session};
//!
//! Engine::create_database("demo_db").unwrap();
//! let engine = Engine::open("demo_db").unwrap();
//! let mut session = Session::new();
//!
//! engine
//!     .execute(
//!         &Statement::CreateTable {
//!             tab_name: "t".into(),
//!             col_defs: vec![ColDef {
//!                 name: "id".into(),
//!                 col_type: ColType::Int,
//!                 len: 4,
//!             }],
//!         },
//!         &mut session,
//!     )
//!     .unwrap();
//! engine
//!     .execute(
//!         &Statement::Insert {
//!             tab_name: "t".into(),
//!             values: vec![Value::Int(1)],
//!         },
//!         &mut session,
//!     )
//!     .unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
mod engine;
pub mod execution;
pub mod index;
pub mod planner;
pub mod record;
pub mod recovery;
pub mod storage;
pub mod tuple;
pub mod txn;

// Re-export commonly used types at the crate root
pub use common::{DbError, FileId, Iid, PageId, Result, Rid};
pub use engine::{Engine, Session};
