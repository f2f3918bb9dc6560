mod lock_manager;
mod transaction;
mod txn_manager;

pub use lock_manager::{LockManager, LockMode};
pub use transaction::{
    LockDataId, LockDataType, Transaction, TxnState, WriteRecord, WriteType,
};
pub use txn_manager::TransactionManager;
