use std::sync::Arc;

use crate::common::{Lsn, Result};
use crate::recovery::{LogManager, LogPayload};
use crate::txn::{LockManager, Transaction};

/// Per-statement execution context: the active transaction plus the
/// shared lock and log managers. Passing `None` instead of a context
/// (recovery, rollback internals) skips locking and logging.
pub struct Context {
    pub lock_mgr: Arc<LockManager>,
    pub log_mgr: Arc<LogManager>,
    pub txn: Arc<Transaction>,
    /// Suppresses output.txt writing when set
    pub output_ellipsis: bool,
}

impl Context {
    pub fn new(
        lock_mgr: Arc<LockManager>,
        log_mgr: Arc<LogManager>,
        txn: Arc<Transaction>,
    ) -> Self {
        Self {
            lock_mgr,
            log_mgr,
            txn,
            output_ellipsis: false,
        }
    }

    /// Appends a log record for this context's transaction and links
    /// it into the transaction's LSN chain.
    pub fn log(&self, payload: LogPayload) -> Result<Lsn> {
        let lsn = self
            .log_mgr
            .append(self.txn.id(), self.txn.prev_lsn(), payload)?;
        self.txn.set_prev_lsn(lsn);
        Ok(lsn)
    }
}
