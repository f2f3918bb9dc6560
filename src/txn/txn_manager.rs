use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::catalog::{index_name, Database, TabMeta};
use crate::common::{Result, Rid, TxnId};
use crate::execution::Context;
use crate::recovery::{LogManager, LogPayload};
use crate::tuple::Record;

use super::lock_manager::LockManager;
use super::transaction::{Transaction, TxnState, WriteType};

/// Transaction manager: monotonic id allocation, the process-wide
/// transaction table, and the begin/commit/abort protocol. Abort
/// replays the transaction's write set backwards, applying the
/// inverse of every operation with compensating log records.
pub struct TransactionManager {
    lock_mgr: Arc<LockManager>,
    log_mgr: Arc<LogManager>,
    next_txn_id: AtomicU32,
    txn_map: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lock_mgr: Arc<LockManager>, log_mgr: Arc<LogManager>) -> Self {
        Self {
            lock_mgr,
            log_mgr,
            next_txn_id: AtomicU32::new(0),
            txn_map: Mutex::new(HashMap::new()),
        }
    }

    /// Continues id allocation past everything recovery observed.
    pub fn set_next_txn_id(&self, id: TxnId) {
        self.next_txn_id.store(id, Ordering::SeqCst);
    }

    /// Starts a transaction: allocates its id, registers it, and
    /// emits BEGIN.
    pub fn begin(&self) -> Result<Arc<Transaction>> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(id));
        self.txn_map.lock().insert(id, txn.clone());

        let lsn = self.log_mgr.append(id, txn.prev_lsn(), LogPayload::Begin)?;
        txn.set_prev_lsn(lsn);
        debug!("txn {} begun", id);
        Ok(txn)
    }

    pub fn get_transaction(&self, id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.lock().get(&id).cloned()
    }

    /// Commits: releases every held lock, emits COMMIT, and makes the
    /// log durable before returning.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<()> {
        for id in txn.take_lock_set() {
            self.lock_mgr.unlock(txn, id);
        }
        txn.clear();

        let lsn = self
            .log_mgr
            .append(txn.id(), txn.prev_lsn(), LogPayload::Commit)?;
        txn.set_prev_lsn(lsn);
        self.log_mgr.flush()?;
        txn.set_state(TxnState::Committed);
        debug!("txn {} committed", txn.id());
        Ok(())
    }

    /// Aborts: undoes the write set newest-first with compensating
    /// log records, releases locks, emits ABORT, and flushes.
    pub fn abort(&self, txn: &Arc<Transaction>, db: &Database) -> Result<()> {
        let ctx = Context::new(self.lock_mgr.clone(), self.log_mgr.clone(), txn.clone());

        for wr in txn.take_write_set_reversed() {
            let file = db.table_file(&wr.tab_name)?;
            let tab = db.get_table(&wr.tab_name)?;
            match wr.wtype {
                WriteType::Insert => {
                    ctx.log(LogPayload::Delete {
                        tab_name: wr.tab_name.clone(),
                        rid: wr.rid,
                        record: wr.record.clone(),
                    })?;
                    self.delete_index_entries(db, &tab, &wr.record, wr.rid, &ctx)?;
                    file.delete(wr.rid, Some(&ctx))?;
                }
                WriteType::Delete => {
                    ctx.log(LogPayload::Insert {
                        tab_name: wr.tab_name.clone(),
                        rid: wr.rid,
                        record: wr.record.clone(),
                    })?;
                    self.insert_index_entries(db, &tab, &wr.record, wr.rid, &ctx)?;
                    file.insert_at(wr.rid, wr.record.data())?;
                }
                WriteType::Update => {
                    // wr.record is the before-image
                    let current = file.get(wr.rid, Some(&ctx))?;
                    ctx.log(LogPayload::Update {
                        tab_name: wr.tab_name.clone(),
                        rid: wr.rid,
                        before: current.clone(),
                        after: wr.record.clone(),
                    })?;
                    self.delete_index_entries(db, &tab, &current, wr.rid, &ctx)?;
                    file.update(wr.rid, wr.record.data(), Some(&ctx))?;
                    self.insert_index_entries(db, &tab, &wr.record, wr.rid, &ctx)?;
                }
            }
        }

        for id in txn.take_lock_set() {
            self.lock_mgr.unlock(txn, id);
        }
        txn.clear();

        let lsn = self
            .log_mgr
            .append(txn.id(), txn.prev_lsn(), LogPayload::Abort)?;
        txn.set_prev_lsn(lsn);
        self.log_mgr.flush()?;
        txn.set_state(TxnState::Aborted);
        debug!("txn {} aborted", txn.id());
        Ok(())
    }

    fn delete_index_entries(
        &self,
        db: &Database,
        tab: &TabMeta,
        record: &Record,
        rid: Rid,
        ctx: &Context,
    ) -> Result<()> {
        for ix in &tab.indexes {
            let ix_name = index_name(&tab.name, &ix.col_names());
            let handle = db.index_handle(&ix_name)?;
            let key = ix.build_key(record);
            ctx.log(LogPayload::IndexDelete {
                ix_name,
                key: key.clone(),
                rid,
            })?;
            handle.delete_entry(&key)?;
        }
        Ok(())
    }

    fn insert_index_entries(
        &self,
        db: &Database,
        tab: &TabMeta,
        record: &Record,
        rid: Rid,
        ctx: &Context,
    ) -> Result<()> {
        for ix in &tab.indexes {
            let ix_name = index_name(&tab.name, &ix.col_names());
            let handle = db.index_handle(&ix_name)?;
            let key = ix.build_key(record);
            ctx.log(LogPayload::IndexInsert {
                ix_name,
                key: key.clone(),
                rid,
            })?;
            handle.insert_entry(&key, rid)?;
        }
        Ok(())
    }
}
