use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::catalog::Database;
use crate::common::{DbError, Lsn, Result, TxnId, INVALID_LSN, LOG_BUFFER_SIZE};
use crate::storage::DiskManager;

use super::log_record::{LogPayload, LogRecord, LOG_HEADER_SIZE};

/// Crash recovery, run at startup before any query: analyze the log
/// into an LSN-indexed record vector, redo every table and index
/// effect, then undo the transactions that never completed.
pub struct RecoveryManager<'a> {
    db: &'a Database,
    dm: Arc<DiskManager>,
    /// All log records; LSNs are dense, so lsn == position
    logs: Vec<LogRecord>,
    /// Last LSN seen per transaction
    att: BTreeMap<TxnId, Lsn>,
}

impl<'a> RecoveryManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        let dm = db.buffer_pool().disk_manager().clone();
        Self {
            db,
            dm,
            logs: Vec::new(),
            att: BTreeMap::new(),
        }
    }

    /// Runs the three phases and returns (next LSN, next txn id) so
    /// the log manager and transaction manager continue monotonically.
    pub fn recover(&mut self) -> Result<(Lsn, TxnId)> {
        self.analyze()?;
        if !self.logs.is_empty() {
            info!("recovery: replaying {} log records", self.logs.len());
            self.redo()?;
            self.undo()?;
            self.db.buffer_pool().flush_all()?;
        }
        let next_lsn = self.logs.len() as Lsn;
        let next_txn_id = self.att.keys().next_back().map_or(0, |id| id + 1);
        Ok((next_lsn, next_txn_id))
    }

    /// Parses the log sequentially, reconstructing the per-transaction
    /// last-LSN table and the set of touched tables, whose indexes are
    /// dropped and recreated empty for the redo pass to rebuild.
    fn analyze(&mut self) -> Result<()> {
        let mut tables: HashSet<String> = HashSet::new();
        let mut buffer = vec![0u8; LOG_BUFFER_SIZE];
        let mut file_off: u64 = 0;

        loop {
            let len = self.dm.read_log(&mut buffer, file_off)?;
            if len == 0 {
                break;
            }
            let mut offset = 0;
            while offset + LOG_HEADER_SIZE <= len {
                let Some(tot_len) = LogRecord::peek_len(&buffer[offset..len]) else {
                    break;
                };
                if offset + tot_len > len {
                    break;
                }
                let (record, consumed) = LogRecord::deserialize(&buffer[offset..len])?;
                offset += consumed;

                if record.lsn as usize != self.logs.len() {
                    return Err(DbError::Internal(format!(
                        "log sequence gap: expected lsn {}, found {}",
                        self.logs.len(),
                        record.lsn
                    )));
                }
                self.att.insert(record.txn_id, record.lsn);
                match &record.payload {
                    LogPayload::Insert { tab_name, .. }
                    | LogPayload::Delete { tab_name, .. }
                    | LogPayload::Update { tab_name, .. } => {
                        tables.insert(tab_name.clone());
                    }
                    _ => {}
                }
                self.logs.push(record);
            }
            if offset == 0 {
                // A torn tail from a crash mid-append ends the log
                warn!("discarding {} trailing log bytes", len);
                break;
            }
            file_off += offset as u64;
        }

        for table in &tables {
            if self.db.is_table(table) {
                debug!("recovery: resetting indexes of {}", table);
                self.db.reset_indexes(table)?;
            }
        }
        Ok(())
    }

    /// Forward-applies every table and index effect in log order,
    /// after first rolling every transaction chain back so replay
    /// starts from a known base. Already-applied effects are
    /// tolerated.
    fn redo(&mut self) -> Result<()> {
        self.rollback(true)?;
        for i in 0..self.logs.len() {
            let record = self.logs[i].clone();
            match &record.payload {
                LogPayload::Insert {
                    tab_name,
                    rid,
                    record: row,
                } => {
                    let Ok(file) = self.db.table_file(tab_name) else {
                        continue;
                    };
                    if file.insert_at(*rid, row.data()).is_err() {
                        // The page was never allocated before the
                        // crash; a fresh insert recreates the row
                        let new_rid = file.insert(row.data(), None)?;
                        if new_rid != *rid {
                            warn!(
                                "redo insert landed at {} instead of {}",
                                new_rid, rid
                            );
                        }
                    }
                }
                LogPayload::Update {
                    tab_name,
                    rid,
                    after,
                    ..
                } => {
                    let Ok(file) = self.db.table_file(tab_name) else {
                        continue;
                    };
                    if file.update(*rid, after.data(), None).is_err() {
                        file.insert_at(*rid, after.data())?;
                    }
                }
                LogPayload::Delete { tab_name, rid, .. } => {
                    let Ok(file) = self.db.table_file(tab_name) else {
                        continue;
                    };
                    match file.delete(*rid, None) {
                        Ok(()) | Err(DbError::RecordNotFound(_)) | Err(DbError::PageNotExist(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                LogPayload::IndexInsert { ix_name, key, rid } => {
                    if let Ok(handle) = self.db.index_handle(ix_name) {
                        handle.insert_entry(key, *rid)?;
                    }
                }
                LogPayload::IndexDelete { ix_name, key, .. } => {
                    if let Ok(handle) = self.db.index_handle(ix_name) {
                        handle.delete_entry(key)?;
                    }
                }
                LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => {}
            }
        }
        Ok(())
    }

    /// Undoes every transaction that neither committed nor aborted.
    fn undo(&mut self) -> Result<()> {
        self.rollback(false)
    }

    /// Walks each transaction's LSN chain backwards applying inverse
    /// operations. In redo mode the walk passes through COMMIT/ABORT
    /// markers down to BEGIN and skips index records (redo rebuilds
    /// indexes from scratch); in undo mode COMMIT/ABORT terminate the
    /// chain and index records are inverted too.
    fn rollback(&mut self, redo_mode: bool) -> Result<()> {
        let chains: Vec<Lsn> = self.att.values().rev().copied().collect();
        for last in chains {
            let mut now = last;
            while now != INVALID_LSN {
                let record = self.logs[now as usize].clone();
                match &record.payload {
                    LogPayload::Insert { tab_name, rid, .. } => {
                        if let Ok(file) = self.db.table_file(tab_name) {
                            match file.delete(*rid, None) {
                                Ok(())
                                | Err(DbError::RecordNotFound(_))
                                | Err(DbError::PageNotExist(_)) => {}
                                Err(e) => return Err(e),
                            }
                        }
                    }
                    LogPayload::Update {
                        tab_name,
                        rid,
                        before,
                        ..
                    } => {
                        if let Ok(file) = self.db.table_file(tab_name) {
                            match file.update(*rid, before.data(), None) {
                                Ok(())
                                | Err(DbError::RecordNotFound(_))
                                | Err(DbError::PageNotExist(_)) => {}
                                Err(e) => return Err(e),
                            }
                        }
                    }
                    LogPayload::Delete {
                        tab_name,
                        rid,
                        record: row,
                    } => {
                        if let Ok(file) = self.db.table_file(tab_name) {
                            match file.insert_at(*rid, row.data()) {
                                Ok(()) | Err(DbError::PageNotExist(_)) => {}
                                Err(e) => return Err(e),
                            }
                        }
                    }
                    LogPayload::IndexInsert { ix_name, key, .. } => {
                        if !redo_mode {
                            if let Ok(handle) = self.db.index_handle(ix_name) {
                                handle.delete_entry(key)?;
                            }
                        }
                    }
                    LogPayload::IndexDelete { ix_name, key, rid } => {
                        if !redo_mode {
                            if let Ok(handle) = self.db.index_handle(ix_name) {
                                handle.insert_entry(key, *rid)?;
                            }
                        }
                    }
                    LogPayload::Begin => {}
                    LogPayload::Commit | LogPayload::Abort => {
                        if !redo_mode {
                            // A completed transaction: nothing to undo
                            break;
                        }
                    }
                }
                now = record.prev_lsn;
            }
        }
        Ok(())
    }
}
