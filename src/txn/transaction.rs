use std::collections::HashSet;

use parking_lot::Mutex;

use crate::common::{FileId, Lsn, Rid, TxnId, INVALID_LSN};
use crate::tuple::Record;

/// Lifecycle state of a transaction under strict two-phase locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Default,
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Granularity of a lockable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockDataType {
    Table,
    Record,
}

/// Identifier of a lockable object: a whole table file or one record
/// within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockDataId {
    pub fd: FileId,
    pub kind: LockDataType,
    pub rid: Rid,
}

impl LockDataId {
    pub fn table(fd: FileId) -> Self {
        Self {
            fd,
            kind: LockDataType::Table,
            rid: Rid::new(0, 0),
        }
    }

    pub fn record(fd: FileId, rid: Rid) -> Self {
        Self {
            fd,
            kind: LockDataType::Record,
            rid,
        }
    }
}

/// Kind of write recorded in a transaction's write set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Insert,
    Delete,
    Update,
}

/// One applied write, kept so abort can run the inverse operation.
/// For updates the record is the before-image; for inserts and
/// deletes it is the inserted or deleted row.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub wtype: WriteType,
    pub tab_name: String,
    pub rid: Rid,
    pub record: Record,
}

impl WriteRecord {
    pub fn new(wtype: WriteType, tab_name: &str, rid: Rid, record: Record) -> Self {
        Self {
            wtype,
            tab_name: tab_name.to_string(),
            rid,
            record,
        }
    }
}

/// A transaction: id, 2PL state, LSN chain tail, the ordered write set
/// for undo, and the set of held locks for bulk release.
pub struct Transaction {
    id: TxnId,
    state: Mutex<TxnState>,
    prev_lsn: Mutex<Lsn>,
    write_set: Mutex<Vec<WriteRecord>>,
    lock_set: Mutex<HashSet<LockDataId>>,
    /// Set by an explicit BEGIN; suppresses statement auto-commit.
    explicit_mode: Mutex<bool>,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            state: Mutex::new(TxnState::Default),
            prev_lsn: Mutex::new(INVALID_LSN),
            write_set: Mutex::new(Vec::new()),
            lock_set: Mutex::new(HashSet::new()),
            explicit_mode: Mutex::new(false),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TxnState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TxnState) {
        *self.state.lock() = state;
    }

    pub fn prev_lsn(&self) -> Lsn {
        *self.prev_lsn.lock()
    }

    pub fn set_prev_lsn(&self, lsn: Lsn) {
        *self.prev_lsn.lock() = lsn;
    }

    pub fn is_explicit(&self) -> bool {
        *self.explicit_mode.lock()
    }

    pub fn set_explicit(&self, explicit: bool) {
        *self.explicit_mode.lock() = explicit;
    }

    pub fn append_write_record(&self, wr: WriteRecord) {
        self.write_set.lock().push(wr);
    }

    /// Removes and returns the most recent write, if any.
    pub fn pop_write_record(&self) -> Option<WriteRecord> {
        self.write_set.lock().pop()
    }

    /// Drains the write set in reverse application order (newest
    /// first).
    pub fn take_write_set_reversed(&self) -> Vec<WriteRecord> {
        let mut ws = std::mem::take(&mut *self.write_set.lock());
        ws.reverse();
        ws
    }

    pub fn add_lock(&self, id: LockDataId) {
        self.lock_set.lock().insert(id);
    }

    pub fn take_lock_set(&self) -> Vec<LockDataId> {
        self.lock_set.lock().drain().collect()
    }

    /// Clears transaction-scoped resources at commit/abort.
    pub fn clear(&self) {
        self.write_set.lock().clear();
        self.lock_set.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_set_order() {
        let txn = Transaction::new(1);
        for i in 0..3 {
            txn.append_write_record(WriteRecord::new(
                WriteType::Insert,
                "t",
                Rid::new(1, i),
                Record::new(4),
            ));
        }
        let ws = txn.take_write_set_reversed();
        assert_eq!(ws.len(), 3);
        assert_eq!(ws[0].rid, Rid::new(1, 2));
        assert_eq!(ws[2].rid, Rid::new(1, 0));
    }

    #[test]
    fn test_lock_set_dedup() {
        let txn = Transaction::new(1);
        let id = LockDataId::table(FileId::new(3));
        txn.add_lock(id);
        txn.add_lock(id);
        assert_eq!(txn.take_lock_set().len(), 1);
    }

    #[test]
    fn test_state_transitions() {
        let txn = Transaction::new(7);
        assert_eq!(txn.state(), TxnState::Default);
        txn.set_state(TxnState::Growing);
        assert_eq!(txn.state(), TxnState::Growing);
        assert_eq!(txn.prev_lsn(), INVALID_LSN);
        txn.set_prev_lsn(5);
        assert_eq!(txn.prev_lsn(), 5);
    }
}
