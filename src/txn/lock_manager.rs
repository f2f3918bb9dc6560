use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::{DbError, FileId, Result, Rid, TxnId};

use super::transaction::{LockDataId, Transaction, TxnState};

/// Hierarchical lock modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

impl LockMode {
    /// Standard compatibility matrix.
    pub fn compatible(self, other: LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (IntentionShared, Exclusive) | (Exclusive, IntentionShared) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) => true,
            (IntentionExclusive, _) | (_, IntentionExclusive) => false,
            (Shared, Shared) => true,
            (Shared, _) | (_, Shared) => false,
            _ => false,
        }
    }

    /// Whether holding `self` already satisfies a request for `other`.
    fn covers(self, other: LockMode) -> bool {
        use LockMode::*;
        match self {
            Exclusive => true,
            SharedIntentionExclusive => !matches!(other, Exclusive),
            Shared => matches!(other, Shared | IntentionShared),
            IntentionExclusive => {
                matches!(other, IntentionExclusive | IntentionShared)
            }
            IntentionShared => matches!(other, IntentionShared),
        }
    }

    /// Least mode at least as strong as both, for in-place upgrades.
    fn join(self, other: LockMode) -> LockMode {
        use LockMode::*;
        if self.covers(other) {
            return self;
        }
        if other.covers(self) {
            return other;
        }
        match (self, other) {
            (Shared, IntentionExclusive) | (IntentionExclusive, Shared) => {
                SharedIntentionExclusive
            }
            _ => Exclusive,
        }
    }
}

/// One entry in a lock request queue.
#[derive(Debug, Clone)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

#[derive(Default)]
struct LockQueue {
    requests: Vec<LockRequest>,
    cv: Arc<Condvar>,
}

enum Probe {
    /// Request can be granted now
    Grant,
    /// Already held in a covering mode
    AlreadyHeld,
    /// Must wait behind a younger conflicting holder
    Wait,
}

/// Lock manager: table- and record-granularity locks with wound-wait
/// deadlock prevention. One mutex guards all queues; each queue owns a
/// condition variable that waiters block on and unlockers broadcast.
pub struct LockManager {
    latch: Mutex<HashMap<LockDataId, LockQueue>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            latch: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_shared_on_table(&self, txn: &Transaction, fd: FileId) -> Result<()> {
        self.lock_table(txn, fd, LockMode::Shared)
    }

    pub fn lock_exclusive_on_table(&self, txn: &Transaction, fd: FileId) -> Result<()> {
        self.lock_table(txn, fd, LockMode::Exclusive)
    }

    pub fn lock_is_on_table(&self, txn: &Transaction, fd: FileId) -> Result<()> {
        self.lock_table(txn, fd, LockMode::IntentionShared)
    }

    pub fn lock_ix_on_table(&self, txn: &Transaction, fd: FileId) -> Result<()> {
        self.lock_table(txn, fd, LockMode::IntentionExclusive)
    }

    fn lock_table(&self, txn: &Transaction, fd: FileId, mode: LockMode) -> Result<()> {
        let key = LockDataId::table(fd);
        let mut table = self.latch.lock();
        txn.set_state(TxnState::Growing);

        loop {
            let queue = table.entry(key).or_default();
            match Self::probe(queue, txn.id(), mode) {
                Ok(Probe::AlreadyHeld) => return Ok(()),
                Ok(Probe::Grant) => {
                    Self::grant(queue, txn.id(), mode);
                    txn.add_lock(key);
                    return Ok(());
                }
                Ok(Probe::Wait) => {
                    Self::enqueue_waiter(queue, txn.id(), mode);
                    let cv = queue.cv.clone();
                    debug!("txn {} waiting for table lock on {}", txn.id(), fd);
                    cv.wait(&mut table);
                }
                Err(e) => {
                    Self::drop_waiter(&mut table, key, txn.id());
                    return Err(e);
                }
            }
        }
    }

    pub fn lock_shared_on_record(
        &self,
        txn: &Transaction,
        rid: Rid,
        fd: FileId,
    ) -> Result<()> {
        self.lock_record(txn, rid, fd, LockMode::Shared)
    }

    pub fn lock_exclusive_on_record(
        &self,
        txn: &Transaction,
        rid: Rid,
        fd: FileId,
    ) -> Result<()> {
        self.lock_record(txn, rid, fd, LockMode::Exclusive)
    }

    fn lock_record(
        &self,
        txn: &Transaction,
        rid: Rid,
        fd: FileId,
        mode: LockMode,
    ) -> Result<()> {
        let table_key = LockDataId::table(fd);
        let record_key = LockDataId::record(fd, rid);
        let mut table = self.latch.lock();
        txn.set_state(TxnState::Growing);

        loop {
            // A table-level hold decides the request before the record
            // queue is consulted: the requester's own covering table
            // lock satisfies it outright, another transaction's
            // conflicting table hold blocks it.
            let mut table_blocked = false;
            let mut wounded = false;
            let mut own_shared = false;
            let mut others = 0;
            if let Some(queue) = table.get(&table_key) {
                for req in queue.requests.iter().filter(|r| r.granted) {
                    if req.txn_id == txn.id() {
                        if req.mode.covers(mode) {
                            return Ok(());
                        }
                        own_shared = req.mode == LockMode::Shared;
                    } else {
                        others += 1;
                        let conflicts = match mode {
                            LockMode::Shared => req.mode == LockMode::Exclusive,
                            _ => matches!(
                                req.mode,
                                LockMode::Shared
                                    | LockMode::SharedIntentionExclusive
                                    | LockMode::Exclusive
                            ),
                        };
                        if conflicts {
                            table_blocked = true;
                            if req.txn_id < txn.id() {
                                wounded = true;
                            }
                        }
                    }
                }
            }
            if wounded {
                Self::drop_waiter(&mut table, record_key, txn.id());
                debug!("txn {} wounded by a table-lock holder", txn.id());
                return Err(DbError::DeadlockPrevention(txn.id()));
            }
            // Sole table-S holder asking for a row X: upgrade the
            // table lock in place instead of acquiring row locks.
            if mode == LockMode::Exclusive && own_shared && others == 0 {
                if let Some(queue) = table.get_mut(&table_key) {
                    Self::grant(queue, txn.id(), LockMode::Exclusive);
                    return Ok(());
                }
            }

            if table_blocked {
                let cv = table.get(&table_key).unwrap().cv.clone();
                cv.wait(&mut table);
                continue;
            }

            let queue = table.entry(record_key).or_default();
            match Self::probe(queue, txn.id(), mode) {
                Ok(Probe::AlreadyHeld) => return Ok(()),
                Ok(Probe::Grant) => {
                    Self::grant(queue, txn.id(), mode);
                    txn.add_lock(record_key);
                    return Ok(());
                }
                Ok(Probe::Wait) => {
                    Self::enqueue_waiter(queue, txn.id(), mode);
                    let cv = queue.cv.clone();
                    debug!("txn {} waiting for record lock on {}", txn.id(), rid);
                    cv.wait(&mut table);
                }
                Err(e) => {
                    Self::drop_waiter(&mut table, record_key, txn.id());
                    return Err(e);
                }
            }
        }
    }

    /// Releases one lock. Moves the transaction to SHRINKING and wakes
    /// every waiter on the queue.
    pub fn unlock(&self, txn: &Transaction, id: LockDataId) -> bool {
        let mut table = self.latch.lock();
        txn.set_state(TxnState::Shrinking);

        let Some(queue) = table.get_mut(&id) else {
            return false;
        };
        queue.requests.retain(|r| r.txn_id != txn.id());
        if queue.requests.is_empty() {
            table.remove(&id);
        } else {
            queue.cv.notify_all();
        }
        true
    }

    /// Examines a queue for a request of `mode` by `txn_id`, applying
    /// wound-wait against conflicting granted holders.
    fn probe(queue: &LockQueue, txn_id: TxnId, mode: LockMode) -> Result<Probe> {
        let mut blocked = false;
        for req in queue.requests.iter().filter(|r| r.granted) {
            if req.txn_id == txn_id {
                if req.mode.covers(mode) {
                    return Ok(Probe::AlreadyHeld);
                }
            } else if !req.mode.compatible(mode) {
                blocked = true;
                if req.txn_id < txn_id {
                    return Err(DbError::DeadlockPrevention(txn_id));
                }
            }
        }
        if blocked {
            Ok(Probe::Wait)
        } else {
            Ok(Probe::Grant)
        }
    }

    /// Grants (or upgrades) the transaction's request in the queue.
    fn grant(queue: &mut LockQueue, txn_id: TxnId, mode: LockMode) {
        for req in queue.requests.iter_mut() {
            if req.txn_id == txn_id {
                req.mode = req.mode.join(mode);
                req.granted = true;
                return;
            }
        }
        queue.requests.push(LockRequest {
            txn_id,
            mode,
            granted: true,
        });
    }

    /// Ensures a waiting (ungranted) request is present.
    fn enqueue_waiter(queue: &mut LockQueue, txn_id: TxnId, mode: LockMode) {
        if !queue.requests.iter().any(|r| r.txn_id == txn_id) {
            queue.requests.push(LockRequest {
                txn_id,
                mode,
                granted: false,
            });
        }
    }

    /// Removes a transaction's ungranted request when it is wounded
    /// while waiting.
    fn drop_waiter(
        table: &mut HashMap<LockDataId, LockQueue>,
        key: LockDataId,
        txn_id: TxnId,
    ) {
        if let Some(queue) = table.get_mut(&key) {
            queue.requests.retain(|r| r.txn_id != txn_id || r.granted);
            if queue.requests.is_empty() {
                table.remove(&key);
            }
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn fd() -> FileId {
        FileId::new(1)
    }

    #[test]
    fn test_compatibility_matrix() {
        use LockMode::*;
        let modes = [
            IntentionShared,
            IntentionExclusive,
            Shared,
            SharedIntentionExclusive,
            Exclusive,
        ];
        let expect = [
            [true, true, true, true, false],
            [true, true, false, false, false],
            [true, false, true, false, false],
            [true, false, false, false, false],
            [false, false, false, false, false],
        ];
        for (i, &a) in modes.iter().enumerate() {
            for (j, &b) in modes.iter().enumerate() {
                assert_eq!(a.compatible(b), expect[i][j], "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_shared_locks_coexist() {
        let lm = LockManager::new();
        let t1 = Transaction::new(1);
        let t2 = Transaction::new(2);
        lm.lock_shared_on_table(&t1, fd()).unwrap();
        lm.lock_shared_on_table(&t2, fd()).unwrap();
        assert_eq!(t1.state(), TxnState::Growing);
    }

    #[test]
    fn test_reacquire_is_noop() {
        let lm = LockManager::new();
        let t1 = Transaction::new(1);
        lm.lock_exclusive_on_table(&t1, fd()).unwrap();
        lm.lock_exclusive_on_table(&t1, fd()).unwrap();
        lm.lock_shared_on_table(&t1, fd()).unwrap();
        assert_eq!(t1.take_lock_set().len(), 1);
    }

    #[test]
    fn test_wound_wait_younger_aborts() {
        let lm = LockManager::new();
        let older = Transaction::new(1);
        let younger = Transaction::new(2);

        lm.lock_exclusive_on_table(&older, fd()).unwrap();
        let res = lm.lock_exclusive_on_table(&younger, fd());
        assert!(matches!(res, Err(DbError::DeadlockPrevention(2))));
    }

    #[test]
    fn test_older_waits_for_younger() {
        let lm = Arc::new(LockManager::new());
        let younger = Arc::new(Transaction::new(5));
        lm.lock_exclusive_on_table(&younger, fd()).unwrap();

        let lm2 = lm.clone();
        let younger2 = younger.clone();
        let waiter = std::thread::spawn(move || {
            let older = Transaction::new(3);
            // Blocks until the younger holder releases
            lm2.lock_exclusive_on_table(&older, fd()).unwrap();
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        for id in younger2.take_lock_set() {
            lm.unlock(&younger, id);
        }
        waiter.join().unwrap();
    }

    #[test]
    fn test_record_lock_upgrade_in_place() {
        let lm = LockManager::new();
        let t1 = Transaction::new(1);
        let rid = Rid::new(2, 3);
        lm.lock_shared_on_record(&t1, rid, fd()).unwrap();
        // Sole holder: S -> X upgrade succeeds without waiting
        lm.lock_exclusive_on_record(&t1, rid, fd()).unwrap();

        let t2 = Transaction::new(2);
        assert!(matches!(
            lm.lock_shared_on_record(&t2, rid, fd()),
            Err(DbError::DeadlockPrevention(2))
        ));
    }

    #[test]
    fn test_row_lock_blocked_by_table_exclusive() {
        let lm = LockManager::new();
        let t1 = Transaction::new(1);
        let t2 = Transaction::new(2);
        lm.lock_exclusive_on_table(&t1, fd()).unwrap();
        assert!(matches!(
            lm.lock_shared_on_record(&t2, Rid::new(1, 0), fd()),
            Err(DbError::DeadlockPrevention(2))
        ));
    }

    #[test]
    fn test_table_lock_covers_own_rows() {
        let lm = LockManager::new();
        let t1 = Transaction::new(1);
        lm.lock_exclusive_on_table(&t1, fd()).unwrap();
        lm.lock_exclusive_on_record(&t1, Rid::new(1, 0), fd()).unwrap();
        lm.lock_shared_on_record(&t1, Rid::new(1, 1), fd()).unwrap();
        // Only the table lock entered the lock set
        assert_eq!(t1.take_lock_set().len(), 1);
    }

    #[test]
    fn test_unlock_wakes_older_waiter() {
        let lm = Arc::new(LockManager::new());
        let younger = Arc::new(Transaction::new(9));
        let rid = Rid::new(0, 1);
        lm.lock_exclusive_on_record(&younger, rid, fd()).unwrap();

        let lm2 = lm.clone();
        let waiter = std::thread::spawn(move || {
            let older = Transaction::new(1);
            lm2.lock_shared_on_record(&older, rid, fd()).unwrap();
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        for id in younger.take_lock_set() {
            lm.unlock(&younger, id);
        }
        waiter.join().unwrap();
        assert_eq!(younger.state(), TxnState::Shrinking);
    }

    #[test]
    fn test_intention_locks_conflict_with_shared() {
        let lm = LockManager::new();
        let t1 = Transaction::new(1);
        let t2 = Transaction::new(2);
        lm.lock_ix_on_table(&t1, fd()).unwrap();
        assert!(matches!(
            lm.lock_shared_on_table(&t2, fd()),
            Err(DbError::DeadlockPrevention(2))
        ));
        // IS is compatible with IX
        lm.lock_is_on_table(&t2, fd()).unwrap();
    }
}
