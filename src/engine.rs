use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::buffer::BufferPoolManager;
use crate::catalog::Database;
use crate::common::{DbError, Result, DEFAULT_BUFFER_POOL_SIZE, DEFAULT_LRUK_K};
use crate::execution::{Context, QueryManager, QueryResult};
use crate::planner::{Planner, Statement};
use crate::recovery::{LogManager, RecoveryManager};
use crate::storage::DiskManager;
use crate::txn::{LockManager, Transaction, TransactionManager};

/// Per-connection state: the explicit transaction in progress, if
/// any, and the client's output mode.
#[derive(Default)]
pub struct Session {
    txn: Option<Arc<Transaction>>,
    pub output_ellipsis: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }
}

/// The assembled engine over one open database. Statements outside an
/// explicit transaction run in their own auto-committed transaction;
/// BEGIN switches the session to explicit mode until COMMIT or
/// ABORT/ROLLBACK.
pub struct Engine {
    db: Database,
    lock_mgr: Arc<LockManager>,
    log_mgr: Arc<LogManager>,
    txn_mgr: TransactionManager,
    planner: Planner,
    ql: QueryManager,
}

impl Engine {
    pub fn create_database<P: AsRef<Path>>(path: P) -> Result<()> {
        Database::create(path)
    }

    pub fn destroy_database<P: AsRef<Path>>(path: P) -> Result<()> {
        Database::destroy(path)
    }

    /// Opens a database and runs crash recovery before accepting any
    /// statement.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Engine> {
        let dm = Arc::new(DiskManager::new());
        let bpm = Arc::new(BufferPoolManager::new(
            DEFAULT_BUFFER_POOL_SIZE,
            DEFAULT_LRUK_K,
            dm.clone(),
        ));
        let db = Database::open(path, bpm)?;

        let (next_lsn, next_txn_id) = RecoveryManager::new(&db).recover()?;
        let lock_mgr = Arc::new(LockManager::new());
        let log_mgr = Arc::new(LogManager::new(dm));
        log_mgr.set_next_lsn(next_lsn);
        let txn_mgr = TransactionManager::new(lock_mgr.clone(), log_mgr.clone());
        txn_mgr.set_next_txn_id(next_txn_id);
        info!(
            "database open, next lsn {}, next txn id {}",
            next_lsn, next_txn_id
        );

        Ok(Engine {
            db,
            lock_mgr,
            log_mgr,
            txn_mgr,
            planner: Planner::new(),
            ql: QueryManager::new(),
        })
    }

    /// Flushes everything and closes the database.
    pub fn close(self) -> Result<()> {
        self.log_mgr.flush()?;
        self.db.close()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Executes one analyzed statement for a session.
    pub fn execute(&self, stmt: &Statement, session: &mut Session) -> Result<QueryResult> {
        match stmt {
            Statement::Begin => {
                if session.txn.is_none() {
                    let txn = self.txn_mgr.begin()?;
                    txn.set_explicit(true);
                    session.txn = Some(txn);
                }
                Ok(QueryResult::ack("transaction started"))
            }
            Statement::Commit => {
                if let Some(txn) = session.txn.take() {
                    self.txn_mgr.commit(&txn)?;
                }
                Ok(QueryResult::ack("committed"))
            }
            Statement::Abort | Statement::Rollback => {
                if let Some(txn) = session.txn.take() {
                    self.txn_mgr.abort(&txn, &self.db)?;
                }
                Ok(QueryResult::ack("aborted"))
            }
            other => {
                let (txn, implicit) = match &session.txn {
                    Some(txn) => (txn.clone(), false),
                    None => (self.txn_mgr.begin()?, true),
                };
                let mut ctx =
                    Context::new(self.lock_mgr.clone(), self.log_mgr.clone(), txn.clone());
                ctx.output_ellipsis = session.output_ellipsis;

                match self.run_statement(other, &ctx) {
                    Ok(result) => {
                        if implicit {
                            self.txn_mgr.commit(&txn)?;
                        }
                        Ok(result)
                    }
                    Err(e) => {
                        // Statement-level failures already rolled back
                        // their partial effects; an implicit
                        // transaction is finished off, and a wounded
                        // transaction must not live on.
                        if implicit || matches!(e, DbError::DeadlockPrevention(_)) {
                            self.txn_mgr.abort(&txn, &self.db)?;
                            session.txn = None;
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    fn run_statement(&self, stmt: &Statement, ctx: &Context) -> Result<QueryResult> {
        match stmt {
            Statement::CreateTable { tab_name, col_defs } => {
                self.db.create_table(tab_name, col_defs, Some(ctx))?;
                Ok(QueryResult::ack(format!("table {} created", tab_name)))
            }
            Statement::DropTable { tab_name } => {
                self.db.drop_table(tab_name, Some(ctx))?;
                Ok(QueryResult::ack(format!("table {} dropped", tab_name)))
            }
            Statement::CreateIndex {
                tab_name,
                col_names,
            } => {
                self.db.create_index(tab_name, col_names, Some(ctx))?;
                Ok(QueryResult::ack("index created"))
            }
            Statement::DropIndex {
                tab_name,
                col_names,
            } => {
                self.db.drop_index(tab_name, col_names, Some(ctx))?;
                Ok(QueryResult::ack("index dropped"))
            }
            Statement::ShowIndex { tab_name } => self.ql.show_index(&self.db, tab_name, ctx),
            Statement::ShowTables => self.ql.show_tables(&self.db, ctx),
            Statement::DescTable { tab_name } => self.ql.desc_table(&self.db, tab_name),
            Statement::Help => Ok(self.ql.help()),
            Statement::Load {
                file_name,
                tab_name,
            } => self.ql.load(&self.db, file_name, tab_name, ctx),
            Statement::Insert { .. }
            | Statement::Delete { .. }
            | Statement::Update { .. }
            | Statement::Select(_) => {
                let plan = self.planner.plan(&self.db, stmt)?;
                self.ql.run_plan(&self.db, &plan, ctx)
            }
            Statement::Begin
            | Statement::Commit
            | Statement::Abort
            | Statement::Rollback => Err(DbError::Internal(
                "transaction control handled by the session layer".into(),
            )),
        }
    }
}
