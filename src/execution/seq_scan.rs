use std::sync::Arc;

use crate::catalog::{ColMeta, Database};
use crate::common::{DbError, Result, Rid};
use crate::planner::Condition;
use crate::record::{TableFile, TableScan};
use crate::tuple::Record;

use super::context::Context;
use super::executor::{eval_conds, Executor};

/// Full-table scan that skips tuples failing the WHERE predicates.
/// Takes a shared table lock at construction; each tuple read takes a
/// shared row lock through the context.
pub struct SeqScanExecutor<'a> {
    conds: Vec<Condition>,
    file: Arc<TableFile>,
    cols: Vec<ColMeta>,
    len: usize,
    scan: Option<TableScan>,
    rid: Rid,
    ctx: &'a Context,
}

impl<'a> SeqScanExecutor<'a> {
    pub fn new(
        db: &Database,
        tab_name: &str,
        conds: Vec<Condition>,
        ctx: &'a Context,
    ) -> Result<Self> {
        let tab = db.get_table(tab_name)?;
        let file = db.table_file(tab_name)?;
        ctx.lock_mgr.lock_shared_on_table(&ctx.txn, file.fd())?;
        let len = tab.record_size();
        Ok(Self {
            conds,
            file,
            cols: tab.cols,
            len,
            scan: None,
            rid: Rid::new(0, 0),
            ctx,
        })
    }

    /// Moves the scan forward to the next tuple passing the
    /// predicates, if any.
    fn settle(&mut self) -> Result<()> {
        let Some(scan) = self.scan.as_mut() else {
            return Ok(());
        };
        while let Some(rid) = scan.rid() {
            match self.file.get(rid, Some(self.ctx)) {
                Ok(record) => {
                    if self.conds.is_empty()
                        || eval_conds(&self.cols, &self.conds, &record)?
                    {
                        self.rid = rid;
                        return Ok(());
                    }
                }
                // A slot freed between the bitmap walk and the read
                Err(DbError::RecordNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            scan.next()?;
        }
        Ok(())
    }
}

impl Executor for SeqScanExecutor<'_> {
    fn begin(&mut self) -> Result<()> {
        self.scan = Some(TableScan::new(self.file.clone())?);
        self.settle()
    }

    fn advance(&mut self) -> Result<()> {
        if let Some(scan) = self.scan.as_mut() {
            scan.next()?;
        }
        self.settle()
    }

    fn is_end(&self) -> bool {
        self.scan.as_ref().map_or(true, |s| s.is_end())
    }

    fn record(&mut self) -> Result<Record> {
        self.file.get(self.rid, Some(self.ctx))
    }

    fn rid(&self) -> Rid {
        self.rid
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        self.len
    }
}
