use std::sync::Arc;

use crate::catalog::{index_name, ColMeta, Database, IndexMeta};
use crate::common::{DbError, Result, Rid};
use crate::index::{max_col_bytes, min_col_bytes, BTreeIndex, IxScan};
use crate::planner::{CompOp, CondRhs, Condition};
use crate::record::TableFile;
use crate::tuple::Record;

use super::context::Context;
use super::executor::{eval_conds, Executor};

/// Index-backed range scan. The predicates matching the index's
/// leftmost prefix position the scan: equalities fill their key
/// columns exactly; the first range comparator fills its column with
/// the literal (for >, >=) or the column minimum (for <, <=), and the
/// remaining key columns are padded with the type minimum or maximum.
/// The matched prefix is re-evaluated on every tuple so the scan stops
/// at the end of the range; the rest of the predicates filter tuples.
pub struct IndexScanExecutor<'a> {
    tab_name: String,
    conds: Vec<Condition>,
    index_meta: IndexMeta,
    file: Arc<TableFile>,
    index: Arc<BTreeIndex>,
    cols: Vec<ColMeta>,
    len: usize,
    scan: Option<IxScan>,
    rid: Rid,
    /// Number of leading predicates matched onto index columns
    index_cnt: usize,
    done: bool,
    ctx: &'a Context,
}

impl<'a> IndexScanExecutor<'a> {
    pub fn new(
        db: &Database,
        tab_name: &str,
        mut conds: Vec<Condition>,
        index_col_names: Vec<String>,
        ctx: &'a Context,
    ) -> Result<Self> {
        let tab = db.get_table(tab_name)?;
        let index_meta = tab
            .get_index_meta(&index_col_names)
            .ok_or_else(|| DbError::IndexNotFound(index_name(tab_name, &index_col_names)))?
            .clone();
        let index = db.index_handle(&index_name(tab_name, &index_col_names))?;
        let file = db.table_file(tab_name)?;
        ctx.lock_mgr.lock_shared_on_table(&ctx.txn, file.fd())?;

        // Canonicalize predicates so this table is on the left
        for cond in conds.iter_mut() {
            if cond.lhs_col.tab_name != tab_name {
                cond.swap_sides();
            }
        }

        let len = tab.record_size();
        Ok(Self {
            tab_name: tab_name.to_string(),
            conds,
            index_meta,
            file,
            index,
            cols: tab.cols,
            len,
            scan: None,
            rid: Rid::new(0, 0),
            index_cnt: 0,
            done: true,
            ctx,
        })
    }

    /// Builds the positioning key. Returns the key bytes, how many
    /// predicates were consumed, and whether to start past the key
    /// (upper bound, for a strict `>`).
    fn build_key(&self) -> Result<(Vec<u8>, usize, bool)> {
        let mut key = Vec::with_capacity(self.index_meta.col_tot_len);
        let mut consumed = 0;
        let mut open_upper = false;
        let mut stopped = false;

        for (cond, col) in self.conds.iter().zip(self.index_meta.cols.iter()) {
            let CondRhs::Value(value) = &cond.rhs else {
                break;
            };
            if cond.lhs_col.tab_name != self.tab_name
                || cond.lhs_col.col_name != col.name
                || cond.op == CompOp::Ne
            {
                break;
            }
            match cond.op {
                CompOp::Eq => {
                    key.extend(value.cast_to(col.col_type)?.to_bytes(col.len)?);
                    consumed += 1;
                }
                CompOp::Gt | CompOp::Ge => {
                    key.extend(value.cast_to(col.col_type)?.to_bytes(col.len)?);
                    open_upper = cond.op == CompOp::Gt;
                    consumed += 1;
                    stopped = true;
                }
                CompOp::Lt | CompOp::Le => {
                    key.extend(min_col_bytes(col.col_type, col.len));
                    consumed += 1;
                    stopped = true;
                }
                CompOp::Ne => unreachable!(),
            }
            if stopped {
                break;
            }
        }

        for col in self.index_meta.cols.iter().skip(consumed) {
            if open_upper {
                key.extend(max_col_bytes(col.col_type, col.len));
            } else {
                key.extend(min_col_bytes(col.col_type, col.len));
            }
        }
        Ok((key, consumed, open_upper))
    }

    fn settle(&mut self) -> Result<()> {
        let Some(scan) = self.scan.as_mut() else {
            self.done = true;
            return Ok(());
        };
        while !scan.is_end() {
            let rid = scan.rid()?;
            match self.file.get(rid, Some(self.ctx)) {
                Ok(record) => {
                    // Leaving the matched prefix's range ends the scan
                    if !eval_conds(&self.cols, &self.conds[..self.index_cnt], &record)? {
                        self.done = true;
                        return Ok(());
                    }
                    if eval_conds(&self.cols, &self.conds, &record)? {
                        self.rid = rid;
                        return Ok(());
                    }
                }
                Err(DbError::RecordNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            scan.next()?;
        }
        self.done = true;
        Ok(())
    }
}

impl Executor for IndexScanExecutor<'_> {
    fn begin(&mut self) -> Result<()> {
        let (key, consumed, open_upper) = self.build_key()?;
        self.index_cnt = consumed;
        let start = if open_upper {
            self.index.upper_bound(&key)?
        } else {
            self.index.lower_bound(&key)?
        };
        let end = self.index.leaf_end()?;
        self.scan = Some(IxScan::new(self.index.clone(), start, end));
        self.done = false;
        self.settle()
    }

    fn advance(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        if let Some(scan) = self.scan.as_mut() {
            scan.next()?;
        }
        self.settle()
    }

    fn is_end(&self) -> bool {
        self.done || self.scan.as_ref().map_or(true, |s| s.is_end())
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
