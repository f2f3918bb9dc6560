use crate::catalog::ColMeta;
use crate::common::Result;
use crate::planner::{Limit, TabCol};
use crate::tuple::Record;

use super::executor::{find_col_idx, Executor};

/// Projects the child's tuples onto the selected columns, re-packed
/// into a fresh byte layout, and applies `LIMIT start, len`: `start`
/// tuples are consumed at begin and at most `len` are emitted.
pub struct ProjectionExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    cols: Vec<ColMeta>,
    sel_idxs: Vec<usize>,
    len: usize,
    limit: Option<Limit>,
    emitted: usize,
}

impl<'a> ProjectionExecutor<'a> {
    pub fn new(
        child: Box<dyn Executor + 'a>,
        sel_cols: &[TabCol],
        limit: Option<Limit>,
    ) -> Result<Self> {
        let child_cols = child.columns();
        let mut cols = Vec::with_capacity(sel_cols.len());
        let mut sel_idxs = Vec::with_capacity(sel_cols.len());
        let mut offset = 0;
        for sel in sel_cols {
            let idx = find_col_idx(child_cols, sel)?;
            sel_idxs.push(idx);
            let mut col = child_cols[idx].clone();
            col.offset = offset;
            offset += col.len;
            cols.push(col);
        }
        Ok(Self {
            child,
            cols,
            sel_idxs,
            len: offset,
            limit,
            emitted: 0,
        })
    }
}

impl Executor for ProjectionExecutor<'_> {
    fn begin(&mut self) -> Result<()> {
        self.emitted = 0;
        self.child.begin()?;
        if let Some(limit) = self.limit {
            for _ in 0..limit.start {
                if self.child.is_end() {
                    break;
                }
                self.child.advance()?;
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        self.emitted += 1;
        self.child.advance()
    }

    fn is_end(&self) -> bool {
        if let Some(limit) = self.limit {
            if self.emitted >= limit.len {
                return true;
            }
        }
        self.child.is_end()
    }

    fn record(&mut self) -> Result<Record> {
        let child_cols = self.child.columns().to_vec();
        let src = self.child.record()?;
        let mut out = Record::new(self.len);
        for (sel_idx, col) in self.sel_idxs.iter().zip(self.cols.iter()) {
            let src_col = &child_cols[*sel_idx];
            out.write_at(col.offset, src.bytes_at(src_col.offset, src_col.len));
        }
        Ok(out)
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        self.len
    }
}
