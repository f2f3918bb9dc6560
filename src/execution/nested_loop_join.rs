use crate::catalog::ColMeta;
use crate::common::{DbError, Result, JOIN_BUFFER_SIZE};
use crate::planner::Condition;
use crate::tuple::Record;

use super::executor::{eval_conds, Executor};

/// Block nested-loop join. Buffers up to [`JOIN_BUFFER_SIZE`] tuples
/// from the left (outer) input; for each right tuple, tries the
/// buffered left tuples in order. When the right side is exhausted it
/// is restarted for the next left block.
pub struct NestedLoopJoinExecutor<'a> {
    left: Box<dyn Executor + 'a>,
    right: Box<dyn Executor + 'a>,
    cols: Vec<ColMeta>,
    len: usize,
    left_len: usize,
    conds: Vec<Condition>,
    left_buf: Vec<Record>,
    head: usize,
    current: Option<Record>,
    end: bool,
}

impl<'a> NestedLoopJoinExecutor<'a> {
    pub fn new(
        left: Box<dyn Executor + 'a>,
        right: Box<dyn Executor + 'a>,
        conds: Vec<Condition>,
    ) -> Self {
        let left_len = left.tuple_len();
        let len = left_len + right.tuple_len();
        let mut cols = left.columns().to_vec();
        for col in right.columns() {
            let mut col = col.clone();
            col.offset += left_len;
            cols.push(col);
        }
        Self {
            left,
            right,
            cols,
            len,
            left_len,
            conds,
            left_buf: Vec::new(),
            head: 0,
            current: None,
            end: false,
        }
    }

    fn fill_left_block(&mut self) -> Result<()> {
        while !self.left.is_end() && self.left_buf.len() < JOIN_BUFFER_SIZE {
            self.left_buf.push(self.left.record()?);
            self.left.advance()?;
        }
        Ok(())
    }

    /// Advances to the next pair satisfying the join predicates.
    fn find(&mut self) -> Result<()> {
        self.fill_left_block()?;
        while !self.right.is_end() {
            let rec_r = self.right.record()?;
            while self.head < self.left_buf.len() {
                let mut rec = Record::new(self.len);
                rec.write_at(0, self.left_buf[self.head].data());
                rec.write_at(self.left_len, rec_r.data());
                if self.conds.is_empty() || eval_conds(&self.cols, &self.conds, &rec)? {
                    self.current = Some(rec);
                    return Ok(());
                }
                self.head += 1;
            }

            self.right.advance()?;
            self.head = 0;
            if self.right.is_end() {
                // Block exhausted against the whole inner side: load
                // the next left block and restart the inner input
                self.left_buf.clear();
                if self.left.is_end() {
                    self.end = true;
                    return Ok(());
                }
                self.fill_left_block()?;
                self.right.begin()?;
            }
        }
        self.end = true;
        Ok(())
    }
}

impl Executor for NestedLoopJoinExecutor<'_> {
    fn begin(&mut self) -> Result<()> {
        self.left_buf.clear();
        self.head = 0;
        self.current = None;
        self.end = false;
        self.left.begin()?;
        self.right.begin()?;
        if self.left.is_end() || self.right.is_end() {
            self.end = true;
            return Ok(());
        }
        self.find()
    }

    fn advance(&mut self) -> Result<()> {
        if self.end {
            return Ok(());
        }
        self.head += 1;
        self.find()
    }

    fn is_end(&self) -> bool {
        self.end
    }

    fn record(&mut self) -> Result<Record> {
        self.current
            .clone()
            .ok_or_else(|| DbError::Internal("join read past its end".into()))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        self.len
    }
}
