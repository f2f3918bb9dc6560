use std::cmp::Ordering;

use crate::catalog::ColMeta;
use crate::common::{DbError, Result};
use crate::planner::TabCol;
use crate::tuple::Record;

use super::executor::{col_value, find_col, Executor};

/// ORDER BY: materializes the child's tuples and emits them after a
/// stable in-memory sort over the (column, direction) list.
pub struct SortExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    order_cols: Vec<(ColMeta, bool)>,
    tuples: Vec<Record>,
    pos: usize,
}

impl<'a> SortExecutor<'a> {
    pub fn new(
        child: Box<dyn Executor + 'a>,
        order_cols: &[(TabCol, bool)],
    ) -> Result<Self> {
        let resolved = order_cols
            .iter()
            .map(|(col, desc)| Ok((find_col(child.columns(), col)?.clone(), *desc)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            child,
            order_cols: resolved,
            tuples: Vec::new(),
            pos: 0,
        })
    }

}

impl Executor for SortExecutor<'_> {
    fn begin(&mut self) -> Result<()> {
        self.tuples.clear();
        self.pos = 0;
        self.child.begin()?;
        while !self.child.is_end() {
            self.tuples.push(self.child.record()?);
            self.child.advance()?;
        }
        let order_cols = &self.order_cols;
        self.tuples.sort_by(|a, b| {
            for (col, desc) in order_cols {
                // Both sides share the column's type, so this cannot fail
                let ord = col_value(a, col)
                    .compare(&col_value(b, col))
                    .unwrap_or(Ordering::Equal);
                if ord != Ordering::Equal {
                    return if *desc { ord.reverse() } else { ord };
                }
            }
            Ordering::Equal
        });
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.pos >= self.tuples.len()
    }

    fn record(&mut self) -> Result<Record> {
        self.tuples
            .get(self.pos)
            .cloned()
            .ok_or_else(|| DbError::Internal("sort read past its end".into()))
    }

    fn columns(&self) -> &[ColMeta] {
        self.child.columns()
    }

    fn tuple_len(&self) -> usize {
        self.child.tuple_len()
    }
}
