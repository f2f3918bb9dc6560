use crate::catalog::ColMeta;
use crate::common::{DbError, Result, Rid};
use crate::planner::{CondRhs, Condition, TabCol};
use crate::tuple::{Record, Value};

/// The pull iterator contract every plan-tree node implements. A tree
/// is driven as: `begin()`, then `record()` / `advance()` until
/// `is_end()`. Iterators are single-threaded; `begin()` restarts one
/// from the top.
pub trait Executor {
    fn begin(&mut self) -> Result<()>;

    fn advance(&mut self) -> Result<()>;

    fn is_end(&self) -> bool;

    /// The tuple at the current position.
    fn record(&mut self) -> Result<Record>;

    /// Heap position of the current tuple; meaningful for scans only.
    fn rid(&self) -> Rid {
        Rid::new(0, 0)
    }

    /// Layout of the tuples this node produces.
    fn columns(&self) -> &[ColMeta];

    fn tuple_len(&self) -> usize;
}

/// Resolves a column reference against a tuple layout. An empty table
/// qualifier matches any table.
pub fn find_col<'a>(cols: &'a [ColMeta], target: &TabCol) -> Result<&'a ColMeta> {
    cols.iter()
        .find(|c| {
            (target.tab_name.is_empty() || c.tab_name == target.tab_name)
                && c.name == target.col_name
        })
        .ok_or_else(|| {
            DbError::ColumnNotFound(format!("{}.{}", target.tab_name, target.col_name))
        })
}

/// Position of a column reference within a tuple layout.
pub fn find_col_idx(cols: &[ColMeta], target: &TabCol) -> Result<usize> {
    cols.iter()
        .position(|c| {
            (target.tab_name.is_empty() || c.tab_name == target.tab_name)
                && c.name == target.col_name
        })
        .ok_or_else(|| {
            DbError::ColumnNotFound(format!("{}.{}", target.tab_name, target.col_name))
        })
}

/// Reads a column's typed value out of a record.
pub fn col_value(record: &Record, col: &ColMeta) -> Value {
    record.value_at(col.col_type, col.offset, col.len)
}

/// Evaluates one predicate against a record, resolving both sides to
/// typed values with implicit cross-type promotion.
pub fn eval_cond(cols: &[ColMeta], cond: &Condition, record: &Record) -> Result<bool> {
    let lhs_col = find_col(cols, &cond.lhs_col)?;
    let lhs = col_value(record, lhs_col);
    let rhs = match &cond.rhs {
        CondRhs::Value(v) => v.clone(),
        CondRhs::Col(rhs_col) => col_value(record, find_col(cols, rhs_col)?),
    };
    Ok(cond.op.eval(lhs.compare(&rhs)?))
}

/// A record satisfies a WHERE clause iff every predicate holds.
pub fn eval_conds(cols: &[ColMeta], conds: &[Condition], record: &Record) -> Result<bool> {
    for cond in conds {
        if !eval_cond(cols, cond, record)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::CompOp;
    use crate::tuple::ColType;

    fn layout() -> Vec<ColMeta> {
        vec![
            ColMeta {
                tab_name: "t".into(),
                name: "id".into(),
                col_type: ColType::Int,
                len: 4,
                offset: 0,
                index: false,
            },
            ColMeta {
                tab_name: "t".into(),
                name: "score".into(),
                col_type: ColType::Float,
                len: 8,
                offset: 4,
                index: false,
            },
        ]
    }

    fn record(id: i32, score: f64) -> Record {
        let mut rec = Record::new(12);
        rec.write_at(0, &id.to_le_bytes());
        rec.write_at(4, &score.to_le_bytes());
        rec
    }

    #[test]
    fn test_eval_literal_comparison() {
        let cols = layout();
        let rec = record(5, 1.5);
        let cond = Condition {
            lhs_col: TabCol::new("t", "id"),
            op: CompOp::Ge,
            rhs: CondRhs::Value(Value::Int(5)),
        };
        assert!(eval_cond(&cols, &cond, &rec).unwrap());
    }

    #[test]
    fn test_eval_cross_type_comparison() {
        let cols = layout();
        let rec = record(2, 2.0);
        // Int column against float literal
        let cond = Condition {
            lhs_col: TabCol::new("t", "id"),
            op: CompOp::Eq,
            rhs: CondRhs::Value(Value::Float(2.0)),
        };
        assert!(eval_cond(&cols, &cond, &rec).unwrap());
    }

    #[test]
    fn test_eval_column_to_column() {
        let cols = layout();
        let cond = Condition {
            lhs_col: TabCol::new("t", "id"),
            op: CompOp::Lt,
            rhs: CondRhs::Col(TabCol::new("t", "score")),
        };
        assert!(eval_cond(&cols, &cond, &record(1, 2.0)).unwrap());
        assert!(!eval_cond(&cols, &cond, &record(3, 2.0)).unwrap());
    }

    #[test]
    fn test_eval_conds_conjunction() {
        let cols = layout();
        let conds = vec![
            Condition {
                lhs_col: TabCol::new("t", "id"),
                op: CompOp::Gt,
                rhs: CondRhs::Value(Value::Int(0)),
            },
            Condition {
                lhs_col: TabCol::new("t", "id"),
                op: CompOp::Ne,
                rhs: CondRhs::Value(Value::Int(7)),
            },
        ];
        assert!(eval_conds(&cols, &conds, &record(3, 0.0)).unwrap());
        assert!(!eval_conds(&cols, &conds, &record(7, 0.0)).unwrap());
    }

    #[test]
    fn test_unqualified_column_resolves() {
        let cols = layout();
        assert_eq!(find_col_idx(&cols, &TabCol::new("", "score")).unwrap(), 1);
        assert!(find_col(&cols, &TabCol::new("t", "missing")).is_err());
    }
}
