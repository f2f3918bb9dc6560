use std::sync::Arc;

use log::debug;

use crate::catalog::{index_name, ColMeta, Database, TabMeta};
use crate::common::{DbError, Result, Rid};
use crate::planner::{SetClause, SetOp};
use crate::record::TableFile;
use crate::recovery::LogPayload;
use crate::tuple::{Record, Value};
use crate::txn::{WriteRecord, WriteType};

use super::context::Context;
use super::executor::col_value;

/// UPDATE ... SET: for each scanned rid, removes the old index
/// entries, applies the SET clauses (ADD and SUB compute
/// `new = old op literal` on numeric columns), re-inserts index
/// entries, logs the before/after images, and overwrites the row.
/// A uniqueness violation restores the old entries and rolls the
/// statement's earlier row updates back before surfacing.
pub struct UpdateExecutor<'a> {
    db: &'a Database,
    tab: TabMeta,
    tab_name: String,
    set_clauses: Vec<SetClause>,
    rids: Vec<Rid>,
    file: Arc<TableFile>,
    ctx: &'a Context,
}

impl<'a> UpdateExecutor<'a> {
    pub fn new(
        db: &'a Database,
        tab_name: &str,
        set_clauses: Vec<SetClause>,
        rids: Vec<Rid>,
        ctx: &'a Context,
    ) -> Result<Self> {
        let tab = db.get_table(tab_name)?;
        let file = db.table_file(tab_name)?;
        ctx.lock_mgr.lock_ix_on_table(&ctx.txn, file.fd())?;
        Ok(Self {
            db,
            tab,
            tab_name: tab_name.to_string(),
            set_clauses,
            rids,
            file,
            ctx,
        })
    }

    /// Applies the SET clauses to a copy of `before`.
    fn apply_set_clauses(&self, clauses: &[(ColMeta, SetOp, Value)], before: &Record) -> Result<Record> {
        let mut after = before.clone();
        for (col, op, value) in clauses {
            let new_val = match op {
                SetOp::Assign => value.cast_to(col.col_type)?,
                SetOp::Add | SetOp::Sub => {
                    if !col.col_type.is_numeric() {
                        return Err(DbError::IncompatibleType {
                            lhs: col.col_type.to_string(),
                            rhs: value.col_type().to_string(),
                        });
                    }
                    let old = col_value(&after, col);
                    let rhs = value.cast_to(col.col_type)?;
                    arith(&old, &rhs, matches!(op, SetOp::Add))?
                }
            };
            after.write_at(col.offset, &new_val.to_bytes(col.len)?);
        }
        Ok(after)
    }

    /// Drops every index entry of `record` at `rid`, logging each.
    fn delete_index_entries(&self, record: &Record, rid: Rid) -> Result<()> {
        for ix in &self.tab.indexes {
            let ix_name = index_name(&self.tab_name, &ix.col_names());
            let handle = self.db.index_handle(&ix_name)?;
            let key = ix.build_key(record);
            self.ctx.log(LogPayload::IndexDelete {
                ix_name,
                key: key.clone(),
                rid,
            })?;
            handle.delete_entry(&key)?;
        }
        Ok(())
    }

    /// Inserts every index entry of `record`, logging each success.
    /// On a duplicate, the partial inserts are removed again and the
    /// failing index's name is returned.
    fn insert_index_entries(&self, record: &Record, rid: Rid) -> Result<Option<String>> {
        let mut failed: Option<(usize, String)> = None;
        for (i, ix) in self.tab.indexes.iter().enumerate() {
            let ix_name = index_name(&self.tab_name, &ix.col_names());
            let handle = self.db.index_handle(&ix_name)?;
            let key = ix.build_key(record);
            if handle.insert_entry(&key, rid)? {
                self.ctx.log(LogPayload::IndexInsert {
                    ix_name,
                    key,
                    rid,
                })?;
            } else {
                failed = Some((i, ix_name));
                break;
            }
        }
        let Some((fail_pos, fail_name)) = failed else {
            return Ok(None);
        };
        for ix in &self.tab.indexes[..fail_pos] {
            let ix_name = index_name(&self.tab_name, &ix.col_names());
            let handle = self.db.index_handle(&ix_name)?;
            let key = ix.build_key(record);
            self.ctx.log(LogPayload::IndexDelete {
                ix_name,
                key: key.clone(),
                rid,
            })?;
            handle.delete_entry(&key)?;
        }
        Ok(Some(fail_name))
    }

    /// Runs the update. Returns the number of rows changed.
    pub fn execute(&mut self) -> Result<usize> {
        let clauses = self
            .set_clauses
            .iter()
            .map(|sc| {
                let col = self.tab.get_col(&sc.col.col_name)?.clone();
                Ok((col, sc.op, sc.value.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        // (rid, before, after) of rows already rewritten, for
        // statement-local rollback
        let mut done: Vec<(Rid, Record, Record)> = Vec::new();
        let mut violation: Option<String> = None;

        for &rid in &self.rids {
            let before = self.file.get(rid, Some(self.ctx))?;
            let after = self.apply_set_clauses(&clauses, &before)?;

            self.delete_index_entries(&before, rid)?;
            if let Some(fail_name) = self.insert_index_entries(&after, rid)? {
                // Put this row's old entries back
                for ix in &self.tab.indexes {
                    let ix_name = index_name(&self.tab_name, &ix.col_names());
                    let handle = self.db.index_handle(&ix_name)?;
                    let key = ix.build_key(&before);
                    handle.insert_entry(&key, rid)?;
                    self.ctx.log(LogPayload::IndexInsert {
                        ix_name,
                        key,
                        rid,
                    })?;
                }
                violation = Some(fail_name);
                break;
            }

            self.ctx.log(LogPayload::Update {
                tab_name: self.tab_name.clone(),
                rid,
                before: before.clone(),
                after: after.clone(),
            })?;
            self.file.update(rid, after.data(), Some(self.ctx))?;
            self.ctx.txn.append_write_record(WriteRecord::new(
                WriteType::Update,
                &self.tab_name,
                rid,
                before.clone(),
            ));
            done.push((rid, before, after));
        }

        let Some(fail_name) = violation else {
            return Ok(done.len());
        };

        debug!(
            "update on {} hit duplicate key on {}, rolling back {} rows",
            self.tab_name,
            fail_name,
            done.len()
        );
        for (rid, before, after) in done.into_iter().rev() {
            self.delete_index_entries(&after, rid)?;
            if self.insert_index_entries(&before, rid)?.is_some() {
                return Err(DbError::Internal(
                    "failed to restore index entries during update rollback".into(),
                ));
            }
            self.ctx.log(LogPayload::Update {
                tab_name: self.tab_name.clone(),
                rid,
                before: after,
                after: before.clone(),
            })?;
            self.file.update(rid, before.data(), Some(self.ctx))?;
            self.ctx.txn.pop_write_record();
        }
        Err(DbError::UniqueViolation(fail_name))
    }
}

/// `old + rhs` when `add`, `old - rhs` otherwise, over matching
/// numeric types.
fn arith(old: &Value, rhs: &Value, add: bool) -> Result<Value> {
    let res = match (old, rhs) {
        (Value::Int(a), Value::Int(b)) => Value::Int(if add {
            a.wrapping_add(*b)
        } else {
            a.wrapping_sub(*b)
        }),
        (Value::Bigint(a), Value::Bigint(b)) => Value::Bigint(if add {
            a.wrapping_add(*b)
        } else {
            a.wrapping_sub(*b)
        }),
        (Value::Float(a), Value::Float(b)) => {
            Value::Float(if add { a + b } else { a - b })
        }
        _ => {
            return Err(DbError::IncompatibleType {
                lhs: old.col_type().to_string(),
                rhs: rhs.col_type().to_string(),
            })
        }
    };
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arith_operand_order() {
        // new = old - literal, not literal - old
        assert_eq!(
            arith(&Value::Int(10), &Value::Int(3), false).unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            arith(&Value::Int(10), &Value::Int(3), true).unwrap(),
            Value::Int(13)
        );
        assert_eq!(
            arith(&Value::Float(1.5), &Value::Float(0.5), false).unwrap(),
            Value::Float(1.0)
        );
        assert_eq!(
            arith(&Value::Bigint(1 << 40), &Value::Bigint(1), true).unwrap(),
            Value::Bigint((1 << 40) + 1)
        );
    }

    #[test]
    fn test_arith_type_mismatch() {
        assert!(arith(&Value::Int(1), &Value::Str("x".into()), true).is_err());
    }
}
