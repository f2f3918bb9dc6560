use std::sync::Arc;

use log::debug;

use crate::catalog::{index_name, Database, TabMeta};
use crate::common::{DbError, Result, Rid};
use crate::record::TableFile;
use crate::recovery::LogPayload;
use crate::tuple::{Record, Value};
use crate::txn::{WriteRecord, WriteType};

use super::context::Context;

/// INSERT INTO ... VALUES: coerces the literals into the table's
/// column types, writes the row, logs it, and maintains every index.
/// A uniqueness violation undoes the partial index inserts and the
/// row itself before surfacing.
pub struct InsertExecutor<'a> {
    db: &'a Database,
    tab: TabMeta,
    tab_name: String,
    values: Vec<Value>,
    file: Arc<TableFile>,
    rid: Rid,
    ctx: &'a Context,
}

impl<'a> InsertExecutor<'a> {
    pub fn new(
        db: &'a Database,
        tab_name: &str,
        values: Vec<Value>,
        ctx: &'a Context,
    ) -> Result<Self> {
        let tab = db.get_table(tab_name)?;
        if values.len() != tab.cols.len() {
            return Err(DbError::InvalidValueCount {
                expected: tab.cols.len(),
                got: values.len(),
            });
        }
        let file = db.table_file(tab_name)?;
        ctx.lock_mgr.lock_exclusive_on_table(&ctx.txn, file.fd())?;
        Ok(Self {
            db,
            tab,
            tab_name: tab_name.to_string(),
            values,
            file,
            rid: Rid::new(0, 0),
            ctx,
        })
    }

    pub fn rid(&self) -> Rid {
        self.rid
    }

    /// Runs the insert. Returns the number of rows written.
    pub fn execute(&mut self) -> Result<usize> {
        let mut record = Record::new(self.tab.record_size());
        for (value, col) in self.values.iter().zip(&self.tab.cols) {
            let cast = value.cast_to(col.col_type)?;
            record.write_at(col.offset, &cast.to_bytes(col.len)?);
        }

        let rid = self.file.insert(record.data(), Some(self.ctx))?;
        self.rid = rid;
        self.ctx.log(LogPayload::Insert {
            tab_name: self.tab_name.clone(),
            rid,
            record: record.clone(),
        })?;

        let mut failed: Option<(usize, String)> = None;
        for (i, ix) in self.tab.indexes.iter().enumerate() {
            let ix_name = index_name(&self.tab_name, &ix.col_names());
            let handle = self.db.index_handle(&ix_name)?;
            let key = ix.build_key(&record);
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

        if let Some((fail_pos, fail_name)) = failed {
            debug!(
                "insert into {} hit duplicate key on {}, rolling back",
                self.tab_name, fail_name
            );
            for ix in &self.tab.indexes[..fail_pos] {
                let ix_name = index_name(&self.tab_name, &ix.col_names());
                let handle = self.db.index_handle(&ix_name)?;
                let key = ix.build_key(&record);
                self.ctx.log(LogPayload::IndexDelete {
                    ix_name,
                    key: key.clone(),
                    rid,
                })?;
                handle.delete_entry(&key)?;
            }
            self.ctx.log(LogPayload::Delete {
                tab_name: self.tab_name.clone(),
                rid,
                record: record.clone(),
            })?;
            self.file.delete(rid, Some(self.ctx))?;
            return Err(DbError::UniqueViolation(fail_name));
        }

        self.ctx.txn.append_write_record(WriteRecord::new(
            WriteType::Insert,
            &self.tab_name,
            rid,
            record,
        ));
        Ok(1)
    }
}
