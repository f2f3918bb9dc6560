use std::sync::Arc;

use crate::catalog::{index_name, Database, TabMeta};
use crate::common::{Result, Rid};
use crate::record::TableFile;
use crate::recovery::LogPayload;
use crate::txn::{WriteRecord, WriteType};

use super::context::Context;

/// DELETE FROM: removes each scanned rid from every index and the
/// heap, logging DELETE and per-index INDEX_DELETE records and
/// appending write-set entries for undo.
pub struct DeleteExecutor<'a> {
    db: &'a Database,
    tab: TabMeta,
    tab_name: String,
    rids: Vec<Rid>,
    file: Arc<TableFile>,
    ctx: &'a Context,
}

impl<'a> DeleteExecutor<'a> {
    pub fn new(
        db: &'a Database,
        tab_name: &str,
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
            rids,
            file,
            ctx,
        })
    }

    /// Runs the delete. Returns the number of rows removed.
    pub fn execute(&mut self) -> Result<usize> {
        for &rid in &self.rids {
            let record = self.file.get(rid, Some(self.ctx))?;
            self.ctx.log(LogPayload::Delete {
                tab_name: self.tab_name.clone(),
                rid,
                record: record.clone(),
            })?;

            for ix in &self.tab.indexes {
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

            self.file.delete(rid, Some(self.ctx))?;
            self.ctx.txn.append_write_record(WriteRecord::new(
                WriteType::Delete,
                &self.tab_name,
                rid,
                record,
            ));
        }
        Ok(self.rids.len())
    }
}
