use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{DbError, Result, DB_META_NAME, LOG_FILE_NAME};
use crate::execution::Context;
use crate::index::BTreeIndex;
use crate::record::{TableFile, TableScan};
use crate::tuple::{string_to_datetime, ColType, Value};

use super::meta::{ColMeta, DbMeta, IndexMeta, TabMeta};

/// A column definition as produced by the analyzer for CREATE TABLE.
#[derive(Debug, Clone)]
pub struct ColDef {
    pub name: String,
    pub col_type: ColType,
    pub len: usize,
}

/// The system manager of one database: a directory holding the
/// catalog file, one heap file per table, one file per index, and the
/// write-ahead log. Keeps every table and index file open and
/// registered by name.
pub struct Database {
    home: PathBuf,
    bpm: Arc<BufferPoolManager>,
    meta: RwLock<DbMeta>,
    tables: RwLock<HashMap<String, Arc<TableFile>>>,
    indexes: RwLock<HashMap<String, Arc<BTreeIndex>>>,
}

impl Database {
    /// Creates the database directory with an empty catalog and log.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(DbError::DatabaseExists(path.display().to_string()));
        }
        fs::create_dir_all(path)?;
        let meta = DbMeta::new(&dir_name(path));
        fs::write(path.join(DB_META_NAME), meta.serialize())?;
        fs::File::create(path.join(LOG_FILE_NAME))?;
        info!("created database {}", path.display());
        Ok(())
    }

    /// Removes the database directory and everything in it.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(DbError::DatabaseNotFound(path.display().to_string()));
        }
        fs::remove_dir_all(path)?;
        Ok(())
    }

    /// Opens an existing database: loads the catalog, opens the log,
    /// then opens every table file and every index file the catalog
    /// lists.
    pub fn open<P: AsRef<Path>>(path: P, bpm: Arc<BufferPoolManager>) -> Result<Database> {
        let home = path.as_ref().to_path_buf();
        if !home.is_dir() {
            return Err(DbError::DatabaseNotFound(home.display().to_string()));
        }
        let meta = DbMeta::deserialize(&fs::read(home.join(DB_META_NAME))?)?;
        bpm.disk_manager().open_log(home.join(LOG_FILE_NAME))?;

        let mut tables = HashMap::new();
        let mut indexes = HashMap::new();
        for (tab_name, tab) in &meta.tabs {
            let tf = TableFile::open(bpm.clone(), home.join(tab_name))?;
            tables.insert(tab_name.clone(), Arc::new(tf));
            for ix in &tab.indexes {
                let ix_name = index_name(tab_name, &ix.col_names());
                let handle = BTreeIndex::open(bpm.clone(), home.join(&ix_name))?;
                indexes.insert(ix_name, Arc::new(handle));
            }
        }

        Ok(Database {
            home,
            bpm,
            meta: RwLock::new(meta),
            tables: RwLock::new(tables),
            indexes: RwLock::new(indexes),
        })
    }

    /// Flushes the catalog and closes every open file.
    pub fn close(&self) -> Result<()> {
        self.flush_meta()?;
        for tf in self.tables.write().drain().map(|(_, v)| v) {
            tf.close()?;
        }
        for ix in self.indexes.write().drain().map(|(_, v)| v) {
            ix.close()?;
        }
        self.bpm.disk_manager().close_log()?;
        Ok(())
    }

    /// Rewrites the catalog file in full.
    pub fn flush_meta(&self) -> Result<()> {
        fs::write(self.home.join(DB_META_NAME), self.meta.read().serialize())?;
        Ok(())
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    pub fn get_table(&self, name: &str) -> Result<TabMeta> {
        self.meta.read().get_table(name).cloned()
    }

    pub fn is_table(&self, name: &str) -> bool {
        self.meta.read().is_table(name)
    }

    pub fn table_file(&self, name: &str) -> Result<Arc<TableFile>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn index_handle(&self, ix_name: &str) -> Result<Arc<BTreeIndex>> {
        self.indexes
            .read()
            .get(ix_name)
            .cloned()
            .ok_or_else(|| DbError::IndexNotFound(ix_name.to_string()))
    }

    pub fn create_table(
        &self,
        name: &str,
        col_defs: &[ColDef],
        _ctx: Option<&Context>,
    ) -> Result<()> {
        if self.meta.read().is_table(name) {
            return Err(DbError::TableExists(name.to_string()));
        }

        let mut offset = 0;
        let mut cols = Vec::with_capacity(col_defs.len());
        for def in col_defs {
            cols.push(ColMeta {
                tab_name: name.to_string(),
                name: def.name.clone(),
                col_type: def.col_type,
                len: def.len,
                offset,
                index: false,
            });
            offset += def.len;
        }

        TableFile::create(self.bpm.disk_manager(), self.home.join(name), offset)?;
        let tf = TableFile::open(self.bpm.clone(), self.home.join(name))?;

        self.meta.write().tabs.insert(
            name.to_string(),
            TabMeta {
                name: name.to_string(),
                cols,
                indexes: Vec::new(),
            },
        );
        self.tables
            .write()
            .insert(name.to_string(), Arc::new(tf));
        self.flush_meta()?;
        info!("created table {}", name);
        Ok(())
    }

    pub fn drop_table(&self, name: &str, ctx: Option<&Context>) -> Result<()> {
        let tab = self.get_table(name)?;
        if let Some(ctx) = ctx {
            let tf = self.table_file(name)?;
            ctx.lock_mgr.lock_exclusive_on_table(&ctx.txn, tf.fd())?;
        }
        for ix in &tab.indexes {
            self.drop_index(name, &ix.col_names(), None)?;
        }

        if let Some(tf) = self.tables.write().remove(name) {
            tf.close()?;
        }
        self.bpm
            .disk_manager()
            .destroy_file(self.home.join(name))?;
        self.meta.write().tabs.remove(name);
        self.flush_meta()?;
        info!("dropped table {}", name);
        Ok(())
    }

    /// Creates an index over the given columns and fills it from the
    /// table's existing rows. Duplicate key bytes among those rows
    /// abort the creation.
    pub fn create_index(
        &self,
        tab_name: &str,
        col_names: &[String],
        ctx: Option<&Context>,
    ) -> Result<()> {
        let tab = self.get_table(tab_name)?;
        if tab.get_index_meta(col_names).is_some() {
            return Err(DbError::IndexExists(index_name(tab_name, col_names)));
        }
        if let Some(ctx) = ctx {
            let tf = self.table_file(tab_name)?;
            ctx.lock_mgr.lock_exclusive_on_table(&ctx.txn, tf.fd())?;
        }

        let mut cols = Vec::with_capacity(col_names.len());
        let mut col_tot_len = 0;
        for name in col_names {
            let col = tab.get_col(name)?.clone();
            col_tot_len += col.len;
            cols.push(col);
        }

        let ix_name = index_name(tab_name, col_names);
        let ix_path = self.home.join(&ix_name);
        BTreeIndex::create(
            self.bpm.disk_manager(),
            &ix_path,
            cols.iter().map(|c| c.col_type).collect(),
            cols.iter().map(|c| c.len).collect(),
            None,
        )?;
        let handle = Arc::new(BTreeIndex::open(self.bpm.clone(), &ix_path)?);

        let ix_meta = IndexMeta {
            tab_name: tab_name.to_string(),
            col_tot_len,
            cols,
        };

        // Fill the index from the table's current rows
        let tf = self.table_file(tab_name)?;
        let mut scan = TableScan::new(tf.clone())?;
        while let Some(rid) = scan.rid() {
            let record = tf.get(rid, None)?;
            let key = ix_meta.build_key(&record);
            if !handle.insert_entry(&key, rid)? {
                handle.close()?;
                self.bpm.disk_manager().destroy_file(&ix_path)?;
                return Err(DbError::UniqueViolation(ix_name));
            }
            scan.next()?;
        }

        {
            let mut meta = self.meta.write();
            let tab = meta.get_table_mut(tab_name)?;
            for col in tab.cols.iter_mut() {
                if col_names.contains(&col.name) {
                    col.index = true;
                }
            }
            tab.indexes.push(ix_meta);
        }
        self.indexes.write().insert(ix_name.clone(), handle);
        self.flush_meta()?;
        info!("created index {}", ix_name);
        Ok(())
    }

    pub fn drop_index(
        &self,
        tab_name: &str,
        col_names: &[String],
        ctx: Option<&Context>,
    ) -> Result<()> {
        let tab = self.get_table(tab_name)?;
        let ix_name = index_name(tab_name, col_names);
        if tab.get_index_meta(col_names).is_none() {
            return Err(DbError::IndexNotFound(ix_name));
        }
        if let Some(ctx) = ctx {
            let tf = self.table_file(tab_name)?;
            ctx.lock_mgr.lock_exclusive_on_table(&ctx.txn, tf.fd())?;
        }

        if let Some(handle) = self.indexes.write().remove(&ix_name) {
            handle.close()?;
        }
        self.bpm
            .disk_manager()
            .destroy_file(self.home.join(&ix_name))?;

        {
            let mut meta = self.meta.write();
            let tab = meta.get_table_mut(tab_name)?;
            tab.indexes
                .retain(|ix| ix.col_names() != col_names.to_vec());
            let still_indexed: Vec<String> = tab
                .indexes
                .iter()
                .flat_map(|ix| ix.col_names())
                .collect();
            for col in tab.cols.iter_mut() {
                col.index = still_indexed.contains(&col.name);
            }
        }
        self.flush_meta()?;
        info!("dropped index {}", ix_name);
        Ok(())
    }

    /// Drops and recreates every index of a table as an empty tree,
    /// keeping its metadata. Recovery rebuilds contents by replaying
    /// the log.
    pub fn reset_indexes(&self, tab_name: &str) -> Result<()> {
        let tab = self.get_table(tab_name)?;
        for ix in &tab.indexes {
            let ix_name = index_name(tab_name, &ix.col_names());
            let ix_path = self.home.join(&ix_name);
            if let Some(handle) = self.indexes.write().remove(&ix_name) {
                handle.close()?;
            }
            self.bpm.disk_manager().destroy_file(&ix_path)?;
            BTreeIndex::create(
                self.bpm.disk_manager(),
                &ix_path,
                ix.cols.iter().map(|c| c.col_type).collect(),
                ix.cols.iter().map(|c| c.len).collect(),
                None,
            )?;
            let handle = BTreeIndex::open(self.bpm.clone(), &ix_path)?;
            self.indexes.write().insert(ix_name, Arc::new(handle));
        }
        Ok(())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.meta.read().tabs.keys().cloned().collect()
    }

    /// Parses a CSV file into typed rows following the table's column
    /// layout. The first line is a header and is skipped.
    pub fn load_csv<P: AsRef<Path>>(&self, file: P, tab_name: &str) -> Result<Vec<Vec<Value>>> {
        let tab = self.get_table(tab_name)?;
        let text = fs::read_to_string(file)?;
        let mut rows = Vec::new();
        for line in text.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != tab.cols.len() {
                return Err(DbError::InvalidValueCount {
                    expected: tab.cols.len(),
                    got: fields.len(),
                });
            }
            let mut row = Vec::with_capacity(fields.len());
            for (field, col) in fields.iter().zip(&tab.cols) {
                row.push(parse_field(field.trim(), col.col_type)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

fn parse_field(field: &str, col_type: ColType) -> Result<Value> {
    let bad = || DbError::IncompatibleType {
        lhs: format!("'{}'", field),
        rhs: col_type.to_string(),
    };
    match col_type {
        ColType::Int => field.parse::<i32>().map(Value::Int).map_err(|_| bad()),
        ColType::Float => field.parse::<f64>().map(Value::Float).map_err(|_| bad()),
        ColType::Bigint => field.parse::<i64>().map(Value::Bigint).map_err(|_| bad()),
        ColType::String => Ok(Value::Str(field.to_string())),
        ColType::Datetime => string_to_datetime(field)
            .map(Value::Datetime)
            .ok_or_else(bad),
    }
}

/// Deterministic index file name: the single source of truth for
/// locating an index on disk.
pub fn index_name(tab_name: &str, col_names: &[String]) -> String {
    format!("{}.{}.idx", tab_name, col_names.join("_"))
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
