use std::collections::BTreeMap;

use crate::common::{DbError, Result};
use crate::tuple::{ColType, Record};

/// Metadata for one table column: its position in the fixed-width
/// record layout and whether any index covers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColMeta {
    pub tab_name: String,
    pub name: String,
    pub col_type: ColType,
    pub len: usize,
    pub offset: usize,
    pub index: bool,
}

/// Metadata for one index: the ordered indexed columns and their
/// total serialized key width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub tab_name: String,
    pub col_tot_len: usize,
    pub cols: Vec<ColMeta>,
}

impl IndexMeta {
    pub fn col_names(&self) -> Vec<String> {
        self.cols.iter().map(|c| c.name.clone()).collect()
    }

    /// Extracts this index's key bytes from a table record.
    pub fn build_key(&self, record: &Record) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.col_tot_len);
        for col in &self.cols {
            key.extend_from_slice(record.bytes_at(col.offset, col.len));
        }
        key
    }
}

/// Metadata for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabMeta {
    pub name: String,
    pub cols: Vec<ColMeta>,
    pub indexes: Vec<IndexMeta>,
}

impl TabMeta {
    pub fn get_col(&self, name: &str) -> Result<&ColMeta> {
        self.cols
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DbError::ColumnNotFound(format!("{}.{}", self.name, name)))
    }

    pub fn record_size(&self) -> usize {
        self.cols.last().map_or(0, |c| c.offset + c.len)
    }

    pub fn get_index_meta(&self, col_names: &[String]) -> Option<&IndexMeta> {
        self.indexes.iter().find(|ix| {
            ix.cols.len() == col_names.len()
                && ix.cols.iter().zip(col_names).all(|(c, n)| &c.name == n)
        })
    }
}

/// The whole catalog of one database, persisted as a single file and
/// rewritten in full after every DDL statement.
#[derive(Debug, Clone, Default)]
pub struct DbMeta {
    pub name: String,
    pub tabs: BTreeMap<String, TabMeta>,
}

impl DbMeta {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tabs: BTreeMap::new(),
        }
    }

    pub fn is_table(&self, name: &str) -> bool {
        self.tabs.contains_key(name)
    }

    pub fn get_table(&self, name: &str) -> Result<&TabMeta> {
        self.tabs
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut TabMeta> {
        self.tabs
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u32(&mut self) -> Result<u32> {
        if self.pos + 4 > self.data.len() {
            return Err(DbError::Internal("truncated catalog".into()));
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn u8(&mut self) -> Result<u8> {
        if self.pos >= self.data.len() {
            return Err(DbError::Internal("truncated catalog".into()));
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        if self.pos + len > self.data.len() {
            return Err(DbError::Internal("truncated catalog".into()));
        }
        let s = String::from_utf8(self.data[self.pos..self.pos + len].to_vec())
            .map_err(|_| DbError::Internal("catalog string not utf-8".into()))?;
        self.pos += len;
        Ok(s)
    }
}

fn put_col(buf: &mut Vec<u8>, col: &ColMeta) {
    put_str(buf, &col.tab_name);
    put_str(buf, &col.name);
    buf.push(col.col_type.type_id());
    put_u32(buf, col.len as u32);
    put_u32(buf, col.offset as u32);
    buf.push(col.index as u8);
}

fn read_col(r: &mut Reader) -> Result<ColMeta> {
    let tab_name = r.string()?;
    let name = r.string()?;
    let col_type = ColType::from_type_id(r.u8()?)
        .ok_or_else(|| DbError::Internal("bad column type in catalog".into()))?;
    let len = r.u32()? as usize;
    let offset = r.u32()? as usize;
    let index = r.u8()? != 0;
    Ok(ColMeta {
        tab_name,
        name,
        col_type,
        len,
        offset,
        index,
    })
}

impl DbMeta {
    /// Serializes the catalog: every string length-prefixed, counts
    /// ahead of repeated sections.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_str(&mut buf, &self.name);
        put_u32(&mut buf, self.tabs.len() as u32);
        for tab in self.tabs.values() {
            put_str(&mut buf, &tab.name);
            put_u32(&mut buf, tab.cols.len() as u32);
            for col in &tab.cols {
                put_col(&mut buf, col);
            }
            put_u32(&mut buf, tab.indexes.len() as u32);
            for ix in &tab.indexes {
                put_str(&mut buf, &ix.tab_name);
                put_u32(&mut buf, ix.col_tot_len as u32);
                put_u32(&mut buf, ix.cols.len() as u32);
                for col in &ix.cols {
                    put_col(&mut buf, col);
                }
            }
        }
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut r = Reader { data, pos: 0 };
        let name = r.string()?;
        let num_tabs = r.u32()? as usize;
        let mut tabs = BTreeMap::new();
        for _ in 0..num_tabs {
            let tab_name = r.string()?;
            let num_cols = r.u32()? as usize;
            let mut cols = Vec::with_capacity(num_cols);
            for _ in 0..num_cols {
                cols.push(read_col(&mut r)?);
            }
            let num_indexes = r.u32()? as usize;
            let mut indexes = Vec::with_capacity(num_indexes);
            for _ in 0..num_indexes {
                let ix_tab = r.string()?;
                let col_tot_len = r.u32()? as usize;
                let n = r.u32()? as usize;
                let mut ix_cols = Vec::with_capacity(n);
                for _ in 0..n {
                    ix_cols.push(read_col(&mut r)?);
                }
                indexes.push(IndexMeta {
                    tab_name: ix_tab,
                    col_tot_len,
                    cols: ix_cols,
                });
            }
            tabs.insert(
                tab_name.clone(),
                TabMeta {
                    name: tab_name,
                    cols,
                    indexes,
                },
            );
        }
        Ok(DbMeta { name, tabs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> DbMeta {
        let cols = vec![
            ColMeta {
                tab_name: "t".into(),
                name: "id".into(),
                col_type: ColType::Int,
                len: 4,
                offset: 0,
                index: true,
            },
            ColMeta {
                tab_name: "t".into(),
                name: "name".into(),
                col_type: ColType::String,
                len: 16,
                offset: 4,
                index: false,
            },
        ];
        let index = IndexMeta {
            tab_name: "t".into(),
            col_tot_len: 4,
            cols: vec![cols[0].clone()],
        };
        let mut meta = DbMeta::new("testdb");
        meta.tabs.insert(
            "t".into(),
            TabMeta {
                name: "t".into(),
                cols,
                indexes: vec![index],
            },
        );
        meta
    }

    #[test]
    fn test_serialize_roundtrip() {
        let meta = sample_meta();
        let bytes = meta.serialize();
        let parsed = DbMeta::deserialize(&bytes).unwrap();
        assert_eq!(parsed.name, "testdb");
        let tab = parsed.get_table("t").unwrap();
        assert_eq!(tab.cols.len(), 2);
        assert_eq!(tab.cols[1].offset, 4);
        assert_eq!(tab.indexes.len(), 1);
        assert_eq!(tab.record_size(), 20);
    }

    #[test]
    fn test_get_col_errors() {
        let meta = sample_meta();
        let tab = meta.get_table("t").unwrap();
        assert!(tab.get_col("id").is_ok());
        assert!(matches!(
            tab.get_col("missing"),
            Err(DbError::ColumnNotFound(_))
        ));
        assert!(matches!(
            meta.get_table("absent"),
            Err(DbError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_index_key_extraction() {
        let meta = sample_meta();
        let tab = meta.get_table("t").unwrap();
        let mut record = Record::new(tab.record_size());
        record.write_at(0, &7i32.to_le_bytes());
        let key = tab.indexes[0].build_key(&record);
        assert_eq!(key, 7i32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_index_meta_lookup() {
        let meta = sample_meta();
        let tab = meta.get_table("t").unwrap();
        assert!(tab.get_index_meta(&["id".to_string()]).is_some());
        assert!(tab.get_index_meta(&["name".to_string()]).is_none());
    }
}
