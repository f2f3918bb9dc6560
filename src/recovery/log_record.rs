use crate::common::{DbError, Lsn, Result, Rid, TxnId};
use crate::tuple::Record;

/// Size of the common header: type, lsn, total length, txn id,
/// prev lsn, 4 bytes each.
pub const LOG_HEADER_SIZE: usize = 20;

const OFFSET_LOG_TYPE: usize = 0;
const OFFSET_LSN: usize = 4;
pub const OFFSET_LOG_TOT_LEN: usize = 8;
const OFFSET_TXN_ID: usize = 12;
const OFFSET_PREV_LSN: usize = 16;

/// Payload of a write-ahead log record.
#[derive(Debug, Clone, PartialEq)]
pub enum LogPayload {
    Begin,
    Commit,
    Abort,
    Insert {
        tab_name: String,
        rid: Rid,
        record: Record,
    },
    Delete {
        tab_name: String,
        rid: Rid,
        record: Record,
    },
    Update {
        tab_name: String,
        rid: Rid,
        before: Record,
        after: Record,
    },
    IndexInsert {
        ix_name: String,
        key: Vec<u8>,
        rid: Rid,
    },
    IndexDelete {
        ix_name: String,
        key: Vec<u8>,
        rid: Rid,
    },
}

impl LogPayload {
    fn type_tag(&self) -> u32 {
        match self {
            LogPayload::Begin => 0,
            LogPayload::Commit => 1,
            LogPayload::Abort => 2,
            LogPayload::Insert { .. } => 3,
            LogPayload::Delete { .. } => 4,
            LogPayload::Update { .. } => 5,
            LogPayload::IndexInsert { .. } => 6,
            LogPayload::IndexDelete { .. } => 7,
        }
    }
}

/// One write-ahead log record: common header plus typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub prev_lsn: Lsn,
    pub txn_id: TxnId,
    pub payload: LogPayload,
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn put_rid(buf: &mut Vec<u8>, rid: Rid) {
    buf.extend_from_slice(&rid.page_no.to_le_bytes());
    buf.extend_from_slice(&rid.slot_no.to_le_bytes());
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u32(&mut self) -> Result<u32> {
        if self.pos + 4 > self.data.len() {
            return Err(DbError::Internal("truncated log record".into()));
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        if self.pos + len > self.data.len() {
            return Err(DbError::Internal("truncated log record".into()));
        }
        let v = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(v)
    }

    fn string(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes)
            .map_err(|_| DbError::Internal("log record string not utf-8".into()))
    }

    fn rid(&mut self) -> Result<Rid> {
        Ok(Rid::new(self.u32()?, self.u32()?))
    }
}

impl LogRecord {
    /// Serializes the record: common header then payload fields, all
    /// little-endian, strings and byte blobs length-prefixed.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LOG_HEADER_SIZE);
        buf.extend_from_slice(&self.payload.type_tag().to_le_bytes());
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // patched below
        buf.extend_from_slice(&self.txn_id.to_le_bytes());
        buf.extend_from_slice(&self.prev_lsn.to_le_bytes());

        match &self.payload {
            LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => {}
            LogPayload::Insert {
                tab_name,
                rid,
                record,
            }
            | LogPayload::Delete {
                tab_name,
                rid,
                record,
            } => {
                put_bytes(&mut buf, record.data());
                put_rid(&mut buf, *rid);
                put_bytes(&mut buf, tab_name.as_bytes());
            }
            LogPayload::Update {
                tab_name,
                rid,
                before,
                after,
            } => {
                put_bytes(&mut buf, before.data());
                put_bytes(&mut buf, after.data());
                put_rid(&mut buf, *rid);
                put_bytes(&mut buf, tab_name.as_bytes());
            }
            LogPayload::IndexInsert { ix_name, key, rid }
            | LogPayload::IndexDelete { ix_name, key, rid } => {
                put_bytes(&mut buf, key);
                put_rid(&mut buf, *rid);
                put_bytes(&mut buf, ix_name.as_bytes());
            }
        }

        let tot_len = buf.len() as u32;
        buf[OFFSET_LOG_TOT_LEN..OFFSET_LOG_TOT_LEN + 4]
            .copy_from_slice(&tot_len.to_le_bytes());
        buf
    }

    /// Reads the total length field of the record starting at `data`.
    pub fn peek_len(data: &[u8]) -> Option<usize> {
        if data.len() < LOG_HEADER_SIZE {
            return None;
        }
        Some(u32::from_le_bytes(
            data[OFFSET_LOG_TOT_LEN..OFFSET_LOG_TOT_LEN + 4]
                .try_into()
                .unwrap(),
        ) as usize)
    }

    /// Parses one record from the front of `data`, returning it and
    /// the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> Result<(LogRecord, usize)> {
        if data.len() < LOG_HEADER_SIZE {
            return Err(DbError::Internal("truncated log header".into()));
        }
        let type_tag =
            u32::from_le_bytes(data[OFFSET_LOG_TYPE..OFFSET_LOG_TYPE + 4].try_into().unwrap());
        let lsn = i32::from_le_bytes(data[OFFSET_LSN..OFFSET_LSN + 4].try_into().unwrap());
        let tot_len = LogRecord::peek_len(data).unwrap();
        let txn_id =
            u32::from_le_bytes(data[OFFSET_TXN_ID..OFFSET_TXN_ID + 4].try_into().unwrap());
        let prev_lsn =
            i32::from_le_bytes(data[OFFSET_PREV_LSN..OFFSET_PREV_LSN + 4].try_into().unwrap());
        if tot_len < LOG_HEADER_SIZE || tot_len > data.len() {
            return Err(DbError::Internal("truncated log record".into()));
        }

        let mut cur = Cursor {
            data: &data[..tot_len],
            pos: LOG_HEADER_SIZE,
        };
        let payload = match type_tag {
            0 => LogPayload::Begin,
            1 => LogPayload::Commit,
            2 => LogPayload::Abort,
            3 | 4 => {
                let record = Record::from_vec(cur.bytes()?);
                let rid = cur.rid()?;
                let tab_name = cur.string()?;
                if type_tag == 3 {
                    LogPayload::Insert {
                        tab_name,
                        rid,
                        record,
                    }
                } else {
                    LogPayload::Delete {
                        tab_name,
                        rid,
                        record,
                    }
                }
            }
            5 => {
                let before = Record::from_vec(cur.bytes()?);
                let after = Record::from_vec(cur.bytes()?);
                let rid = cur.rid()?;
                let tab_name = cur.string()?;
                LogPayload::Update {
                    tab_name,
                    rid,
                    before,
                    after,
                }
            }
            6 | 7 => {
                let key = cur.bytes()?;
                let rid = cur.rid()?;
                let ix_name = cur.string()?;
                if type_tag == 6 {
                    LogPayload::IndexInsert { ix_name, key, rid }
                } else {
                    LogPayload::IndexDelete { ix_name, key, rid }
                }
            }
            other => {
                return Err(DbError::Internal(format!(
                    "unknown log record type {}",
                    other
                )))
            }
        };

        Ok((
            LogRecord {
                lsn,
                prev_lsn,
                txn_id,
                payload,
            },
            tot_len,
        ))
    }
}
