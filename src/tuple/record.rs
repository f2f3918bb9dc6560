use super::{ColType, Value};

/// A fixed-width record: the raw byte image of one table row. Column
/// values live at the offsets the table's column layout dictates;
/// there is no per-row header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    data: Vec<u8>,
}

impl Record {
    /// Creates a zeroed record of the given size.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copies `bytes` into the record at `offset`.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn bytes_at(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Reads the typed value stored at a column position.
    pub fn value_at(&self, col_type: ColType, offset: usize, len: usize) -> Value {
        Value::from_bytes(col_type, self.bytes_at(offset, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_write_read() {
        let mut rec = Record::new(12);
        rec.write_at(0, &7i32.to_le_bytes());
        rec.write_at(4, &(-1i64).to_le_bytes());

        assert_eq!(rec.value_at(ColType::Int, 0, 4), Value::Int(7));
        assert_eq!(rec.value_at(ColType::Bigint, 4, 8), Value::Bigint(-1));
    }

    #[test]
    fn test_record_string_column() {
        let mut rec = Record::new(8);
        let bytes = Value::Str("hi".into()).to_bytes(8).unwrap();
        rec.write_at(0, &bytes);
        assert_eq!(
            rec.value_at(ColType::String, 0, 8),
            Value::Str("hi".into())
        );
    }
}
