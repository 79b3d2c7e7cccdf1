//! Log record types and binary framing.
//!
//! Format: `[type: u8][payload_len: u32 LE][payload bytes]`.
//! All multi-byte integers are little-endian; page images are length-prefixed
//! with a `u32`.

use super::error::{LogError, LogResult};
use crate::file::PageKey;
use crate::transaction::TransactionId;

const HEADER_LEN: usize = 5;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogRecordType {
    Update = 1,
    Commit = 2,
    Abort = 3,
}

impl LogRecordType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Update),
            2 => Some(Self::Commit),
            3 => Some(Self::Abort),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Update => "UPDATE",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogRecord {
    /// A page image pair written just before the page itself goes to disk
    Update {
        tid: TransactionId,
        key: PageKey,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    Commit {
        tid: TransactionId,
    },
    Abort {
        tid: TransactionId,
    },
}

impl LogRecord {
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Update { .. } => LogRecordType::Update,
            Self::Commit { .. } => LogRecordType::Commit,
            Self::Abort { .. } => LogRecordType::Abort,
        }
    }

    pub fn tid(&self) -> TransactionId {
        match self {
            Self::Update { tid, .. } | Self::Commit { tid } | Self::Abort { tid } => *tid,
        }
    }

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.push(self.record_type() as u8);

        let len_pos = buf.len();
        buf.extend_from_slice(&[0u8; 4]);
        let payload_start = buf.len();

        buf.extend_from_slice(&self.tid().as_u64().to_le_bytes());
        if let Self::Update {
            key, before, after, ..
        } = self
        {
            buf.extend_from_slice(&key.table_id.to_le_bytes());
            buf.extend_from_slice(&(key.page_no as u32).to_le_bytes());
            buf.extend_from_slice(&(before.len() as u32).to_le_bytes());
            buf.extend_from_slice(before);
            buf.extend_from_slice(&(after.len() as u32).to_le_bytes());
            buf.extend_from_slice(after);
        }

        let payload_len = (buf.len() - payload_start) as u32;
        buf[len_pos..len_pos + 4].copy_from_slice(&payload_len.to_le_bytes());
    }

    /// Decode one record from the front of `data`, returning it and the bytes consumed
    pub fn deserialize(data: &[u8]) -> LogResult<(Self, usize)> {
        if data.len() < HEADER_LEN {
            return Err(LogError::UnexpectedEof(0));
        }

        let record_type = LogRecordType::from_byte(data[0]).ok_or(LogError::InvalidType(data[0]))?;
        let payload_len = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
        let total_len = HEADER_LEN + payload_len;
        if data.len() < total_len {
            return Err(LogError::UnexpectedEof(0));
        }

        let mut payload = Payload {
            record: record_type.name(),
            data: &data[HEADER_LEN..total_len],
            pos: 0,
        };
        let tid = TransactionId::from_raw(payload.u64()?);

        let record = match record_type {
            LogRecordType::Update => {
                let table_id = payload.u32()?;
                let page_no = payload.u32()? as usize;
                let before = payload.image()?;
                let after = payload.image()?;
                Self::Update {
                    tid,
                    key: PageKey::new(table_id, page_no),
                    before,
                    after,
                }
            }
            LogRecordType::Commit => Self::Commit { tid },
            LogRecordType::Abort => Self::Abort { tid },
        };

        payload.finish()?;
        Ok((record, total_len))
    }

    /// Decode a whole log
    pub fn decode_all(data: &[u8]) -> LogResult<Vec<Self>> {
        let mut records = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let (record, consumed) = Self::deserialize(&data[pos..]).map_err(|e| match e {
                LogError::UnexpectedEof(_) => LogError::UnexpectedEof(pos),
                other => other,
            })?;
            records.push(record);
            pos += consumed;
        }

        Ok(records)
    }
}

struct Payload<'a> {
    record: &'static str,
    data: &'a [u8],
    pos: usize,
}

impl Payload<'_> {
    fn take(&mut self, n: usize) -> LogResult<&[u8]> {
        if self.data.len() - self.pos < n {
            return Err(LogError::Malformed {
                record: self.record,
                reason: format!("needs {} more bytes at offset {}", n, self.pos),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u32(&mut self) -> LogResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> LogResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn image(&mut self) -> LogResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(&self) -> LogResult<()> {
        if self.pos != self.data.len() {
            return Err(LogError::Malformed {
                record: self.record,
                reason: format!("{} trailing bytes", self.data.len() - self.pos),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update() -> LogRecord {
        LogRecord::Update {
            tid: TransactionId::from_raw(5),
            key: PageKey::new(2, 9),
            before: vec![0; 16],
            after: vec![1; 16],
        }
    }

    #[test]
    fn test_update_record_framing() {
        let mut buf = Vec::new();
        update().serialize(&mut buf);

        assert_eq!(buf[0], LogRecordType::Update as u8);
        let payload_len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        assert_eq!(buf.len(), HEADER_LEN + payload_len);

        let (decoded, consumed) = LogRecord::deserialize(&buf).unwrap();
        assert_eq!(decoded, update());
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_decode_mixed_log() {
        let tid = TransactionId::from_raw(5);
        let mut buf = Vec::new();
        update().serialize(&mut buf);
        LogRecord::Commit { tid }.serialize(&mut buf);
        LogRecord::Abort {
            tid: TransactionId::from_raw(6),
        }
        .serialize(&mut buf);

        let records = LogRecord::decode_all(&buf).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], LogRecord::Commit { tid });
        assert_eq!(records[2].record_type(), LogRecordType::Abort);
    }

    #[test]
    fn test_torn_tail_reports_offset() {
        let mut buf = Vec::new();
        LogRecord::Commit {
            tid: TransactionId::from_raw(1),
        }
        .serialize(&mut buf);
        let first_len = buf.len();
        update().serialize(&mut buf);
        buf.truncate(buf.len() - 3);

        let result = LogRecord::decode_all(&buf);
        assert!(matches!(result, Err(LogError::UnexpectedEof(pos)) if pos == first_len));
    }

    #[test]
    fn test_invalid_type() {
        let result = LogRecord::deserialize(&[0xee, 0, 0, 0, 0]);
        assert!(matches!(result, Err(LogError::InvalidType(0xee))));
    }
}
