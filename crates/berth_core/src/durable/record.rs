//! Record log entries and their byte format.

use crate::error::{StateError, StateResult};
use crate::types::SequenceNumber;

/// Magic bytes opening every log record.
pub const LOG_MAGIC: [u8; 4] = *b"BLOG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type byte of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A bucket came into existence.
    CreateBucket = 1,
    /// A key was written.
    Put = 2,
    /// A key was removed.
    Delete = 3,
    /// The batch before this record is committed.
    Commit = 4,
}

impl LogRecordType {
    /// Parses a type byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::CreateBucket),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Returns the type byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One entry of the record log.
///
/// A write transaction is logged as its mutations followed by a single
/// `Commit`. Replay applies a batch only once it has seen that `Commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Create a bucket.
    CreateBucket {
        /// Bucket name.
        bucket: String,
    },
    /// Store `value` under `key`.
    Put {
        /// Bucket name.
        bucket: String,
        /// Record key.
        key: Vec<u8>,
        /// Encoded record.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// Bucket name.
        bucket: String,
        /// Record key.
        key: Vec<u8>,
    },
    /// Seal the preceding batch.
    Commit {
        /// Sequence assigned to the batch.
        sequence: SequenceNumber,
    },
}

impl LogRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::CreateBucket { .. } => LogRecordType::CreateBucket,
            Self::Put { .. } => LogRecordType::Put,
            Self::Delete { .. } => LogRecordType::Delete,
            Self::Commit { .. } => LogRecordType::Commit,
        }
    }

    /// Encodes the record with its envelope:
    ///
    /// ```text
    /// | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
    /// ```
    pub fn encode(&self) -> StateResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StateError::invalid_operation("log record payload exceeds 4 GiB"))?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.extend_from_slice(&LOG_MAGIC);
        buf.extend_from_slice(&LOG_VERSION.to_le_bytes());
        buf.push(self.record_type().as_byte());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    fn encode_payload(&self) -> StateResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::CreateBucket { bucket } => put_name(&mut buf, bucket)?,
            Self::Put { bucket, key, value } => {
                put_name(&mut buf, bucket)?;
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, value)?;
            }
            Self::Delete { bucket, key } => {
                put_name(&mut buf, bucket)?;
                put_bytes(&mut buf, key)?;
            }
            Self::Commit { sequence } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }
        Ok(buf)
    }

    /// Decodes a payload of the given type.
    pub fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> StateResult<Self> {
        let mut cur = Cursor { data: payload, pos: 0 };
        let record = match record_type {
            LogRecordType::CreateBucket => Self::CreateBucket {
                bucket: cur.name()?,
            },
            LogRecordType::Put => Self::Put {
                bucket: cur.name()?,
                key: cur.bytes()?,
                value: cur.bytes()?,
            },
            LogRecordType::Delete => Self::Delete {
                bucket: cur.name()?,
                key: cur.bytes()?,
            },
            LogRecordType::Commit => Self::Commit {
                sequence: SequenceNumber::new(cur.u64()?),
            },
        };
        if cur.pos != payload.len() {
            return Err(StateError::corruption(format!(
                "{} unread bytes in {record_type:?} record",
                payload.len() - cur.pos
            )));
        }
        Ok(record)
    }
}

fn put_name(buf: &mut Vec<u8>, name: &str) -> StateResult<()> {
    let len = u16::try_from(name.len())
        .map_err(|_| StateError::invalid_operation(format!("bucket name too long: {name}")))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> StateResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| StateError::invalid_operation("log field exceeds 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> StateResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| StateError::corruption("unexpected end of record payload"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> StateResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> StateResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> StateResult<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn name(&mut self) -> StateResult<String> {
        let len = usize::from(self.u16()?);
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| StateError::corruption("bucket name is not UTF-8"))
    }

    fn bytes(&mut self) -> StateResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// CRC32 (IEEE polynomial) over `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> LogRecord {
        let ty = LogRecordType::from_byte(bytes[6]).unwrap();
        let len = u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]) as usize;
        LogRecord::decode_payload(ty, &bytes[HEADER_SIZE..HEADER_SIZE + len]).unwrap()
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn put_record_layout() {
        let record = LogRecord::Put {
            bucket: "target".into(),
            key: b"tgt-1".to_vec(),
            value: vec![0xA1, 0x01],
        };
        let bytes = record.encode().unwrap();
        assert_eq!(&bytes[..4], b"BLOG");
        assert_eq!(bytes[6], LogRecordType::Put.as_byte());
        // name: 2 + 6, key: 4 + 5, value: 4 + 2
        assert_eq!(bytes.len(), HEADER_SIZE + 23 + CRC_SIZE);
        let body = bytes.len() - CRC_SIZE;
        let crc = u32::from_le_bytes(bytes[body..].try_into().unwrap());
        assert_eq!(crc, compute_crc32(&bytes[..body]));
        assert_eq!(decode(&bytes), record);
    }

    #[test]
    fn every_record_type_decodes_back() {
        for record in [
            LogRecord::CreateBucket {
                bucket: "project".into(),
            },
            LogRecord::Delete {
                bucket: "project".into(),
                key: b"prj-1".to_vec(),
            },
            LogRecord::Commit {
                sequence: SequenceNumber::new(9),
            },
        ] {
            assert_eq!(decode(&record.encode().unwrap()), record);
        }
    }

    #[test]
    fn short_payload_is_corruption() {
        let err = LogRecord::decode_payload(LogRecordType::Commit, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, StateError::Corruption { .. }));
    }

    #[test]
    fn extra_payload_bytes_are_corruption() {
        let err =
            LogRecord::decode_payload(LogRecordType::Commit, &[0u8; 9]).unwrap_err();
        assert!(matches!(err, StateError::Corruption { .. }));
    }

    #[test]
    fn unknown_type_byte() {
        assert_eq!(LogRecordType::from_byte(0), None);
        assert_eq!(LogRecordType::from_byte(5), None);
        assert_eq!(LogRecordType::from_byte(4), Some(LogRecordType::Commit));
    }
}
