//! Append-only record log over a storage backend.

use crate::durable::record::{
    compute_crc32, LogRecord, LogRecordType, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};
use crate::error::{StateError, StateResult};
use crate::types::SequenceNumber;
use berth_storage::StorageBackend;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Outcome of reading the log back at open.
#[derive(Debug, Default)]
pub struct Replay {
    /// Committed batches in log order, each without its `Commit` record.
    pub batches: Vec<Vec<LogRecord>>,
    /// Sequence of the last committed batch.
    pub last_sequence: SequenceNumber,
    /// Bytes cut from the end: a torn record or a batch that never committed.
    pub discarded_bytes: u64,
}

/// The durable log of committed write transactions.
///
/// Each commit appends one contiguous batch and flushes it. A batch that
/// fails to append is cut off again so the next batch never lands behind
/// half-written bytes.
pub struct RecordLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl RecordLog {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends `records` as one batch and makes it durable.
    ///
    /// Returns the offset the batch starts at.
    pub fn append_batch(&self, records: &[LogRecord]) -> StateResult<u64> {
        let mut buf = Vec::new();
        for record in records {
            buf.extend(record.encode()?);
        }

        let mut backend = self.backend.lock();
        let start = backend.size()?;
        let written = backend.append(&buf).and_then(|offset| {
            if self.sync_on_commit {
                backend.sync()?;
            } else {
                backend.flush()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(e) => {
                if let Err(cut) = backend.truncate(start) {
                    warn!(offset = start, error = %cut, "failed to cut off partial batch");
                }
                Err(e.into())
            }
        }
    }

    /// Reads every committed batch and trims whatever follows the last one.
    ///
    /// A header or payload that runs past the end of the log is a torn write
    /// and ends the log. Bad magic, an unknown version or type, and checksum
    /// mismatches are corruption and fail the replay.
    pub fn replay(&self) -> StateResult<Replay> {
        let mut backend = self.backend.lock();
        let data = backend.read_all()?;

        let mut replay = Replay::default();
        let mut pending = Vec::new();
        let mut committed_len = 0u64;

        for entry in LogReader::new(&data) {
            let (end, record) = entry?;
            match record {
                LogRecord::Commit { sequence } => {
                    if sequence <= replay.last_sequence {
                        return Err(StateError::corruption(format!(
                            "commit {sequence} does not follow {}",
                            replay.last_sequence
                        )));
                    }
                    replay.last_sequence = sequence;
                    replay.batches.push(std::mem::take(&mut pending));
                    committed_len = end;
                }
                other => pending.push(other),
            }
        }

        let size = data.len() as u64;
        if committed_len < size {
            replay.discarded_bytes = size - committed_len;
            warn!(
                discarded_bytes = replay.discarded_bytes,
                uncommitted_records = pending.len(),
                "trimming incomplete tail of record log"
            );
            backend.truncate(committed_len)?;
        }

        debug!(
            batches = replay.batches.len(),
            last_sequence = %replay.last_sequence,
            "record log replayed"
        );
        Ok(replay)
    }

    /// Atomically replaces the whole log with `records`.
    pub fn rewrite(&self, records: &[LogRecord]) -> StateResult<()> {
        let mut buf = Vec::new();
        for record in records {
            buf.extend(record.encode()?);
        }
        self.backend.lock().replace(&buf)?;
        Ok(())
    }

    /// Current log size in bytes.
    pub fn size(&self) -> StateResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

impl std::fmt::Debug for RecordLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

/// Iterates `(end offset, record)` over an in-memory copy of the log.
struct LogReader<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> LogReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }

    fn read_next(&mut self) -> StateResult<Option<(u64, LogRecord)>> {
        let rest = &self.data[self.offset..];
        if rest.len() < HEADER_SIZE {
            return Ok(None);
        }
        let at = self.offset as u64;

        if rest[..4] != LOG_MAGIC {
            return Err(StateError::corruption(format!("bad magic at offset {at}")));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != LOG_VERSION {
            return Err(StateError::corruption(format!(
                "unsupported log version {version} at offset {at}"
            )));
        }
        let record_type = LogRecordType::from_byte(rest[6]).ok_or_else(|| {
            StateError::corruption(format!("unknown record type {} at offset {at}", rest[6]))
        })?;
        let len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;

        let total = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < total {
            return Ok(None);
        }

        let body = &rest[..HEADER_SIZE + len];
        let tail = &rest[HEADER_SIZE + len..total];
        let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let actual = compute_crc32(body);
        if expected != actual {
            return Err(StateError::ChecksumMismatch {
                offset: at,
                expected,
                actual,
            });
        }

        let record = LogRecord::decode_payload(record_type, &body[HEADER_SIZE..])?;
        self.offset += total;
        Ok(Some((self.offset as u64, record)))
    }
}

impl Iterator for LogReader<'_> {
    type Item = StateResult<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_storage::InMemoryBackend;

    fn put(key: &str) -> LogRecord {
        LogRecord::Put {
            bucket: "target".into(),
            key: key.as_bytes().to_vec(),
            value: vec![1, 2, 3],
        }
    }

    fn commit(seq: u64) -> LogRecord {
        LogRecord::Commit {
            sequence: SequenceNumber::new(seq),
        }
    }

    #[test]
    fn committed_batches_replay_in_order() {
        let backend = InMemoryBackend::new();
        let log = RecordLog::new(Box::new(backend.share()), false);
        log.append_batch(&[put("a"), put("b"), commit(1)]).unwrap();
        log.append_batch(&[put("c"), commit(2)]).unwrap();

        let replay = RecordLog::new(Box::new(backend), false).replay().unwrap();
        assert_eq!(replay.batches.len(), 2);
        assert_eq!(replay.batches[0], vec![put("a"), put("b")]);
        assert_eq!(replay.batches[1], vec![put("c")]);
        assert_eq!(replay.last_sequence, SequenceNumber::new(2));
        assert_eq!(replay.discarded_bytes, 0);
    }

    #[test]
    fn batch_without_commit_is_trimmed() {
        let backend = InMemoryBackend::new();
        let log = RecordLog::new(Box::new(backend.share()), false);
        log.append_batch(&[put("a"), commit(1)]).unwrap();
        let committed = backend.data().len();
        log.append_batch(&[put("b")]).unwrap();

        let replay = log.replay().unwrap();
        assert_eq!(replay.batches, vec![vec![put("a")]]);
        assert!(replay.discarded_bytes > 0);
        assert_eq!(backend.data().len(), committed);
    }

    #[test]
    fn torn_record_is_trimmed() {
        let backend = InMemoryBackend::new();
        let log = RecordLog::new(Box::new(backend.share()), false);
        log.append_batch(&[put("a"), commit(1)]).unwrap();
        let committed = backend.data().len();

        let mut torn = put("b").encode().unwrap();
        torn.truncate(torn.len() - 3);
        let mut raw = backend.share();
        raw.append(&torn).unwrap();

        let replay = log.replay().unwrap();
        assert_eq!(replay.batches.len(), 1);
        assert_eq!(replay.discarded_bytes, torn.len() as u64);
        assert_eq!(backend.data().len(), committed);
    }

    #[test]
    fn flipped_bit_is_a_checksum_error() {
        let mut bytes = put("a").encode().unwrap();
        bytes.extend(commit(1).encode().unwrap());
        bytes[HEADER_SIZE + 3] ^= 0x40;

        let log = RecordLog::new(Box::new(InMemoryBackend::with_data(bytes)), false);
        assert!(matches!(
            log.replay(),
            Err(StateError::ChecksumMismatch { offset: 0, .. })
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut bytes = commit(1).encode().unwrap();
        bytes[0] = b'X';
        let log = RecordLog::new(Box::new(InMemoryBackend::with_data(bytes)), false);
        assert!(matches!(log.replay(), Err(StateError::Corruption { .. })));
    }

    #[test]
    fn non_increasing_commit_is_corruption() {
        let backend = InMemoryBackend::new();
        let log = RecordLog::new(Box::new(backend.share()), false);
        log.append_batch(&[commit(2)]).unwrap();
        log.append_batch(&[commit(2)]).unwrap();
        assert!(matches!(log.replay(), Err(StateError::Corruption { .. })));
    }

    #[test]
    fn rewrite_replaces_history() {
        let backend = InMemoryBackend::new();
        let log = RecordLog::new(Box::new(backend.share()), true);
        log.append_batch(&[put("a"), commit(1)]).unwrap();
        log.append_batch(&[put("a"), commit(2)]).unwrap();
        let before = log.size().unwrap();

        log.rewrite(&[put("a"), commit(2)]).unwrap();
        assert!(log.size().unwrap() < before);

        let replay = log.replay().unwrap();
        assert_eq!(replay.batches, vec![vec![put("a")]]);
        assert_eq!(replay.last_sequence, SequenceNumber::new(2));
    }

    proptest::proptest! {
        #[test]
        fn any_truncation_keeps_a_committed_prefix(batches in 1usize..6, cut in 0usize..512) {
            let backend = InMemoryBackend::new();
            let log = RecordLog::new(Box::new(backend.share()), false);
            for seq in 1..=batches as u64 {
                log.append_batch(&[put(&format!("k{seq}")), commit(seq)]).unwrap();
            }

            let mut data = backend.data();
            let keep = data.len().saturating_sub(cut);
            data.truncate(keep);
            let replay = RecordLog::new(Box::new(InMemoryBackend::with_data(data)), false)
                .replay()
                .unwrap();

            proptest::prop_assert!(replay.batches.len() <= batches);
            for (i, batch) in replay.batches.iter().enumerate() {
                proptest::prop_assert_eq!(batch, &vec![put(&format!("k{}", i + 1))]);
            }
            proptest::prop_assert_eq!(
                replay.last_sequence,
                SequenceNumber::new(replay.batches.len() as u64)
            );
        }
    }
}
