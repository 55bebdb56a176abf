//! Bucketed key-value store with closure-scoped transactions.

use crate::config::Config;
use crate::durable::dir::StoreDir;
use crate::durable::log::RecordLog;
use crate::durable::record::LogRecord;
use crate::error::{StateError, StateResult};
use crate::types::SequenceNumber;
use berth_storage::{FileBackend, InMemoryBackend, StorageBackend};
use im::OrdMap;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace};

type Bucket = OrdMap<Vec<u8>, Vec<u8>>;

/// Committed contents: every bucket at one sequence number.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    buckets: OrdMap<String, Bucket>,
    sequence: SequenceNumber,
}

impl Snapshot {
    fn bucket(&self, name: &str) -> StateResult<&Bucket> {
        self.buckets
            .get(name)
            .ok_or_else(|| StateError::BucketMissing {
                bucket: name.to_string(),
            })
    }

    fn bucket_mut(&mut self, name: &str) -> StateResult<&mut Bucket> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| StateError::BucketMissing {
                bucket: name.to_string(),
            })
    }

    /// Applies one replayed record.
    fn apply(&mut self, record: LogRecord) -> StateResult<()> {
        match record {
            LogRecord::CreateBucket { bucket } => {
                if !self.buckets.contains_key(bucket.as_str()) {
                    self.buckets.insert(bucket, Bucket::new());
                }
            }
            LogRecord::Put { bucket, key, value } => {
                self.bucket_mut(&bucket)
                    .map_err(|_| StateError::corruption(format!("put into unknown bucket {bucket}")))?
                    .insert(key, value);
            }
            LogRecord::Delete { bucket, key } => {
                self.bucket_mut(&bucket)
                    .map_err(|_| {
                        StateError::corruption(format!("delete from unknown bucket {bucket}"))
                    })?
                    .remove(&key);
            }
            LogRecord::Commit { .. } => {}
        }
        Ok(())
    }

    /// The live contents as one log batch, without its commit.
    fn to_records(&self) -> Vec<LogRecord> {
        let mut records = Vec::new();
        for (name, bucket) in &self.buckets {
            records.push(LogRecord::CreateBucket {
                bucket: name.clone(),
            });
            for (key, value) in bucket {
                records.push(LogRecord::Put {
                    bucket: name.clone(),
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }
        records
    }
}

/// Read access shared by read and write transactions.
pub trait DurableRead {
    /// Sequence of the snapshot this transaction reads.
    fn sequence(&self) -> SequenceNumber;

    /// Whether `bucket` exists.
    fn has_bucket(&self, bucket: &str) -> bool;

    /// Fetches the value stored under `key`.
    ///
    /// # Errors
    ///
    /// [`StateError::BucketMissing`] if the bucket was never created.
    fn get(&self, bucket: &str, key: &[u8]) -> StateResult<Option<&[u8]>>;

    /// Calls `f` for every entry of `bucket` in key order, stopping at the
    /// first error.
    fn for_each(
        &self,
        bucket: &str,
        f: &mut dyn FnMut(&[u8], &[u8]) -> StateResult<()>,
    ) -> StateResult<()>;

    /// Number of entries in `bucket`.
    fn bucket_len(&self, bucket: &str) -> StateResult<usize>;
}

macro_rules! impl_durable_read {
    ($ty:ty, $snap:ident => $expr:expr) => {
        impl DurableRead for $ty {
            fn sequence(&self) -> SequenceNumber {
                let $snap = self;
                ($expr).sequence
            }

            fn has_bucket(&self, bucket: &str) -> bool {
                let $snap = self;
                ($expr).buckets.contains_key(bucket)
            }

            fn get(&self, bucket: &str, key: &[u8]) -> StateResult<Option<&[u8]>> {
                let $snap = self;
                Ok(($expr).bucket(bucket)?.get(key).map(Vec::as_slice))
            }

            fn for_each(
                &self,
                bucket: &str,
                f: &mut dyn FnMut(&[u8], &[u8]) -> StateResult<()>,
            ) -> StateResult<()> {
                let $snap = self;
                for (key, value) in ($expr).bucket(bucket)? {
                    f(key.as_slice(), value.as_slice())?;
                }
                Ok(())
            }

            fn bucket_len(&self, bucket: &str) -> StateResult<usize> {
                let $snap = self;
                Ok(($expr).bucket(bucket)?.len())
            }
        }
    };
}

/// A read-only view of one committed snapshot.
///
/// Never blocks writers and never observes changes committed after it was
/// taken.
#[derive(Debug, Clone)]
pub struct ReadTxn {
    snapshot: Arc<Snapshot>,
}

impl_durable_read!(ReadTxn, txn => txn.snapshot);

/// A read-write transaction.
///
/// Sees its own staged writes. Nothing reaches the log until
/// [`DurableStore::update`] commits it.
#[derive(Debug)]
pub struct WriteTxn {
    working: Snapshot,
    pending: Vec<LogRecord>,
    max_record_size: usize,
}

impl_durable_read!(WriteTxn, txn => txn.working);

impl WriteTxn {
    /// Creates `bucket` if it does not exist yet.
    ///
    /// Returns `true` if the bucket was created.
    pub fn create_bucket(&mut self, bucket: &str) -> StateResult<bool> {
        if bucket.is_empty() || bucket.len() > usize::from(u16::MAX) {
            return Err(StateError::invalid_operation(format!(
                "invalid bucket name {bucket:?}"
            )));
        }
        if self.working.buckets.contains_key(bucket) {
            return Ok(false);
        }
        self.working
            .buckets
            .insert(bucket.to_string(), Bucket::new());
        self.pending.push(LogRecord::CreateBucket {
            bucket: bucket.to_string(),
        });
        Ok(true)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&mut self, bucket: &str, key: &[u8], value: Vec<u8>) -> StateResult<()> {
        if key.is_empty() {
            return Err(StateError::invalid_operation(format!(
                "empty key in bucket {bucket}"
            )));
        }
        if value.len() > self.max_record_size {
            return Err(StateError::invalid_operation(format!(
                "record of {} bytes exceeds limit of {} bytes",
                value.len(),
                self.max_record_size
            )));
        }
        self.working
            .bucket_mut(bucket)?
            .insert(key.to_vec(), value.clone());
        self.pending.push(LogRecord::Put {
            bucket: bucket.to_string(),
            key: key.to_vec(),
            value,
        });
        Ok(())
    }

    /// Removes `key`. Returns `false` if it was not present.
    pub fn delete(&mut self, bucket: &str, key: &[u8]) -> StateResult<bool> {
        if self.working.bucket_mut(bucket)?.remove(key).is_none() {
            return Ok(false);
        }
        self.pending.push(LogRecord::Delete {
            bucket: bucket.to_string(),
            key: key.to_vec(),
        });
        Ok(true)
    }
}

/// Result of [`DurableStore::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Live records written.
    pub records: usize,
}

/// The durable record store.
///
/// One writer at a time; any number of readers, each on an immutable
/// snapshot. A write transaction is logged as one batch and published only
/// after the batch is durable.
pub struct DurableStore {
    log: RecordLog,
    committed: RwLock<Arc<Snapshot>>,
    write_lock: Mutex<()>,
    config: Config,
    _dir: Option<StoreDir>,
}

impl DurableStore {
    /// Opens a file-backed store in the directory at `path`.
    pub fn open(path: &Path, config: Config) -> StateResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open(&dir.log_path())?;
        Self::open_inner(Box::new(backend), config, Some(dir))
    }

    /// Opens a store over an arbitrary backend.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: Config,
    ) -> StateResult<Self> {
        Self::open_inner(backend, config, None)
    }

    /// Opens an empty volatile store.
    pub fn open_in_memory() -> StateResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), Config::default())
    }

    fn open_inner(
        backend: Box<dyn StorageBackend>,
        config: Config,
        dir: Option<StoreDir>,
    ) -> StateResult<Self> {
        let log = RecordLog::new(backend, config.sync_on_commit);
        let replay = log.replay()?;

        let mut snapshot = Snapshot::default();
        let batches = replay.batches.len();
        for batch in replay.batches {
            for record in batch {
                snapshot.apply(record)?;
            }
        }
        snapshot.sequence = replay.last_sequence;

        info!(
            batches,
            buckets = snapshot.buckets.len(),
            sequence = %snapshot.sequence,
            discarded_bytes = replay.discarded_bytes,
            "durable store recovered"
        );

        let compact_on_open = config.compact_on_open;
        let store = Self {
            log,
            committed: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
            config,
            _dir: dir,
        };
        if compact_on_open {
            store.compact()?;
        }
        Ok(store)
    }

    /// Takes a read snapshot.
    #[must_use]
    pub fn begin_read(&self) -> ReadTxn {
        ReadTxn {
            snapshot: Arc::clone(&self.committed.read()),
        }
    }

    /// Runs `f` on a read snapshot.
    pub fn view<F, T>(&self, f: F) -> StateResult<T>
    where
        F: FnOnce(&ReadTxn) -> StateResult<T>,
    {
        f(&self.begin_read())
    }

    /// Runs `f` in a write transaction.
    ///
    /// Commits when `f` returns `Ok`; discards every staged write when it
    /// returns `Err`. A commit that fails to reach the log is an error and
    /// publishes nothing.
    pub fn update<F, T>(&self, f: F) -> StateResult<T>
    where
        F: FnOnce(&mut WriteTxn) -> StateResult<T>,
    {
        let _guard = self.write_lock.lock();
        let base = Arc::clone(&self.committed.read());
        let mut txn = WriteTxn {
            working: (*base).clone(),
            pending: Vec::new(),
            max_record_size: self.config.max_record_size,
        };

        match f(&mut txn) {
            Ok(value) => {
                self.commit(txn)?;
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, discarded = txn.pending.len(), "durable transaction rolled back");
                Err(e)
            }
        }
    }

    fn commit(&self, txn: WriteTxn) -> StateResult<()> {
        let WriteTxn {
            mut working,
            mut pending,
            ..
        } = txn;
        if pending.is_empty() {
            return Ok(());
        }

        let sequence = working.sequence.next();
        let records = pending.len();
        pending.push(LogRecord::Commit { sequence });
        let offset = self.log.append_batch(&pending)?;

        working.sequence = sequence;
        *self.committed.write() = Arc::new(working);
        trace!(%sequence, records, offset, "durable transaction committed");
        Ok(())
    }

    /// Rewrites the log down to the live records.
    pub fn compact(&self) -> StateResult<CompactStats> {
        let _guard = self.write_lock.lock();
        let snapshot = Arc::clone(&self.committed.read());
        let bytes_before = self.log.size()?;

        let mut batch = snapshot.to_records();
        let records = batch.len();
        if snapshot.sequence > SequenceNumber::default() {
            batch.push(LogRecord::Commit {
                sequence: snapshot.sequence,
            });
        }
        self.log.rewrite(&batch)?;

        let stats = CompactStats {
            bytes_before,
            bytes_after: self.log.size()?,
            records,
        };
        info!(
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            records,
            "record log compacted"
        );
        Ok(stats)
    }

    /// Sequence of the latest commit.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.committed.read().sequence
    }

    /// Current log size in bytes.
    pub fn log_size(&self) -> StateResult<u64> {
        self.log.size()
    }

    /// Configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("sequence", &self.sequence())
            .field("dir", &self._dir.as_ref().map(StoreDir::path))
            .finish_non_exhaustive()
    }
}
