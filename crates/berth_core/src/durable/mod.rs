//! Durable record store.
//!
//! Named buckets of `key -> bytes`, persisted as a checksummed record log.
//! All access goes through closure-scoped transactions:
//!
//! ```rust,ignore
//! store.update(|txn| {
//!     txn.create_bucket("target")?;
//!     txn.put("target", b"tgt-1", bytes)
//! })?;
//! let n = store.view(|txn| txn.bucket_len("target"))?;
//! ```

mod dir;
mod log;
mod record;
mod store;

pub use dir::StoreDir;
pub use log::{RecordLog, Replay};
pub use record::{compute_crc32, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
pub use store::{CompactStats, DurableRead, DurableStore, ReadTxn, WriteTxn};
