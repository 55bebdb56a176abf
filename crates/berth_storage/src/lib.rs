//! # Berth Storage
//!
//! Byte store backends underneath the Berth record log.
//!
//! A backend is an opaque, append-only sequence of bytes. It knows nothing
//! about buckets, records, or transactions; `berth_core` owns every format
//! decision and only asks a backend to append, read back, flush, cut a torn
//! tail off, or atomically swap in rewritten contents.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - volatile, shareable between handles for restart tests
//! - [`FileBackend`] - a single file on disk
//!
//! ## Example
//!
//! ```rust
//! use berth_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"record").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
