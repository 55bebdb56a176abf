//! The backend trait.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// # Invariants
///
/// - `append` returns the offset the bytes were written at
/// - `read_at` returns exactly what an earlier `append` wrote
/// - after `flush` returns, appended bytes survive process exit;
///   `sync` additionally survives power loss
/// - `truncate` only ever shrinks the store
/// - `replace` is all-or-nothing: readers observe either the old or the
///   new contents, never a mix
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StorageError::ReadPastEnd`] when the range is not
    /// fully written, or with an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads the whole store.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("store of {size} bytes does not fit in memory"),
            )
        })?;
        self.read_at(0, len)
    }

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes appended bytes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata to stable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes, which is also the next append offset.
    fn size(&self) -> StorageResult<u64>;

    /// Cuts the store down to `new_size` bytes.
    ///
    /// Used to drop a partially written batch or a torn tail found on open.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically swaps the whole contents for `data`.
    ///
    /// Used by log compaction.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
