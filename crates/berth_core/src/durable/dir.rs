//! State directory layout and locking.
//!
//! ```text
//! <state_path>/
//! ├─ LOCK          # advisory lock, held while the store is open
//! └─ records.log   # record log
//! ```

use crate::error::{StateError, StateResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "records.log";

/// An opened state directory.
///
/// Holds an exclusive lock on `LOCK` for as long as it lives, so a second
/// process opening the same directory fails with
/// [`StateError::DatabaseLocked`].
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens the directory at `path`, creating it when allowed.
    ///
    /// # Errors
    ///
    /// - the directory is missing and `create_if_missing` is false
    /// - `path` exists but is not a directory
    /// - another process holds the lock
    pub fn open(path: &Path, create_if_missing: bool) -> StateResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(StateError::invalid_operation(format!(
                    "state directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(StateError::invalid_operation(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StateError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Directory root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the record log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directory() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state");
        let dir = StoreDir::open(&path, true).unwrap();
        assert!(path.join(LOCK_FILE).exists());
        assert_eq!(dir.log_path(), path.join("records.log"));
    }

    #[test]
    fn refuses_missing_directory_without_create() {
        let tmp = tempdir().unwrap();
        let err = StoreDir::open(&tmp.path().join("absent"), false).unwrap_err();
        assert!(matches!(err, StateError::InvalidOperation { .. }));
    }

    #[test]
    fn second_open_is_locked_out() {
        let tmp = tempdir().unwrap();
        let _first = StoreDir::open(tmp.path(), true).unwrap();
        let second = StoreDir::open(tmp.path(), true);
        assert!(matches!(second, Err(StateError::DatabaseLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let tmp = tempdir().unwrap();
        drop(StoreDir::open(tmp.path(), true).unwrap());
        assert!(StoreDir::open(tmp.path(), true).is_ok());
    }
}
