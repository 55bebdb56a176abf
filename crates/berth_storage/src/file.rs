//! File backed storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A backend stored in one file.
///
/// `flush` hands data to the OS, `sync` calls `sync_all`. `replace` writes a
/// sibling file with a `.compact` suffix, syncs it, and renames it over the
/// original so a crash leaves either the old or the new log in place.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens the file at `path`, creating it when missing.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = Self::open_file(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { file, size }),
        })
    }

    /// Like [`FileBackend::open`], creating parent directories first.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(path: &Path) -> StorageResult<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".compact");
        PathBuf::from(name)
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        let size = inner.size;
        if offset > size || offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        let mut buf = vec![0u8; len];
        if len > 0 {
            inner.file.seek(SeekFrom::Start(offset))?;
            inner.file.read_exact(&mut buf)?;
        }
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        let offset = inner.size;
        if data.is_empty() {
            return Ok(offset);
        }
        inner.file.seek(SeekFrom::End(0))?;
        inner.file.write_all(data)?;
        inner.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.lock().file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if new_size > inner.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: inner.size,
            });
        }
        inner.file.set_len(new_size)?;
        inner.file.sync_all()?;
        inner.size = new_size;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let staging = self.staging_path();
        {
            let mut tmp = File::create(&staging)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }
        let mut inner = self.inner.lock();
        fs::rename(&staging, &self.path)?;
        inner.file = Self::open_file(&self.path)?;
        inner.size = data.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn appended_bytes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");
        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"first ").unwrap();
            backend.append(b"second").unwrap();
            backend.sync().unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"first second");
        assert_eq!(backend.read_at(6, 6).unwrap(), b"second");
    }

    #[test]
    fn read_past_end_is_rejected() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("records.log")).unwrap();
        backend.append(b"abc").unwrap();
        assert!(matches!(
            backend.read_at(1, 9),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn nested_directories_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("data").join("records.log");
        FileBackend::open_with_create_dirs(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn truncate_then_append_continues_at_new_end() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("records.log")).unwrap();
        backend.append(b"keep-drop").unwrap();
        backend.truncate(4).unwrap();
        assert_eq!(backend.append(b"!").unwrap(), 4);
        assert_eq!(backend.read_all().unwrap(), b"keep!");
    }

    #[test]
    fn replace_renames_staging_file_over_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"a long history of records").unwrap();
        backend.replace(b"compacted").unwrap();

        assert_eq!(backend.read_all().unwrap(), b"compacted");
        assert!(!dir.path().join("records.log.compact").exists());
        assert_eq!(backend.append(b"+").unwrap(), 9);

        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.read_all().unwrap(), b"compacted+");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn file_and_memory_backends_agree(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..8),
            cut in 0u64..64,
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("records.log");
            let mut file = FileBackend::open(&path).unwrap();
            let mut memory = InMemoryBackend::new();

            let mut expected = Vec::new();
            for chunk in &chunks {
                let offset = expected.len() as u64;
                prop_assert_eq!(file.append(chunk).unwrap(), offset);
                prop_assert_eq!(memory.append(chunk).unwrap(), offset);
                expected.extend_from_slice(chunk);
            }
            prop_assert_eq!(file.read_all().unwrap(), expected.clone());
            prop_assert_eq!(memory.read_all().unwrap(), expected.clone());

            let keep = (expected.len() as u64).saturating_sub(cut);
            file.truncate(keep).unwrap();
            memory.truncate(keep).unwrap();
            expected.truncate(keep as usize);
            prop_assert_eq!(file.size().unwrap(), keep);
            prop_assert_eq!(memory.read_all().unwrap(), expected.clone());

            drop(file);
            let reopened = FileBackend::open(&path).unwrap();
            prop_assert_eq!(reopened.read_all().unwrap(), expected);
        }
    }
}
