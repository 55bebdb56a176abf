//! Crash simulation for the record log.
//!
//! [`CrashableBackend`] wraps an [`InMemoryBackend`] and fails on command.
//! The wrapper goes into a boxed state while the test keeps a
//! [`CrashSwitch`] to trigger the failure, then reopens a fresh state over
//! the shared buffer to see what survived.
//!
//! ```rust,ignore
//! let (backend, switch) = CrashableBackend::new(InMemoryBackend::new());
//! let state = open_crashable(backend);
//! switch.crash_after(10);
//! assert!(state.project_put(Project::new("a", "/a")).is_err());
//! ```

use berth_core::{Config, SchemaRegistry, State};
use berth_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Trigger {
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_appends: AtomicBool,
}

impl Default for Trigger {
    fn default() -> Self {
        Self {
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_appends: AtomicBool::new(false),
        }
    }
}

/// Test-side handle controlling a [`CrashableBackend`].
#[derive(Debug, Clone, Default)]
pub struct CrashSwitch {
    trigger: Arc<Trigger>,
}

impl CrashSwitch {
    /// Crashes once `bytes` more bytes have been appended.
    ///
    /// The append crossing the limit writes only the bytes up to it. After
    /// the crash every write fails, the way a dead process writes nothing.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.trigger.bytes_written.load(Ordering::SeqCst);
        self.trigger
            .crash_after_bytes
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Makes appends fail cleanly, without writing, until reset.
    pub fn fail_appends(&self, fail: bool) {
        self.trigger.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Clears every trigger.
    pub fn reset(&self) {
        self.trigger
            .crash_after_bytes
            .store(usize::MAX, Ordering::SeqCst);
        self.trigger.crashed.store(false, Ordering::SeqCst);
        self.trigger.fail_appends.store(false, Ordering::SeqCst);
    }

    /// Whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.trigger.crashed.load(Ordering::SeqCst)
    }
}

fn simulated(what: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, what.to_string()))
}

/// A storage backend that can fail mid-write.
#[derive(Debug)]
pub struct CrashableBackend {
    inner: InMemoryBackend,
    trigger: Arc<Trigger>,
}

impl CrashableBackend {
    /// Wraps `inner` and returns the switch that controls it.
    pub fn new(inner: InMemoryBackend) -> (Self, CrashSwitch) {
        let switch = CrashSwitch::default();
        let backend = Self {
            inner,
            trigger: Arc::clone(&switch.trigger),
        };
        (backend, switch)
    }

    fn check_alive(&self, what: &str) -> StorageResult<()> {
        if self.trigger.crashed.load(Ordering::SeqCst) {
            return Err(simulated(what));
        }
        Ok(())
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.check_alive("write after simulated crash")?;
        if self.trigger.fail_appends.load(Ordering::SeqCst) {
            return Err(simulated("simulated write failure"));
        }

        let current = self
            .trigger
            .bytes_written
            .fetch_add(bytes.len(), Ordering::SeqCst);
        let threshold = self.trigger.crash_after_bytes.load(Ordering::SeqCst);

        if current.saturating_add(bytes.len()) > threshold {
            self.trigger.crashed.store(true, Ordering::SeqCst);
            let partial_len = threshold.saturating_sub(current);
            if partial_len > 0 {
                let _ = self.inner.append(&bytes[..partial_len]);
            }
            return Err(simulated("simulated crash during write"));
        }

        self.inner.append(bytes)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_alive("flush after simulated crash")?;
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_alive("sync after simulated crash")?;
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_alive("truncate after simulated crash")?;
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.check_alive("replace after simulated crash")?;
        self.inner.replace(data)
    }
}

/// Opens a state with the standard kinds over a crashable backend.
pub fn open_crashable(backend: CrashableBackend) -> State {
    State::open_with_backend(
        Box::new(backend),
        Config::default(),
        SchemaRegistry::standard(),
    )
    .expect("Failed to open state over crashable backend")
}

/// Copies `backend` without its last `bytes` bytes, as a torn final write
/// would leave it.
pub fn tear_tail(backend: &InMemoryBackend, bytes: usize) -> InMemoryBackend {
    let mut data = backend.data();
    let keep = data.len().saturating_sub(bytes);
    data.truncate(keep);
    InMemoryBackend::with_data(data)
}

/// Cuts the last `bytes` bytes off the file at `path`.
pub fn tear_file(path: &Path, bytes: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    file.set_len(len.saturating_sub(bytes))?;
    file.sync_all()
}
