//! Engine configuration.

/// Options for opening a [`crate::State`] or a [`crate::DurableStore`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Create the state directory if it does not exist.
    pub create_if_missing: bool,

    /// `fsync` the record log on every commit instead of only flushing it.
    pub sync_on_commit: bool,

    /// Rewrite the record log down to live records right after opening.
    pub compact_on_open: bool,

    /// Largest encoded record accepted by a put, in bytes.
    pub max_record_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            compact_on_open: false,
            max_record_size: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether a missing state directory is created.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether every commit is synced to stable storage.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether the log is compacted on open.
    #[must_use]
    pub const fn compact_on_open(mut self, value: bool) -> Self {
        self.compact_on_open = value;
        self
    }

    /// Sets the record size limit.
    #[must_use]
    pub const fn max_record_size(mut self, bytes: usize) -> Self {
        self.max_record_size = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert!(!config.compact_on_open);
        assert_eq!(config.max_record_size, 16 * 1024 * 1024);
    }

    #[test]
    fn builder_chain() {
        let config = Config::new()
            .create_if_missing(false)
            .sync_on_commit(false)
            .compact_on_open(true)
            .max_record_size(512);
        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
        assert!(config.compact_on_open);
        assert_eq!(config.max_record_size, 512);
    }
}
