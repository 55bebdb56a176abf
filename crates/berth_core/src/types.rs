//! Small shared types.

use std::fmt;

/// Commit sequence number of the durable store.
///
/// Every committed write transaction gets the next number; read snapshots
/// report the sequence they were taken at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_and_display() {
        let seq = SequenceNumber::new(41).next();
        assert_eq!(seq.as_u64(), 42);
        assert_eq!(seq.to_string(), "seq:42");
        assert!(SequenceNumber::default() < seq);
    }
}
