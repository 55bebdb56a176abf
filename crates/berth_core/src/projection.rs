//! Index record projection.
//!
//! Records and their references both project to an [`IndexRecord`]. The two
//! projections of one entity must agree on all three fields, because a
//! delete that only carries a reference has to find the row its put made.

/// The lookup row kept for every stored record.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexRecord {
    /// Resource id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Resource id of the parent, empty for top-level entities.
    pub parent_id: String,
}

impl IndexRecord {
    /// Creates an index record.
    pub fn new(id: impl Into<String>, name: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: parent_id.into(),
        }
    }
}

/// Anything that projects to an [`IndexRecord`].
pub trait Indexable {
    /// Builds the index row.
    fn index_record(&self) -> IndexRecord;
}

impl<T: Indexable + ?Sized> From<&T> for IndexRecord {
    fn from(value: &T) -> Self {
        value.index_record()
    }
}

impl Indexable for IndexRecord {
    fn index_record(&self) -> IndexRecord {
        self.clone()
    }
}
