//! Table and index declarations.

use crate::error::{StateError, StateResult};
use crate::projection::IndexRecord;

/// Name of the unique identifier index.
pub const ID_INDEX: &str = "id";
/// Name of the case-insensitive name index.
pub const NAME_INDEX: &str = "name";
/// Name of the parent id index.
pub const PARENT_INDEX: &str = "parent";

/// Field of an [`IndexRecord`] an index is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexField {
    /// `IndexRecord::id`
    Id,
    /// `IndexRecord::name`
    Name,
    /// `IndexRecord::parent_id`
    ParentId,
}

impl IndexField {
    /// Reads the field.
    #[must_use]
    pub fn extract(self, record: &IndexRecord) -> &str {
        match self {
            Self::Id => &record.id,
            Self::Name => &record.name,
            Self::ParentId => &record.parent_id,
        }
    }
}

/// One index of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Index name used in lookups.
    pub name: &'static str,
    /// Field the index covers.
    pub field: IndexField,
    /// At most one row per key.
    pub unique: bool,
    /// Rows with an empty value are left out instead of rejected.
    pub allow_missing: bool,
    /// Keys and lookup values are case-folded.
    pub lowercase: bool,
}

impl IndexSchema {
    /// A non-unique, case-sensitive index that requires a value.
    #[must_use]
    pub const fn new(name: &'static str, field: IndexField) -> Self {
        Self {
            name,
            field,
            unique: false,
            allow_missing: false,
            lowercase: false,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Lets rows without a value skip the index.
    #[must_use]
    pub const fn allow_missing(mut self) -> Self {
        self.allow_missing = true;
        self
    }

    /// Makes keys case-insensitive.
    #[must_use]
    pub const fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    /// Normalizes a lookup value the way keys are stored.
    #[must_use]
    pub fn normalize(&self, value: &str) -> String {
        if self.lowercase {
            value.to_lowercase()
        } else {
            value.to_string()
        }
    }

    /// Key of `record` in this index, `None` when the field is empty.
    #[must_use]
    pub fn key(&self, record: &IndexRecord) -> Option<String> {
        let raw = self.field.extract(record);
        (!raw.is_empty()).then(|| self.normalize(raw))
    }
}

/// Declaration of one index table.
///
/// The first index is the primary one: unique, case-sensitive, over
/// [`IndexField::Id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: &'static str,
    /// Indexes, primary first.
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    /// The standard entity table: unique `id`, case-insensitive `name`, and
    /// an optional `parent`.
    #[must_use]
    pub fn entity(name: &'static str) -> Self {
        Self {
            name,
            indexes: vec![
                IndexSchema::new(ID_INDEX, IndexField::Id).unique(),
                IndexSchema::new(NAME_INDEX, IndexField::Name).lowercase(),
                IndexSchema::new(PARENT_INDEX, IndexField::ParentId).allow_missing(),
            ],
        }
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// The primary index.
    #[must_use]
    pub fn primary(&self) -> Option<&IndexSchema> {
        self.indexes.first()
    }

    /// Indexes other than the primary one.
    pub fn secondary(&self) -> impl Iterator<Item = &IndexSchema> {
        self.indexes.iter().skip(1)
    }

    /// Checks the declaration is usable.
    pub fn validate(&self) -> StateResult<()> {
        let primary = self.primary().ok_or_else(|| {
            StateError::invalid_operation(format!("table {} declares no indexes", self.name))
        })?;
        if primary.field != IndexField::Id || !primary.unique || primary.lowercase {
            return Err(StateError::invalid_operation(format!(
                "table {}: first index must be a unique, case-sensitive id index",
                self.name
            )));
        }
        for (i, index) in self.indexes.iter().enumerate() {
            if self.indexes[..i].iter().any(|other| other.name == index.name) {
                return Err(StateError::invalid_operation(format!(
                    "table {}: duplicate index {}",
                    self.name, index.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_schema_shape() {
        let schema = TableSchema::entity("target-index");
        schema.validate().unwrap();
        assert_eq!(schema.primary().unwrap().name, ID_INDEX);

        let name = schema.index(NAME_INDEX).unwrap();
        assert!(name.lowercase && !name.unique && !name.allow_missing);
        let parent = schema.index(PARENT_INDEX).unwrap();
        assert!(parent.allow_missing);
        assert!(schema.index("label").is_none());
    }

    #[test]
    fn keys_are_normalized() {
        let schema = TableSchema::entity("target-index");
        let record = IndexRecord::new("Tgt-1", "Web-Server", "");
        assert_eq!(schema.index(ID_INDEX).unwrap().key(&record).unwrap(), "Tgt-1");
        assert_eq!(
            schema.index(NAME_INDEX).unwrap().key(&record).unwrap(),
            "web-server"
        );
        assert_eq!(schema.index(PARENT_INDEX).unwrap().key(&record), None);
    }

    #[test]
    fn bad_primary_is_rejected() {
        let schema = TableSchema {
            name: "broken",
            indexes: vec![IndexSchema::new(NAME_INDEX, IndexField::Name)],
        };
        assert!(schema.validate().is_err());

        let dup = TableSchema {
            name: "dup",
            indexes: vec![
                IndexSchema::new(ID_INDEX, IndexField::Id).unique(),
                IndexSchema::new(ID_INDEX, IndexField::Name),
            ],
        };
        assert!(dup.validate().is_err());
    }
}
