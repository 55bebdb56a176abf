//! Entity and reference traits.

use crate::index::TableSchema;
use crate::projection::{IndexRecord, Indexable};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A lightweight pointer to a stored entity.
pub trait Reference: Indexable + Clone + Debug + Send + Sync {
    /// Resource id, empty when the reference only names the entity.
    fn resource_id(&self) -> &str;

    /// Human-readable name, possibly empty.
    fn name(&self) -> &str;
}

/// A record kind stored in its own bucket and indexed in its own table.
pub trait Entity:
    Indexable + Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
    /// Kind name used in errors and logs.
    const KIND: &'static str;
    /// Durable bucket holding the records.
    const BUCKET: &'static str;
    /// Index table holding the rows.
    const TABLE: &'static str;

    /// Reference type pointing at this entity.
    type Ref: Reference;

    /// Resource id, empty before the first put.
    fn resource_id(&self) -> &str;

    /// Sets the resource id. Only called on records that have none.
    fn set_resource_id(&mut self, id: String);

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Reference to this record.
    fn to_ref(&self) -> Self::Ref;

    /// Reference rebuilt from an index row, as returned by listings.
    fn ref_from_index(row: &IndexRecord) -> Self::Ref;

    /// Index table declaration.
    fn table_schema() -> TableSchema {
        TableSchema::entity(Self::TABLE)
    }
}
