//! The list of entity kinds a [`crate::State`] manages.

use crate::durable::DurableRead;
use crate::entity::Entity;
use crate::error::{StateError, StateResult};
use crate::index::{IndexWrite, TableSchema};
use crate::model::{Project, Target};
use std::fmt;

/// Re-projects every record of one bucket into its index table.
///
/// Returns the number of rows written.
pub type RebuildFn = fn(&dyn DurableRead, &mut IndexWrite<'_>) -> StateResult<usize>;

/// Everything the engine needs to know about one entity kind.
#[derive(Clone)]
pub struct EntityKind {
    /// Kind name.
    pub kind: &'static str,
    /// Durable bucket.
    pub bucket: &'static str,
    /// Index table declaration.
    pub schema: TableSchema,
    /// Index rebuild from the bucket.
    pub rebuild: RebuildFn,
}

impl EntityKind {
    /// Describes entity type `E`.
    #[must_use]
    pub fn of<E: Entity>() -> Self {
        Self {
            kind: E::KIND,
            bucket: E::BUCKET,
            schema: E::table_schema(),
            rebuild: rebuild::<E>,
        }
    }
}

impl fmt::Debug for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityKind")
            .field("kind", &self.kind)
            .field("bucket", &self.bucket)
            .field("table", &self.schema.name)
            .finish_non_exhaustive()
    }
}

fn rebuild<E: Entity>(durable: &dyn DurableRead, index: &mut IndexWrite<'_>) -> StateResult<usize> {
    index.clear(E::TABLE)?;
    let mut rows = 0;
    durable.for_each(E::BUCKET, &mut |key, value| {
        let record: E = berth_codec::decode(value)
            .map_err(|e| StateError::decode_failed(E::KIND, key, e))?;
        if record.resource_id().as_bytes() != key {
            return Err(StateError::corruption(format!(
                "{} stored under {:?} carries id {:?}",
                E::KIND,
                String::from_utf8_lossy(key),
                record.resource_id()
            )));
        }
        index.insert(E::TABLE, record.index_record())?;
        rows += 1;
        Ok(())
    })?;
    Ok(rows)
}

/// Entity kinds known to a [`crate::State`], built once at startup.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    kinds: Vec<EntityKind>,
}

impl SchemaRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Projects and targets.
    #[must_use]
    pub fn standard() -> Self {
        Self::new().register::<Project>().register::<Target>()
    }

    /// Adds entity type `E`. A kind that is already registered is kept as is.
    #[must_use]
    pub fn register<E: Entity>(mut self) -> Self {
        if self.get(E::KIND).is_none() {
            self.kinds.push(EntityKind::of::<E>());
        }
        self
    }

    /// Registered kinds in registration order.
    #[must_use]
    pub fn kinds(&self) -> &[EntityKind] {
        &self.kinds
    }

    /// Looks up a kind by name.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&EntityKind> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    /// Checks that a kind of type `E` is registered.
    pub fn require<E: Entity>(&self) -> StateResult<&EntityKind> {
        self.get(E::KIND).ok_or_else(|| {
            StateError::invalid_operation(format!("entity kind {} is not registered", E::KIND))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry() {
        let registry = SchemaRegistry::standard();
        let names: Vec<_> = registry.kinds().iter().map(|k| k.kind).collect();
        assert_eq!(names, ["Project", "Target"]);

        let target = registry.require::<Target>().unwrap();
        assert_eq!(target.bucket, "target");
        assert_eq!(target.schema.name, "target-index");
    }

    #[test]
    fn register_twice_keeps_one() {
        let registry = SchemaRegistry::new()
            .register::<Target>()
            .register::<Target>();
        assert_eq!(registry.kinds().len(), 1);
        assert!(registry.require::<Project>().is_err());
    }
}
