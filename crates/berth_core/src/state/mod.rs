//! The state coordinator.
//!
//! [`State`] pairs the durable store with the index store. Every write runs
//! in one envelope:
//!
//! 1. the index write transaction is opened (taking the index writer lock)
//! 2. the durable write transaction runs the operation, staging records and
//!    index rows side by side
//! 3. the durable transaction commits
//! 4. only then the index transaction commits
//!
//! A failure anywhere before step 4 drops the index transaction, so the
//! index never shows a write the log does not hold. A crash between steps 3
//! and 4 loses nothing: indexes are rebuilt from the log on every open.

mod ops;
mod project;
mod target;

use crate::cascade::Child;
use crate::config::Config;
use crate::durable::{CompactStats, DurableStore, ReadTxn, WriteTxn};
use crate::entity::Entity;
use crate::error::StateResult;
use crate::id::{IdGenerator, UuidGenerator};
use crate::index::{IndexRead, IndexReader, IndexStore, IndexWrite, TableSchema, ID_INDEX};
use crate::projection::IndexRecord;
use crate::registry::SchemaRegistry;
use berth_storage::StorageBackend;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A disagreement between an index table and its durable bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexDrift {
    /// A stored record has no index row.
    Missing {
        /// Index table.
        table: &'static str,
        /// Row the record projects to.
        expected: IndexRecord,
    },
    /// An index row has no stored record.
    Orphan {
        /// Index table.
        table: &'static str,
        /// Row found in the index.
        indexed: IndexRecord,
    },
    /// An index row differs from its record's projection.
    Stale {
        /// Index table.
        table: &'static str,
        /// Row found in the index.
        indexed: IndexRecord,
        /// Row the record projects to.
        expected: IndexRecord,
    },
}

/// The persistent state engine.
///
/// `Send + Sync`; share it behind an `Arc`. Calls block and never retry.
pub struct State {
    durable: DurableStore,
    index: IndexStore,
    registry: SchemaRegistry,
    ids: Arc<dyn IdGenerator>,
}

impl State {
    /// Opens the state directory at `path` with the standard entity kinds.
    pub fn open(path: impl AsRef<Path>, config: Config) -> StateResult<Self> {
        Self::open_with_registry(path, config, SchemaRegistry::standard())
    }

    /// Opens the state directory at `path` with the given entity kinds.
    pub fn open_with_registry(
        path: impl AsRef<Path>,
        config: Config,
        registry: SchemaRegistry,
    ) -> StateResult<Self> {
        let durable = DurableStore::open(path.as_ref(), config)?;
        Self::assemble(durable, registry)
    }

    /// Opens over an arbitrary storage backend.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: Config,
        registry: SchemaRegistry,
    ) -> StateResult<Self> {
        let durable = DurableStore::open_with_backend(backend, config)?;
        Self::assemble(durable, registry)
    }

    /// Opens an empty volatile state with the standard entity kinds.
    pub fn open_in_memory() -> StateResult<Self> {
        let durable = DurableStore::open_in_memory()?;
        Self::assemble(durable, SchemaRegistry::standard())
    }

    fn assemble(durable: DurableStore, registry: SchemaRegistry) -> StateResult<Self> {
        durable.update(|txn| {
            for kind in registry.kinds() {
                if txn.create_bucket(kind.bucket)? {
                    debug!(kind = kind.kind, bucket = kind.bucket, "bucket created");
                }
            }
            Ok(())
        })?;

        let index = IndexStore::new();
        for kind in registry.kinds() {
            index.register(kind.schema.clone())?;
        }

        let state = Self {
            durable,
            index,
            registry,
            ids: Arc::new(UuidGenerator),
        };
        state.rebuild_indexes()?;
        Ok(state)
    }

    /// Replaces the resource id generator.
    #[must_use]
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Rebuilds every index table from its bucket in one index transaction.
    ///
    /// Returns the number of rows indexed. Running it twice in a row leaves
    /// the same index state.
    pub fn rebuild_indexes(&self) -> StateResult<usize> {
        let mut index = self.index.write();
        let durable = self.durable.begin_read();

        let mut total = 0;
        for kind in self.registry.kinds() {
            let rows = (kind.rebuild)(&durable, &mut index).inspect_err(|e| {
                error!(kind = kind.kind, error = %e, "index rebuild failed");
            })?;
            info!(kind = kind.kind, rows, "index rebuilt");
            total += rows;
        }
        index.commit();
        Ok(total)
    }

    /// Compares every index table with a fresh projection of its bucket.
    ///
    /// Holds the index writer lock for the duration, so no write is in
    /// flight while the two stores are compared.
    pub fn verify_indexes(&self) -> StateResult<Vec<IndexDrift>> {
        let live = self.index.write();
        let durable = self.durable.begin_read();

        let scratch = IndexStore::new();
        for kind in self.registry.kinds() {
            scratch.register(kind.schema.clone())?;
        }
        let mut rebuilt = scratch.write();
        for kind in self.registry.kinds() {
            (kind.rebuild)(&durable, &mut rebuilt)?;
        }

        let mut drift = Vec::new();
        for kind in self.registry.kinds() {
            let table = kind.schema.name;
            let primary = primary_index(&kind.schema);
            let mut expected: BTreeMap<String, IndexRecord> = rebuilt
                .prefix(table, primary, "")?
                .into_iter()
                .map(|row| (row.id.clone(), row))
                .collect();

            for indexed in live.prefix(table, primary, "")? {
                match expected.remove(&indexed.id) {
                    None => drift.push(IndexDrift::Orphan { table, indexed }),
                    Some(row) if row != indexed => drift.push(IndexDrift::Stale {
                        table,
                        indexed,
                        expected: row,
                    }),
                    Some(_) => {}
                }
            }
            drift.extend(
                expected
                    .into_values()
                    .map(|expected| IndexDrift::Missing { table, expected }),
            );
        }

        if !drift.is_empty() {
            warn!(rows = drift.len(), "index drift detected");
        }
        rebuilt.abort();
        live.abort();
        Ok(drift)
    }

    /// Rewrites the record log down to live records.
    pub fn compact(&self) -> StateResult<CompactStats> {
        self.durable.compact()
    }

    /// The durable store.
    #[must_use]
    pub fn durable(&self) -> &DurableStore {
        &self.durable
    }

    /// The index store.
    #[must_use]
    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    /// The registered entity kinds.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn write<F, T>(&self, f: F) -> StateResult<T>
    where
        F: FnOnce(&mut WriteTxn, &mut IndexWrite<'_>) -> StateResult<T>,
    {
        let mut index = self.index.write();
        match self.durable.update(|durable| f(durable, &mut index)) {
            Ok(value) => {
                index.commit();
                Ok(value)
            }
            Err(e) => {
                index.abort();
                Err(e)
            }
        }
    }

    fn read<F, T>(&self, f: F) -> StateResult<T>
    where
        F: FnOnce(&ReadTxn, &IndexRead) -> StateResult<T>,
    {
        let index = self.index.read();
        self.durable.view(|durable| f(durable, &index))
    }

    /// Resolves a record of kind `E` by id, falling back to its name.
    ///
    /// Names are matched case-insensitively. When several records share a
    /// name the one with the lowest resource id wins; names are not unique,
    /// so callers that need one specific record should look up by id.
    pub fn find<E: Entity>(&self, id: &str, name: &str) -> StateResult<E> {
        self.read(|durable, index| ops::find_in(durable, index, id, name))
    }

    /// Loads the record of kind `E` stored under `id`. Does not consult the
    /// index.
    pub fn get<E: Entity>(&self, id: &str) -> StateResult<E> {
        self.read(|durable, _| ops::get_in(durable, id))
    }

    /// References to every record of kind `E`, ascending by resource id.
    pub fn list<E: Entity>(&self) -> StateResult<Vec<E::Ref>> {
        ops::list_in::<E>(&self.index.read())
    }

    /// Upserts a child record, assigning an id if it has none, and adds it
    /// to its parent. Returns the record as stored.
    pub fn put_child<C: Child>(&self, record: C) -> StateResult<C> {
        self.write(|durable, index| ops::put_child_in(durable, index, self.ids.as_ref(), record))
    }

    /// Deletes a child record and removes it from its parent.
    pub fn delete_child<C: Child>(&self, reference: &C::Ref) -> StateResult<()> {
        self.write(|durable, index| ops::delete_child_in::<C>(durable, index, reference))
    }
}

fn primary_index(schema: &TableSchema) -> &'static str {
    schema.primary().map_or(ID_INDEX, |index| index.name)
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("durable", &self.durable)
            .field("registry", &self.registry)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::DurableRead;
    use crate::model::{Project, ProjectRef, Target, TargetRef};
    use crate::StateError;
    use berth_storage::InMemoryBackend;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Default)]
    struct Counter(AtomicU64);

    impl IdGenerator for Counter {
        fn generate(&self, kind: &'static str) -> StateResult<String> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{}-{n:03}", kind.to_lowercase()))
        }
    }

    fn state() -> State {
        State::open_in_memory()
            .unwrap()
            .with_id_generator(Counter::default())
    }

    fn project(state: &State) -> Project {
        state.project_put(Project::new("demo", "/work/demo")).unwrap()
    }

    #[test]
    fn put_assigns_ids_and_links_parent() {
        let state = state();
        let p = project(&state);
        assert_eq!(p.resource_id, "project-001");

        let t = state
            .target_put(Target::new("web", p.to_ref()))
            .unwrap();
        assert_eq!(t.resource_id, "target-002");

        let p = state.project_get(&p.to_ref()).unwrap();
        assert_eq!(p.targets.len(), 1);
        assert_eq!(p.targets[0].resource_id, t.resource_id);
        assert!(state.verify_indexes().unwrap().is_empty());
    }

    #[test]
    fn failed_put_leaves_nothing_behind() {
        let state = state();
        let err = state
            .target_put(Target::new("web", ProjectRef::by_id("nope")))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(state.target_list().unwrap().is_empty());
        let stored = state.durable().view(|txn| txn.bucket_len("target")).unwrap();
        assert_eq!(stored, 0);
    }

    #[test]
    fn rebuild_restores_an_emptied_index() {
        let state = state();
        let p = project(&state);
        state.target_put(Target::new("web", p.to_ref())).unwrap();

        let mut index = state.index().write();
        index.clear(Target::TABLE).unwrap();
        index.commit();
        let drift = state.verify_indexes().unwrap();
        assert!(matches!(drift.as_slice(), [IndexDrift::Missing { table: "target-index", .. }]));

        assert_eq!(state.rebuild_indexes().unwrap(), 2);
        assert!(state.verify_indexes().unwrap().is_empty());
    }

    #[test]
    fn verify_reports_orphans_and_stale_rows() {
        let state = state();
        let p = project(&state);
        let t = state.target_put(Target::new("web", p.to_ref())).unwrap();

        let mut index = state.index().write();
        index
            .insert(Target::TABLE, IndexRecord::new("ghost", "ghost", ""))
            .unwrap();
        index
            .insert(Target::TABLE, IndexRecord::new(&t.resource_id, "renamed", &p.resource_id))
            .unwrap();
        index.commit();

        let drift = state.verify_indexes().unwrap();
        assert_eq!(drift.len(), 2);
        assert!(drift.iter().any(|d| matches!(d, IndexDrift::Orphan { .. })));
        assert!(drift.iter().any(|d| matches!(d, IndexDrift::Stale { .. })));
    }

    #[test]
    fn reopen_rebuilds_indexes() {
        let backend = InMemoryBackend::new();
        let target_id = {
            let state = State::open_with_backend(
                Box::new(backend.share()),
                Config::default(),
                SchemaRegistry::standard(),
            )
            .unwrap();
            let p = project(&state);
            state
                .target_put(Target::new("Web", p.to_ref()))
                .unwrap()
                .resource_id
        };

        let state = State::open_with_backend(
            Box::new(backend),
            Config::default(),
            SchemaRegistry::standard(),
        )
        .unwrap();
        let found = state
            .target_find(&Target {
                name: "WEB".into(),
                ..Target::default()
            })
            .unwrap();
        assert_eq!(found.resource_id, target_id);
    }

    #[test]
    fn generator_collision_is_refused() {
        #[derive(Debug)]
        struct Fixed;
        impl IdGenerator for Fixed {
            fn generate(&self, _kind: &'static str) -> StateResult<String> {
                Ok("same".into())
            }
        }

        let state = State::open_in_memory().unwrap().with_id_generator(Fixed);
        state.project_put(Project::new("a", "/a")).unwrap();
        let err = state.project_put(Project::new("b", "/b")).unwrap_err();
        assert!(matches!(err, StateError::IdGeneration { kind: "Project", .. }));
        assert_eq!(state.project_list().unwrap().len(), 1);
    }

    #[test]
    fn delete_with_stale_reference_parent_is_not_found() {
        let state = state();
        let p = project(&state);
        let t = state.target_put(Target::new("web", p.to_ref())).unwrap();

        let err = state
            .target_delete(&TargetRef::new(&t.resource_id, ProjectRef::by_id("other")))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(state.target_get(&t.to_ref()).is_ok());
    }
}
