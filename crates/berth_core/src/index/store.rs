//! Snapshot-isolated index store.

use crate::error::{StateError, StateResult};
use crate::index::schema::TableSchema;
use crate::index::table::Table;
use crate::projection::IndexRecord;
use im::OrdMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default)]
struct IndexState {
    tables: OrdMap<&'static str, Table>,
}

impl IndexState {
    fn table(&self, name: &str) -> StateResult<&Table> {
        self.tables.get(name).ok_or_else(|| unknown_table(name))
    }

    fn table_mut(&mut self, name: &str) -> StateResult<&mut Table> {
        self.tables.get_mut(name).ok_or_else(|| unknown_table(name))
    }
}

fn unknown_table(name: &str) -> StateError {
    StateError::invalid_operation(format!("index table not registered: {name}"))
}

/// Lookups shared by read and write transactions.
pub trait IndexReader {
    /// Returns a registered table.
    fn table(&self, name: &str) -> StateResult<&Table>;

    /// First row of `table` whose `index` value equals `value`.
    fn first(&self, table: &str, index: &str, value: &str) -> StateResult<Option<IndexRecord>> {
        self.table(table)?.first(index, value)
    }

    /// Every row of `table` whose `index` value equals `value`.
    fn get(&self, table: &str, index: &str, value: &str) -> StateResult<Vec<IndexRecord>> {
        self.table(table)?.get(index, value)
    }

    /// Every row of `table` whose `index` value starts with `prefix`.
    fn prefix(&self, table: &str, index: &str, prefix: &str) -> StateResult<Vec<IndexRecord>> {
        self.table(table)?.prefix(index, prefix)
    }

    /// Number of rows in `table`.
    fn len(&self, table: &str) -> StateResult<usize> {
        Ok(self.table(table)?.len())
    }
}

/// In-memory index tables.
///
/// Readers take an immutable snapshot. A single writer works on a private
/// copy that replaces the snapshot on commit; dropping it uncommitted
/// discards every change.
#[derive(Debug, Default)]
pub struct IndexStore {
    state: RwLock<Arc<IndexState>>,
    writer: Mutex<()>,
}

impl IndexStore {
    /// Creates a store with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table. Returns `false` if one with the same name exists.
    pub fn register(&self, schema: TableSchema) -> StateResult<bool> {
        schema.validate()?;
        let mut txn = self.write();
        if txn.working.tables.contains_key(schema.name) {
            return Ok(false);
        }
        debug!(table = schema.name, indexes = schema.indexes.len(), "index table registered");
        txn.working
            .tables
            .insert(schema.name, Table::new(Arc::new(schema)));
        txn.commit();
        Ok(true)
    }

    /// Names of the registered tables.
    #[must_use]
    pub fn tables(&self) -> Vec<&'static str> {
        self.state.read().tables.keys().copied().collect()
    }

    /// Takes a read snapshot.
    #[must_use]
    pub fn read(&self) -> IndexRead {
        IndexRead {
            state: Arc::clone(&self.state.read()),
        }
    }

    /// Starts the write transaction, waiting for any other writer to finish.
    pub fn write(&self) -> IndexWrite<'_> {
        let guard = self.writer.lock();
        let working = (**self.state.read()).clone();
        IndexWrite {
            store: self,
            working,
            mutations: 0,
            _guard: guard,
        }
    }
}

/// A read snapshot of every table.
#[derive(Debug, Clone)]
pub struct IndexRead {
    state: Arc<IndexState>,
}

impl IndexReader for IndexRead {
    fn table(&self, name: &str) -> StateResult<&Table> {
        self.state.table(name)
    }
}

/// The write transaction of an [`IndexStore`].
///
/// Holds the writer lock until committed, aborted or dropped.
pub struct IndexWrite<'a> {
    store: &'a IndexStore,
    working: IndexState,
    mutations: usize,
    _guard: MutexGuard<'a, ()>,
}

impl IndexReader for IndexWrite<'_> {
    fn table(&self, name: &str) -> StateResult<&Table> {
        self.working.table(name)
    }
}

impl IndexWrite<'_> {
    /// Inserts or replaces a row.
    pub fn insert(&mut self, table: &str, record: IndexRecord) -> StateResult<()> {
        trace!(table, id = %record.id, "index insert");
        self.working.table_mut(table)?.insert(record)?;
        self.mutations += 1;
        Ok(())
    }

    /// Deletes the row with `record.id` and returns what was stored.
    pub fn delete(&mut self, table: &str, record: &IndexRecord) -> StateResult<IndexRecord> {
        trace!(table, id = %record.id, "index delete");
        let removed = self.working.table_mut(table)?.delete(record)?;
        self.mutations += 1;
        Ok(removed)
    }

    /// Drops every row of `table`.
    pub fn clear(&mut self, table: &str) -> StateResult<()> {
        self.working.table_mut(table)?.clear();
        self.mutations += 1;
        Ok(())
    }

    /// Changes staged so far.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    /// Publishes the staged tables.
    pub fn commit(self) {
        let Self {
            store,
            working,
            mutations,
            _guard,
        } = self;
        *store.state.write() = Arc::new(working);
        trace!(mutations, "index transaction committed");
    }

    /// Discards the staged tables.
    pub fn abort(self) {
        if self.mutations > 0 {
            debug!(mutations = self.mutations, "index transaction aborted");
        }
    }
}

impl std::fmt::Debug for IndexWrite<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWrite")
            .field("mutations", &self.mutations)
            .finish_non_exhaustive()
    }
}
