//! A single index table.

use crate::error::{StateError, StateResult};
use crate::index::schema::{IndexSchema, TableSchema, ID_INDEX};
use crate::projection::IndexRecord;
use im::{OrdMap, OrdSet};
use std::sync::Arc;

/// Rows keyed by id plus one ordered `(key, id)` set per secondary index.
///
/// Built on persistent maps, so cloning a table for a transaction shares
/// structure with the original.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Arc<TableSchema>,
    rows: OrdMap<String, IndexRecord>,
    secondary: OrdMap<&'static str, OrdSet<(String, String)>>,
}

enum Lookup<'a> {
    Primary,
    Secondary(&'a IndexSchema),
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(schema: Arc<TableSchema>) -> Self {
        let secondary = schema
            .secondary()
            .map(|index| (index.name, OrdSet::new()))
            .collect();
        Self {
            schema,
            rows: OrdMap::new(),
            secondary,
        }
    }

    /// The table declaration.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn constraint(&self, index: &'static str, message: impl Into<String>) -> StateError {
        StateError::IndexConstraint {
            table: self.schema.name,
            index,
            message: message.into(),
        }
    }

    fn primary_name(&self) -> Option<&'static str> {
        self.schema.primary().map(|index| index.name)
    }

    fn lookup(&self, index: &str) -> StateResult<Lookup<'_>> {
        match self.schema.index(index) {
            Some(schema) if Some(schema.name) == self.primary_name() => Ok(Lookup::Primary),
            Some(schema) => Ok(Lookup::Secondary(schema)),
            None => Err(StateError::invalid_operation(format!(
                "unknown index {}.{index}",
                self.schema.name
            ))),
        }
    }

    /// Inserts `record`, replacing the row with the same id.
    ///
    /// Every constraint is checked before anything changes, so a rejected
    /// row leaves the table as it was.
    pub fn insert(&mut self, record: IndexRecord) -> StateResult<()> {
        if record.id.is_empty() {
            let primary = self.primary_name().unwrap_or(ID_INDEX);
            return Err(self.constraint(primary, "missing value for required index"));
        }

        let mut keys = Vec::new();
        for index in self.schema.secondary() {
            match index.key(&record) {
                None if index.allow_missing => {}
                None => {
                    return Err(self.constraint(index.name, "missing value for required index"))
                }
                Some(key) => {
                    if index.unique {
                        let taken = self
                            .matching(index.name, &key)
                            .any(|(_, id)| *id != record.id);
                        if taken {
                            return Err(
                                self.constraint(index.name, format!("duplicate key {key:?}"))
                            );
                        }
                    }
                    keys.push((index.name, key));
                }
            }
        }

        if let Some(old) = self.rows.get(&record.id).cloned() {
            self.unlink(&old);
        }
        for (name, key) in keys {
            if let Some(set) = self.secondary.get_mut(name) {
                set.insert((key, record.id.clone()));
            }
        }
        self.rows.insert(record.id.clone(), record);
        Ok(())
    }

    /// Removes the row with `record.id` and returns it.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] if no such row exists.
    pub fn delete(&mut self, record: &IndexRecord) -> StateResult<IndexRecord> {
        let removed = self
            .rows
            .remove(&record.id)
            .ok_or_else(|| StateError::not_found(self.schema.name, record.id.clone()))?;
        self.unlink(&removed);
        Ok(removed)
    }

    fn unlink(&mut self, row: &IndexRecord) {
        let schema = Arc::clone(&self.schema);
        for index in schema.secondary() {
            if let (Some(key), Some(set)) = (index.key(row), self.secondary.get_mut(index.name)) {
                set.remove(&(key, row.id.clone()));
            }
        }
    }

    /// Drops every row.
    pub fn clear(&mut self) {
        *self = Self::new(Arc::clone(&self.schema));
    }

    fn matching<'a>(
        &'a self,
        index: &'static str,
        key: &'a str,
    ) -> impl Iterator<Item = &'a (String, String)> + 'a {
        self.secondary
            .get(index)
            .into_iter()
            .flat_map(move |set| set.range((key.to_string(), String::new())..))
            .take_while(move |(k, _)| k == key)
    }

    /// First row whose `index` value equals `value`.
    ///
    /// Rows sharing a key come back in id order.
    pub fn first(&self, index: &str, value: &str) -> StateResult<Option<IndexRecord>> {
        Ok(self.get(index, value)?.into_iter().next())
    }

    /// Every row whose `index` value equals `value`.
    pub fn get(&self, index: &str, value: &str) -> StateResult<Vec<IndexRecord>> {
        match self.lookup(index)? {
            Lookup::Primary => Ok(self.rows.get(value).cloned().into_iter().collect()),
            Lookup::Secondary(schema) => {
                let key = schema.normalize(value);
                Ok(self
                    .matching(schema.name, &key)
                    .filter_map(|(_, id)| self.rows.get(id).cloned())
                    .collect())
            }
        }
    }

    /// Every row whose `index` value starts with `prefix`, in key order.
    ///
    /// The empty prefix lists the whole index.
    pub fn prefix(&self, index: &str, prefix: &str) -> StateResult<Vec<IndexRecord>> {
        match self.lookup(index)? {
            Lookup::Primary => Ok(self
                .rows
                .range(prefix.to_string()..)
                .take_while(|(id, _)| id.starts_with(prefix))
                .map(|(_, row)| row.clone())
                .collect()),
            Lookup::Secondary(schema) => {
                let prefix = schema.normalize(prefix);
                Ok(self
                    .secondary
                    .get(schema.name)
                    .into_iter()
                    .flat_map(|set| set.range((prefix.clone(), String::new())..))
                    .take_while(|(key, _)| key.starts_with(&prefix))
                    .filter_map(|(_, id)| self.rows.get(id).cloned())
                    .collect())
            }
        }
    }
}
