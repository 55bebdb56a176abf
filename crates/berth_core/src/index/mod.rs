//! In-memory index store.
//!
//! One [`Table`] per entity kind, each with a unique id index and
//! non-unique secondary indexes. The tables hold nothing that cannot be
//! rebuilt from the durable store.

mod schema;
mod store;
mod table;

pub use schema::{IndexField, IndexSchema, TableSchema, ID_INDEX, NAME_INDEX, PARENT_INDEX};
pub use store::{IndexRead, IndexReader, IndexStore, IndexWrite};
pub use table::Table;
