//! # Berth Core
//!
//! Persistent state engine for an orchestration server.
//!
//! This crate provides:
//! - a durable record store: named buckets in a checksummed record log
//! - an in-memory index store with snapshot-isolated transactions
//! - the [`State`] coordinator, which writes both stores in one envelope and
//!   keeps parent back-references in step with child writes
//!
//! The index holds nothing of its own. [`State`] rebuilds it from the
//! durable store every time it opens.
//!
//! ## Example
//!
//! ```rust
//! use berth_core::{Entity, Project, State, Target};
//!
//! let state = State::open_in_memory().unwrap();
//! let project = state.project_put(Project::new("demo", "/work/demo")).unwrap();
//! let web = state.target_put(Target::new("web", project.to_ref())).unwrap();
//!
//! let project = state.project_get(&project.to_ref()).unwrap();
//! assert_eq!(project.targets[0].resource_id, web.resource_id);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cascade;
mod config;
pub mod durable;
pub mod entity;
mod error;
mod id;
pub mod index;
mod model;
pub mod projection;
pub mod registry;
mod state;
mod types;

pub use cascade::{Child, Parent};
pub use config::Config;
pub use durable::{CompactStats, DurableRead, DurableStore};
pub use entity::{Entity, Reference};
pub use error::{ErrorKind, StateError, StateResult};
pub use id::{IdGenerator, UuidGenerator};
pub use index::{IndexStore, TableSchema};
pub use model::{Project, ProjectRef, Target, TargetRef, TargetState};
pub use projection::{IndexRecord, Indexable};
pub use registry::{EntityKind, SchemaRegistry};
pub use state::{IndexDrift, State};
pub use types::SequenceNumber;
