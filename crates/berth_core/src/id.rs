//! Resource id assignment.

use crate::error::StateResult;
use std::fmt::Debug;
use uuid::Uuid;

/// Source of fresh resource ids.
///
/// Ids must be unique across the lifetime of a state directory; the engine
/// rejects an empty id or one already stored in the bucket.
pub trait IdGenerator: Send + Sync + Debug {
    /// Returns a new id for an entity of `kind`.
    fn generate(&self, kind: &'static str) -> StateResult<String>;
}

/// Random v4 UUIDs in their 32-digit hex form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self, _kind: &'static str) -> StateResult<String> {
        Ok(Uuid::new_v4().simple().to_string())
    }
}
