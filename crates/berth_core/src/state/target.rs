//! Target operations.

use super::State;
use crate::error::StateResult;
use crate::model::{Target, TargetRef};

impl State {
    /// Resolves a target by `partial.resource_id`, or by `partial.name`
    /// when the id is empty or unknown.
    pub fn target_find(&self, partial: &Target) -> StateResult<Target> {
        self.find(&partial.resource_id, &partial.name)
    }

    /// Loads the target `reference` points at.
    pub fn target_get(&self, reference: &TargetRef) -> StateResult<Target> {
        self.get(&reference.resource_id)
    }

    /// Stores a target and lists it in its project.
    ///
    /// The project must exist. A target without a resource id gets one.
    /// Returns the target as stored.
    pub fn target_put(&self, target: Target) -> StateResult<Target> {
        self.put_child(target)
    }

    /// Deletes a target and removes it from the project named by the
    /// reference.
    ///
    /// That project must exist. If the stored target belongs to another
    /// project, it is removed from that project's list too.
    pub fn target_delete(&self, reference: &TargetRef) -> StateResult<()> {
        self.delete_child::<Target>(reference)
    }

    /// References to every target, ascending by resource id.
    pub fn target_list(&self) -> StateResult<Vec<TargetRef>> {
        self.list::<Target>()
    }
}
