//! Project operations.

use super::{ops, State};
use crate::error::StateResult;
use crate::model::{Project, ProjectRef, Target};

impl State {
    /// Resolves a project by `partial.resource_id`, or by `partial.name`
    /// when the id is empty or unknown.
    pub fn project_find(&self, partial: &Project) -> StateResult<Project> {
        self.find(&partial.resource_id, &partial.name)
    }

    /// Loads the project `reference` points at.
    pub fn project_get(&self, reference: &ProjectRef) -> StateResult<Project> {
        self.get(&reference.resource_id)
    }

    /// Stores a project, assigning a resource id if it has none.
    ///
    /// The target list is owned by target puts and deletes: an existing
    /// project keeps its stored list and a new one starts empty, whatever
    /// `project.targets` holds.
    pub fn project_put(&self, project: Project) -> StateResult<Project> {
        self.write(|durable, index| {
            ops::put_parent_in::<Project, Target>(durable, index, self.ids.as_ref(), project)
        })
    }

    /// Deletes a project together with every target it lists.
    pub fn project_delete(&self, reference: &ProjectRef) -> StateResult<()> {
        self.write(|durable, index| {
            ops::delete_parent_in::<Project, Target>(durable, index, reference)
        })
    }

    /// References to every project, ascending by resource id.
    pub fn project_list(&self) -> StateResult<Vec<ProjectRef>> {
        self.list::<Project>()
    }
}
