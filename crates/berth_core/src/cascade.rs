//! Parent/child back-reference maintenance.
//!
//! A parent keeps a set of references to its children. Child writes and
//! deletes go through [`Parent::add_child`] and [`Parent::remove_child`],
//! and the parent is re-stored only when they report a change.

use crate::entity::{Entity, Reference};

/// An entity holding back-references to children of kind `C`.
pub trait Parent<C: Entity>: Entity {
    /// Adds `child` unless a reference with its resource id is present.
    ///
    /// Returns `true` if the set changed.
    fn add_child(&mut self, child: &C) -> bool;

    /// Removes the reference with the resource id of `child`.
    ///
    /// Returns `true` if the set changed.
    fn remove_child(&mut self, child: &C::Ref) -> bool;

    /// References to every child, each pointing back at this parent.
    fn children(&self) -> Vec<C::Ref>;

    /// Replaces the back-reference set with the one stored in `stored`, or
    /// empties it when there is no stored record.
    fn inherit_children(&mut self, stored: Option<&Self>);
}

/// An entity that belongs to exactly one parent.
pub trait Child: Entity {
    /// Parent entity kind.
    type Parent: Parent<Self>;

    /// Parent reference carried by a record.
    fn parent_ref(&self) -> Option<&<Self::Parent as Entity>::Ref>;

    /// Parent reference carried by a reference.
    fn parent_of_ref(reference: &Self::Ref) -> Option<&<Self::Parent as Entity>::Ref>;

    /// Resource id of the parent, empty if none is set.
    fn parent_id(&self) -> &str {
        self.parent_ref().map_or("", |parent| parent.resource_id())
    }
}
