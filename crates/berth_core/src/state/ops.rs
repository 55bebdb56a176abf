//! Entity operations shared by every kind, run inside the caller's
//! transactions.

use crate::cascade::{Child, Parent};
use crate::durable::{DurableRead, WriteTxn};
use crate::entity::{Entity, Reference};
use crate::error::{StateError, StateResult};
use crate::id::IdGenerator;
use crate::index::{IndexReader, IndexWrite, ID_INDEX, NAME_INDEX};
use crate::projection::Indexable;
use tracing::{debug, error, trace, warn};

/// Loads the record stored under `id`.
pub(crate) fn get_in<E: Entity>(durable: &(impl DurableRead + ?Sized), id: &str) -> StateResult<E> {
    if id.is_empty() {
        return Err(StateError::not_found(E::KIND, id));
    }
    let bytes = durable
        .get(E::BUCKET, id.as_bytes())?
        .ok_or_else(|| StateError::not_found(E::KIND, id))?;
    berth_codec::decode(bytes).map_err(|e| StateError::decode_failed(E::KIND, id.as_bytes(), e))
}

/// Like [`get_in`], with a missing record as `None`.
pub(crate) fn try_get_in<E: Entity>(
    durable: &(impl DurableRead + ?Sized),
    id: &str,
) -> StateResult<Option<E>> {
    match get_in(durable, id) {
        Ok(record) => Ok(Some(record)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Resolves by exact id, then by case-insensitive name.
pub(crate) fn find_in<E: Entity>(
    durable: &(impl DurableRead + ?Sized),
    index: &(impl IndexReader + ?Sized),
    id: &str,
    name: &str,
) -> StateResult<E> {
    let mut row = None;
    if !id.is_empty() {
        row = index.first(E::TABLE, ID_INDEX, id)?;
    }
    if row.is_none() && !name.is_empty() {
        row = index.first(E::TABLE, NAME_INDEX, name)?;
    }
    match row {
        Some(row) => get_in(durable, &row.id),
        None => Err(StateError::not_found(
            E::KIND,
            if id.is_empty() { name } else { id },
        )),
    }
}

/// Every indexed record of kind `E` as a reference, ascending by id.
pub(crate) fn list_in<E: Entity>(index: &(impl IndexReader + ?Sized)) -> StateResult<Vec<E::Ref>> {
    Ok(index
        .prefix(E::TABLE, ID_INDEX, "")?
        .iter()
        .map(E::ref_from_index)
        .collect())
}

/// Gives `record` a fresh resource id if it has none.
pub(crate) fn assign_id<E: Entity>(
    durable: &WriteTxn,
    ids: &dyn IdGenerator,
    record: &mut E,
) -> StateResult<()> {
    if !record.resource_id().is_empty() {
        return Ok(());
    }
    trace!(kind = E::KIND, name = record.name(), "no resource id, assuming new record");

    let id = ids.generate(E::KIND).inspect_err(|e| {
        error!(kind = E::KIND, error = %e, "failed to create resource id");
    })?;
    if id.is_empty() {
        return Err(StateError::IdGeneration {
            kind: E::KIND,
            message: "generator returned an empty id".into(),
        });
    }
    if durable.get(E::BUCKET, id.as_bytes())?.is_some() {
        return Err(StateError::IdGeneration {
            kind: E::KIND,
            message: format!("generated id {id:?} is already in use"),
        });
    }
    record.set_resource_id(id);
    Ok(())
}

/// Stores `record` and indexes it. No cascade.
pub(crate) fn put_in<E: Entity>(
    durable: &mut WriteTxn,
    index: &mut IndexWrite<'_>,
    record: &E,
) -> StateResult<()> {
    let id = record.resource_id();
    let bytes = berth_codec::encode(record)
        .map_err(|e| StateError::encode_failed(E::KIND, id.as_bytes(), e))?;

    trace!(kind = E::KIND, resource_id = id, "storing record");
    durable.put(E::BUCKET, id.as_bytes(), bytes).inspect_err(|e| {
        error!(kind = E::KIND, resource_id = id, error = %e, "failed to store record");
    })?;

    trace!(kind = E::KIND, resource_id = id, "indexing record");
    index
        .insert(E::TABLE, record.index_record())
        .inspect_err(|e| {
            error!(kind = E::KIND, resource_id = id, error = %e, "failed to index record");
        })
}

/// Removes the record and index row of `reference`. No cascade.
pub(crate) fn delete_in<E: Entity>(
    durable: &mut WriteTxn,
    index: &mut IndexWrite<'_>,
    reference: &E::Ref,
) -> StateResult<()> {
    let id = reference.resource_id();
    if id.is_empty() || !durable.delete(E::BUCKET, id.as_bytes())? {
        return Err(StateError::not_found(E::KIND, id));
    }
    index.delete(E::TABLE, &reference.index_record())?;
    trace!(kind = E::KIND, resource_id = id, "record deleted");
    Ok(())
}

/// Upserts a child record and adds it to its parent.
///
/// The parent is loaded before anything is written, so a missing parent
/// leaves no trace. A child that moved from another parent is detached from
/// the old one.
pub(crate) fn put_child_in<C: Child>(
    durable: &mut WriteTxn,
    index: &mut IndexWrite<'_>,
    ids: &dyn IdGenerator,
    mut record: C,
) -> StateResult<C> {
    let parent_id = record.parent_id().to_string();
    let mut parent: C::Parent = get_in(&*durable, &parent_id).inspect_err(|e| {
        error!(
            kind = C::KIND,
            name = record.name(),
            parent = %parent_id,
            error = %e,
            "failed to locate parent"
        );
    })?;

    assign_id(durable, ids, &mut record)?;

    if let Some(previous) = try_get_in::<C>(&*durable, record.resource_id())? {
        let previous_parent = previous.parent_id();
        if !previous_parent.is_empty() && previous_parent != parent_id {
            detach_in::<C>(durable, index, previous_parent, &previous.to_ref())?;
        }
    }

    put_in(durable, index, &record)?;

    if parent.add_child(&record) {
        debug!(
            kind = C::KIND,
            resource_id = record.resource_id(),
            parent = %parent_id,
            "child added, updating parent"
        );
        put_in(durable, index, &parent)?;
    } else {
        trace!(
            kind = C::KIND,
            resource_id = record.resource_id(),
            parent = %parent_id,
            "child already listed by parent"
        );
    }
    Ok(record)
}

fn detach_in<C: Child>(
    durable: &mut WriteTxn,
    index: &mut IndexWrite<'_>,
    parent_id: &str,
    child: &C::Ref,
) -> StateResult<()> {
    let Some(mut parent) = try_get_in::<C::Parent>(&*durable, parent_id)? else {
        warn!(
            kind = C::KIND,
            resource_id = child.resource_id(),
            parent = parent_id,
            "previous parent is gone, nothing to detach"
        );
        return Ok(());
    };
    if parent.remove_child(child) {
        debug!(
            kind = C::KIND,
            resource_id = child.resource_id(),
            parent = parent_id,
            "detaching child from previous parent"
        );
        put_in(durable, index, &parent)?;
    }
    Ok(())
}

/// Deletes a child record and removes it from its parent.
///
/// The parent named by the reference must exist. When the stored record
/// names a different parent, that one is detached as well, so no parent
/// keeps listing a deleted child.
pub(crate) fn delete_child_in<C: Child>(
    durable: &mut WriteTxn,
    index: &mut IndexWrite<'_>,
    reference: &C::Ref,
) -> StateResult<()> {
    let parent_id = C::parent_of_ref(reference).map_or("", |p| p.resource_id());
    let mut parent: C::Parent = get_in(&*durable, parent_id).inspect_err(|e| {
        debug!(
            kind = C::KIND,
            resource_id = reference.resource_id(),
            parent = parent_id,
            error = %e,
            "failed to locate parent"
        );
    })?;
    let stored: C = get_in(&*durable, reference.resource_id())?;

    delete_in::<C>(durable, index, reference)?;

    if parent.remove_child(reference) {
        debug!(
            kind = C::KIND,
            resource_id = reference.resource_id(),
            parent = parent_id,
            "child removed, updating parent"
        );
        put_in(durable, index, &parent)?;
    }

    let owner = stored.parent_id();
    if !owner.is_empty() && owner != parent_id {
        warn!(
            kind = C::KIND,
            resource_id = reference.resource_id(),
            parent = parent_id,
            owner,
            "reference names another parent than the stored record"
        );
        detach_in::<C>(durable, index, owner, reference)?;
    }
    Ok(())
}

/// Upserts a parent record. Its back-references are kept as stored.
pub(crate) fn put_parent_in<P, C>(
    durable: &mut WriteTxn,
    index: &mut IndexWrite<'_>,
    ids: &dyn IdGenerator,
    mut record: P,
) -> StateResult<P>
where
    P: Parent<C>,
    C: Child<Parent = P>,
{
    assign_id(durable, ids, &mut record)?;
    let stored = try_get_in::<P>(&*durable, record.resource_id())?;
    record.inherit_children(stored.as_ref());
    put_in(durable, index, &record)?;
    Ok(record)
}

/// Deletes a parent after deleting every child it lists.
///
/// Listed children that are gone, or that now name another parent, are
/// skipped and left alone.
pub(crate) fn delete_parent_in<P, C>(
    durable: &mut WriteTxn,
    index: &mut IndexWrite<'_>,
    reference: &P::Ref,
) -> StateResult<()>
where
    P: Parent<C>,
    C: Child<Parent = P>,
{
    let parent: P = get_in(&*durable, reference.resource_id())?;
    for child in parent.children() {
        match try_get_in::<C>(&*durable, child.resource_id())? {
            None => warn!(
                kind = C::KIND,
                resource_id = child.resource_id(),
                parent = reference.resource_id(),
                "listed child is missing, skipping"
            ),
            Some(stored) if stored.parent_id() != reference.resource_id() => warn!(
                kind = C::KIND,
                resource_id = child.resource_id(),
                parent = reference.resource_id(),
                owner = stored.parent_id(),
                "listed child belongs to another parent, skipping"
            ),
            Some(_) => delete_child_in::<C>(durable, index, &child)?,
        }
    }
    delete_in::<P>(durable, index, reference)
}
