//! Controller owner references.
//!
//! A dependent records exactly one controlling owner. Garbage collection
//! (the platform's, or the cascade walk in `kubegame-state`) deletes the
//! dependent when that owner goes away.

use kube::{Resource, ResourceExt};
use thiserror::Error;

/// Errors raised while linking a dependent to its owner.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OwnerError {
    #[error("owner {kind} {name:?} has not been persisted (missing name or uid)")]
    OwnerNotPersisted { kind: String, name: String },

    #[error("{dependent} is already controlled by {kind} {owner}")]
    AlreadyControlled {
        dependent: String,
        kind: String,
        owner: String,
    },
}

/// Record `owner` as the controller of `dependent`.
///
/// Re-linking the same owner is a no-op. Linking a second, different
/// controller is an error.
pub fn set_controller_owner<O, D>(owner: &O, dependent: &mut D) -> Result<(), OwnerError>
where
    O: Resource<DynamicType = ()>,
    D: Resource,
{
    let mut reference =
        owner
            .controller_owner_ref(&())
            .ok_or_else(|| OwnerError::OwnerNotPersisted {
                kind: O::kind(&()).into_owned(),
                name: owner.name_any(),
            })?;
    reference.block_owner_deletion = Some(true);

    let dependent_name = dependent.name_any();
    let refs = dependent
        .meta_mut()
        .owner_references
        .get_or_insert_with(Vec::new);

    if let Some(other) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != reference.uid)
    {
        return Err(OwnerError::AlreadyControlled {
            dependent: dependent_name,
            kind: other.kind.clone(),
            owner: other.name.clone(),
        });
    }

    refs.retain(|r| r.uid != reference.uid);
    refs.push(reference);
    Ok(())
}

/// Whether `dependent` names `owner` as its controller.
pub fn is_controlled_by<O, D>(dependent: &D, owner: &O) -> bool
where
    O: Resource,
    D: Resource,
{
    let Some(uid) = owner.meta().uid.as_deref() else {
        return false;
    };
    dependent
        .owner_references()
        .iter()
        .any(|r| r.controller == Some(true) && r.uid == uid)
}
