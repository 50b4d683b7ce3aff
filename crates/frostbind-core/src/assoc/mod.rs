//! Module: assoc
//! Responsibility: association wrappers — lazily-materialized relation
//! fields that stay synchronized between the validated in-memory payload
//! and the persisted relation slot.
//! Does not own: strategy selection (see `strategy`) or instance
//! deduplication (see `context`).
//!
//! Invariants:
//! - `loaded` transitions to true at most once per load cycle; reads never
//!   re-trigger materialization until `invalidate` runs.
//! - Every failed load leaves `loaded == false` so a corrected retry works.
//! - Wrappers hold only a weak back-reference to their owner's binding
//!   cell, never ownership.

mod many;
mod single;


pub use many::Many;
pub use single::Single;

use crate::{
    bind::Provided,
    materialize::MaterializeError,
    model::{RelationModel, RelationShape},
    row::{RelationSlot, RowRef},
    store::StoreError,
    strategy::{self, StrategyError},
    traits::Record,
    validate::ValidateError,
};
use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};
use thiserror::Error as ThisError;

///
/// AssocError
///

#[derive(Debug, ThisError)]
pub enum AssocError {
    /// The wrapper was asked to do owner-bound work before `prepare` ran.
    /// Unreachable through the accessor protocol; indicates a
    /// construction-path bug.
    #[error("association {assoc} has no bound owner")]
    UnboundOwner { assoc: String },

    /// The persisted side needs the asynchronous path to resolve.
    #[error("loading '{owner}.{field}' requires the async path: {source}")]
    AwaitRequired {
        owner: &'static str,
        field: &'static str,
        #[source]
        source: StoreError,
    },

    /// The persisted side's relation strategy forbids implicit loading.
    #[error("implicit load of '{owner}.{field}' is forbidden: {context}")]
    LoadForbidden {
        owner: &'static str,
        field: &'static str,
        context: String,
    },

    #[error("relation '{owner}.{field}' is required and rejects null")]
    RequiredRelation {
        owner: &'static str,
        field: &'static str,
    },

    #[error("invalid related value for '{owner}.{field}': {source}")]
    InvalidValue {
        owner: &'static str,
        field: &'static str,
        #[source]
        source: ValidateError,
    },

    #[error("store failure on '{owner}.{field}': {source}")]
    Store {
        owner: &'static str,
        field: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("strategy failure on '{owner}.{field}': {source}")]
    Strategy {
        owner: &'static str,
        field: &'static str,
        #[source]
        source: StrategyError,
    },

    #[error("materialization failed for '{owner}.{field}': {source}")]
    Materialize {
        owner: &'static str,
        field: &'static str,
        #[source]
        source: Box<MaterializeError>,
    },

    /// The persisted slot shape disagrees with the wrapper shape.
    #[error("relation slot for '{owner}.{field}' is not {expected}")]
    ShapeMismatch {
        owner: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    #[error("index {index} out of bounds for '{field}' (len {len})")]
    IndexOutOfBounds {
        field: &'static str,
        index: usize,
        len: usize,
    },

    /// Replication semantics are not supported on relation collections.
    #[error("unsupported operation '{operation}' on a collection association")]
    UnsupportedOperation { operation: &'static str },
}

///
/// OwnerLink
///
/// The owner-side binding of one association: the owner's schema path, the
/// field name, the declared relation metadata, and a weak handle onto the
/// owner's `Provided` cell. Weak by contract: an association never owns
/// its owner.
///

#[derive(Clone)]
pub struct OwnerLink {
    owner_path: &'static str,
    field_name: &'static str,
    relation: Option<&'static RelationModel>,
    provided: Weak<RefCell<Option<RowRef>>>,
}

impl OwnerLink {
    #[must_use]
    pub fn for_field<M: Record>(field_name: &'static str, provided: &Provided) -> Self {
        Self {
            owner_path: M::PATH,
            field_name,
            relation: M::MODEL.relation(field_name),
            provided: provided.downgrade(),
        }
    }

    #[must_use]
    pub const fn owner_path(&self) -> &'static str {
        self.owner_path
    }

    #[must_use]
    pub const fn field_name(&self) -> &'static str {
        self.field_name
    }

    #[must_use]
    pub const fn relation(&self) -> Option<&'static RelationModel> {
        self.relation
    }

    /// The owner's current persisted counterpart, if the owner is still
    /// alive and bound.
    #[must_use]
    pub fn row(&self) -> Option<RowRef> {
        self.provided
            .upgrade()
            .and_then(|cell| cell.borrow().clone())
    }

    #[must_use]
    pub fn required(&self) -> bool {
        matches!(
            self.relation.map(|r| r.shape),
            Some(RelationShape::Single { required: true })
        )
    }
}

///
/// Relation
///
/// Common load/prepare protocol implemented by both association shapes.
/// Callers never need runtime shape-switching beyond this surface.
///

pub trait Relation {
    /// Bind this association to its owner. Idempotent: a second call is a
    /// no-op. Performs the eager initial sync of a construction-supplied
    /// payload; never marks the association loaded.
    fn prepare(&self, link: OwnerLink) -> Result<(), AssocError>;

    fn loaded(&self) -> bool;

    /// Drop the loaded state so the next read re-materializes.
    fn invalidate(&self);

    fn shape(&self) -> RelationShape;
}

// Map a store failure during slot resolution into the two suspension
// kinds the caller can act on, passing everything else through.
fn map_fetch_error(link: &OwnerLink, err: StoreError) -> AssocError {
    match err {
        StoreError::AwaitRequired { .. } => AssocError::AwaitRequired {
            owner: link.owner_path(),
            field: link.field_name(),
            source: err,
        },
        StoreError::LoadForbidden { .. } => AssocError::LoadForbidden {
            owner: link.owner_path(),
            field: link.field_name(),
            context: err.to_string(),
        },
        other => AssocError::Store {
            owner: link.owner_path(),
            field: link.field_name(),
            source: other,
        },
    }
}

// Current slot for the field, defaulting to an empty resolved slot of the
// declared shape when the row carries none.
fn current_slot(link: &OwnerLink, row: &RowRef, shape: RelationShape) -> RelationSlot {
    row.borrow()
        .relation(link.field_name())
        .cloned()
        .unwrap_or_else(|| RelationSlot::empty(shape))
}

/// Resolve the persisted slot synchronously, fetching a deferred slot
/// through the active strategy's store.
pub(crate) fn resolve_slot(
    link: &OwnerLink,
    row: &RowRef,
    shape: RelationShape,
) -> Result<RelationSlot, AssocError> {
    match current_slot(link, row, shape) {
        slot @ (RelationSlot::One(_) | RelationSlot::Many(_)) => Ok(slot),
        RelationSlot::Deferred(_) => {
            let store = strategy::active()
                .store()
                .ok_or_else(|| AssocError::LoadForbidden {
                    owner: link.owner_path(),
                    field: link.field_name(),
                    context: "deferred relation with no store-backed strategy in scope".to_string(),
                })?;

            let fetched = store
                .fetch_relation(row, link.field_name())
                .map_err(|err| map_fetch_error(link, err))?;
            row.borrow_mut()
                .set_relation(link.field_name(), fetched.clone());

            Ok(fetched)
        }
        RelationSlot::NoLoad(_) => Err(AssocError::LoadForbidden {
            owner: link.owner_path(),
            field: link.field_name(),
            context: "relation strategy forbids implicit load".to_string(),
        }),
    }
}

/// Async twin of [`resolve_slot`]: identical semantics, with the deferred
/// fetch handed to the host scheduler.
pub(crate) async fn resolve_slot_async(
    link: &OwnerLink,
    row: &RowRef,
    shape: RelationShape,
) -> Result<RelationSlot, AssocError> {
    match current_slot(link, row, shape) {
        slot @ (RelationSlot::One(_) | RelationSlot::Many(_)) => Ok(slot),
        RelationSlot::Deferred(_) => {
            let store = strategy::active()
                .store()
                .ok_or_else(|| AssocError::LoadForbidden {
                    owner: link.owner_path(),
                    field: link.field_name(),
                    context: "deferred relation with no store-backed strategy in scope".to_string(),
                })?;

            let fetched = store
                .fetch_relation_async(row, link.field_name())
                .await
                .map_err(|err| map_fetch_error(link, err))?;
            row.borrow_mut()
                .set_relation(link.field_name(), fetched.clone());

            Ok(fetched)
        }
        RelationSlot::NoLoad(_) => Err(AssocError::LoadForbidden {
            owner: link.owner_path(),
            field: link.field_name(),
            context: "relation strategy forbids implicit load".to_string(),
        }),
    }
}

// Shared error helpers for the two wrapper shapes.

pub(crate) fn strategy_err(link: &OwnerLink, source: StrategyError) -> AssocError {
    AssocError::Strategy {
        owner: link.owner_path(),
        field: link.field_name(),
        source,
    }
}

pub(crate) fn invalid_value(link: &OwnerLink, source: ValidateError) -> AssocError {
    AssocError::InvalidValue {
        owner: link.owner_path(),
        field: link.field_name(),
        source,
    }
}

pub(crate) fn materialize_err(link: &OwnerLink, source: MaterializeError) -> AssocError {
    AssocError::Materialize {
        owner: link.owner_path(),
        field: link.field_name(),
        source: Box::new(source),
    }
}

pub(crate) fn unbound<T: Record>(shape: &str) -> AssocError {
    AssocError::UnboundOwner {
        assoc: format!("{shape}<{}>", T::PATH),
    }
}

// Rc identity without a dedicated wrapper type.
pub(crate) fn row_ptr_eq(a: &RowRef, b: &RowRef) -> bool {
    Rc::ptr_eq(a, b)
}
