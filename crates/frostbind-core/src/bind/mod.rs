//! Module: bind
//! Responsibility: the owner binding protocol — the explicit accessor
//! surface record types invoke around field access so association fields
//! self-prepare and scalar writes propagate to the persisted counterpart.
//! Does not own: association load semantics (see `assoc`).
//!
//! Invariants:
//! - Binding is one-directional and permanent: a `Provided` cell accepts
//!   exactly one row for the life of the instance.
//! - Protocol operations raise no business-logic errors of their own;
//!   they only re-surface collaborator failures with added context.

mod patch;


pub use patch::{Patch, PatchMode};

use crate::{
    assoc::{AssocError, OwnerLink},
    row::RowRef,
    strategy::{self, StrategyError},
    traits::Record,
    validate::{self, ValidateError},
    value::Value,
};
use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};
use thiserror::Error as ThisError;

///
/// BindError
///

#[derive(Debug, ThisError)]
pub enum BindError {
    #[error("{model} has no bound persisted counterpart")]
    Unbound { model: &'static str },

    #[error("patch built for '{expected}' applied to '{found}'")]
    PatchModelMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Assoc(#[from] AssocError),

    #[error(transparent)]
    Validate(#[from] ValidateError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

///
/// Provided
///
/// The owner's binding handle onto its persisted counterpart. Shared by
/// clones of the owner (instances are live handles); excluded from value
/// equality.
///

#[derive(Clone, Default)]
pub struct Provided {
    cell: Rc<RefCell<Option<RowRef>>>,
}

impl Provided {
    #[must_use]
    pub fn unbound() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.cell.borrow().is_some()
    }

    /// The bound counterpart row, if any.
    #[must_use]
    pub fn row(&self) -> Option<RowRef> {
        self.cell.borrow().clone()
    }

    /// Bind the counterpart. First binding wins; binding is permanent for
    /// the life of the instance.
    pub fn bind(&self, row: RowRef) {
        let mut cell = self.cell.borrow_mut();
        if cell.is_none() {
            *cell = Some(row);
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<Option<RowRef>>> {
        Rc::downgrade(&self.cell)
    }
}

// Binding state never participates in record value equality.
impl PartialEq for Provided {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Debug for Provided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bound() {
            f.write_str("Provided(bound)")
        } else {
            f.write_str("Provided(unbound)")
        }
    }
}

/// Construction protocol: validate, create the persisted counterpart via
/// the active strategy from scalar field values (association fields
/// excluded), then prepare every association field against this owner.
pub fn construct<M: Record>(record: &M) -> Result<(), BindError> {
    validate::validate(record)?;

    if !record.provided().is_bound() {
        let fields = record.field_values();
        if let Some(row) = strategy::active().create_counterpart(M::MODEL, &fields)? {
            record.provided().bind(row);
        }
    }

    for (name, relation) in record.relations() {
        relation.prepare(OwnerLink::for_field::<M>(name, record.provided()))?;
    }

    Ok(())
}

/// Read-side hook: every relation accessor routes through here so the
/// association learns its owner at most once, however many times the
/// field is read.
pub fn prepare_field<'a, M: Record, A: crate::assoc::Relation + ?Sized>(
    provided: &Provided,
    assoc: &'a A,
    field: &'static str,
) -> Result<&'a A, BindError> {
    assoc.prepare(OwnerLink::for_field::<M>(field, provided))?;

    Ok(assoc)
}

/// Write-side hook: after a scalar setter updates the struct, propagate
/// the new value onto the bound counterpart's matching attribute.
pub fn write_field<M: Record>(provided: &Provided, field: &'static str, value: &Value) {
    if let Some(row) = provided.row() {
        row.borrow_mut().set_field(field, value.clone());
    }
}

/// Force re-materialization of scalar and association state from the
/// current persisted counterpart.
pub fn revalidate<M: Record>(record: &mut M) -> Result<(), BindError> {
    let row = record
        .provided()
        .row()
        .ok_or(BindError::Unbound { model: M::MODEL.path })?;

    {
        let inner = row.borrow();
        for field in M::MODEL.fields {
            if let Some(value) = inner.field(field.name) {
                record.apply_field(field.name, value)?;
            }
        }
    }

    for (_, relation) in record.relations() {
        relation.invalidate();
    }

    validate::validate(record)?;

    Ok(())
}

/// Apply a partial shape onto an existing instance, write-through per
/// field.
pub fn absorb<M: Record>(record: &mut M, patch: &Patch) -> Result<(), BindError> {
    patch.check::<M>()?;

    for (name, value) in patch.entries() {
        record.apply_field(name, value)?;
        write_field::<M>(record.provided(), name, value);
    }

    validate::validate(record)?;

    Ok(())
}
