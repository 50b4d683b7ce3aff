//! Module: row
//! Responsibility: the persisted-counterpart representation the runtime
//! manipulates (scalar attributes + relation slots + identity keying).
//! Does not own: query execution, transactions, or durability — those are
//! the Store's concern.
//!
//! Invariants:
//! - A row is single-logical-flow state; `RowRef` is deliberately not Send.
//! - Relation slots hold counterpart rows, never record instances.
//! - Identity keying is canonical: store-assigned key when resident and
//!   non-null, address identity otherwise.

use crate::{model::RelationShape, value::Value};
use std::{
    any::Any,
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    rc::{Rc, Weak},
};

/// Shared handle onto one persisted row.
pub type RowRef = Rc<RefCell<Row>>;

///
/// Row
///
/// One persisted record: target name, resident scalar attributes, and
/// relation slots. The optional proxy slot carries a weak back-reference
/// to the canonical record instance materialized for this row.
///

pub struct Row {
    target: String,
    fields: BTreeMap<String, Value>,
    relations: BTreeMap<String, RelationSlot>,
    proxy: Option<Weak<dyn Any>>,
}

impl Row {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
            proxy: None,
        }
    }

    /// Build a row with an initial scalar attribute set.
    #[must_use]
    pub fn with_fields(
        target: impl Into<String>,
        fields: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        let mut row = Self::new(target);
        row.fields.extend(fields);
        row
    }

    /// Wrap into a shared handle.
    #[must_use]
    pub fn into_ref(self) -> RowRef {
        Rc::new(RefCell::new(self))
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Resident scalar attributes, in canonical order.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationSlot> {
        self.relations.get(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, slot: RelationSlot) {
        self.relations.insert(name.into(), slot);
    }

    /// Register the canonical record instance for this row.
    pub fn set_proxy(&mut self, proxy: Weak<dyn Any>) {
        self.proxy = Some(proxy);
    }

    /// The canonical record instance, if one is still alive.
    #[must_use]
    pub fn proxy(&self) -> Option<Rc<dyn Any>> {
        self.proxy.as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("target", &self.target)
            .field("fields", &self.fields)
            .field("relations", &self.relations.keys())
            .finish_non_exhaustive()
    }
}

///
/// RelationSlot
///
/// Persisted side of one relation field.
///
/// `Deferred` needs store I/O to resolve; `NoLoad` is a policy refusal
/// (the relation exists but implicit loading is disallowed).
///

#[derive(Clone)]
pub enum RelationSlot {
    One(Option<RowRef>),
    Many(Vec<RowRef>),
    Deferred(RelationShape),
    NoLoad(RelationShape),
}

impl RelationSlot {
    /// Empty resolved slot for a declared shape.
    #[must_use]
    pub const fn empty(shape: RelationShape) -> Self {
        match shape {
            RelationShape::Single { .. } => Self::One(None),
            RelationShape::Many => Self::Many(Vec::new()),
        }
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::One(_) | Self::Many(_))
    }
}

impl fmt::Debug for RelationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(Some(_)) => f.write_str("One(row)"),
            Self::One(None) => f.write_str("One(null)"),
            Self::Many(rows) => write!(f, "Many({})", rows.len()),
            Self::Deferred(_) => f.write_str("Deferred"),
            Self::NoLoad(_) => f.write_str("NoLoad"),
        }
    }
}

///
/// RowIdentity
///
/// Canonical identity of one persisted row within a validation episode:
/// the store-assigned key when resident, the cell address otherwise.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RowIdentity {
    Key { target: String, key: String },
    Addr(usize),
}

impl RowIdentity {
    /// Compute the identity of `row` given its identity field name.
    #[must_use]
    pub fn of(row: &RowRef, identity_field: Option<&str>) -> Self {
        if let Some(field) = identity_field {
            let inner = row.borrow();
            if let Some(value) = inner.field(field) {
                if !value.is_null() {
                    return Self::Key {
                        target: inner.target().to_string(),
                        key: value.to_string(),
                    };
                }
            }
        }

        Self::Addr(Rc::as_ptr(row) as usize)
    }
}
