//! Module: strategy
//! Responsibility: the materialization coordinator — which binding
//! strategy is active for the current dynamic scope, and how each
//! strategy converts between records and persisted rows.
//! Does not own: instance deduplication (see `context`).
//!
//! Invariants:
//! - The active strategy is a stack, not a cell: push on scope entry,
//!   pop on scope exit, last-entered-wins, restored on unwind.
//! - Registration failures happen at bless time, never per instance.

mod cache;
mod noop;
mod registry;
mod store;


pub use cache::CacheStrategy;
pub use noop::NoopStrategy;
pub use registry::{Registration, RegistryError, StrategyRegistry};
pub use store::StoreStrategy;

use crate::{
    materialize::MaterializeError,
    model::ModelDescriptor,
    row::{Row, RowIdentity, RowRef},
    store::{CacheError, RecordStore, StoreError},
    value::Value,
};
use std::{any::Any, cell::RefCell, collections::BTreeMap, rc::Rc};
use thiserror::Error as ThisError;

///
/// StrategyError
///

#[derive(Debug, ThisError)]
pub enum StrategyError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to encode persisted payload for {model}: {message}")]
    Serialize {
        model: &'static str,
        message: String,
    },

    #[error(transparent)]
    Materialize(Box<MaterializeError>),
}

///
/// AttributeSnapshot
///
/// Resident-attribute projection of one persisted row, produced by the
/// before-materialize hook. Contains only already-resident scalar fields
/// so materializing never triggers unrelated lazy loads.
///

#[derive(Clone, Debug, Default)]
pub struct AttributeSnapshot {
    fields: BTreeMap<String, Value>,
}

impl AttributeSnapshot {
    /// Snapshot the resident scalar attributes of `row`. Relation slots
    /// are structurally excluded.
    #[must_use]
    pub fn resident_of(row: &RowRef) -> Self {
        Self {
            fields: row.borrow().fields().clone(),
        }
    }

    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Project into a JSON object for validation.
    #[must_use]
    pub fn to_json_object(&self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

///
/// BindingStrategy
///
/// Pluggable policy deciding whether/how a persisted counterpart exists
/// for a record type and how to convert between the two representations.
/// Registered via `bless`; activated via [`scope`]/[`enter`].
///

pub trait BindingStrategy {
    fn name(&self) -> &'static str;

    /// Create the persisted counterpart for a new record instance from its
    /// scalar field values. `None` means this strategy binds no
    /// counterpart for the model (the no-op behavior).
    fn create_counterpart(
        &self,
        model: &'static ModelDescriptor,
        fields: &[(&'static str, Value)],
    ) -> Result<Option<RowRef>, StrategyError>;

    /// Registration for a model path, if blessed under this strategy.
    fn registration(&self, model_path: &str) -> Option<Registration> {
        let _ = model_path;
        None
    }

    /// Reverse lookup: which model path backs a persisted target.
    fn model_for_target(&self, target: &str) -> Option<&'static str> {
        let _ = target;
        None
    }

    /// Before-materialize hook: resident-only attribute snapshot.
    fn before_materialize(&self, model: &'static ModelDescriptor, row: &RowRef) -> AttributeSnapshot {
        let _ = model;
        AttributeSnapshot::resident_of(row)
    }

    /// After-materialize hook: strategy-specific finalization for the
    /// freshly materialized instance.
    fn after_materialize(
        &self,
        model: &'static ModelDescriptor,
        row: &RowRef,
        instance: &Rc<dyn Any>,
    ) {
        let _ = (model, row, instance);
    }

    /// Identity key for one row within a validation episode.
    fn identity_of(&self, model: &'static ModelDescriptor, row: &RowRef) -> RowIdentity {
        RowIdentity::of(row, model.identity_name())
    }

    /// The record store behind this strategy, if any.
    fn store(&self) -> Option<Rc<dyn RecordStore>> {
        None
    }
}

// ---------------------------------------------------------------------
// Active-strategy stack (scoped ambient state)
// ---------------------------------------------------------------------

thread_local! {
    static ACTIVE: RefCell<Vec<Rc<dyn BindingStrategy>>> = const { RefCell::new(Vec::new()) };
}

thread_local! {
    static NOOP: Rc<dyn BindingStrategy> = Rc::new(NoopStrategy);
}

/// The strategy for the current dynamic scope. Defaults to the no-op
/// strategy when no scope is active.
#[must_use]
pub fn active() -> Rc<dyn BindingStrategy> {
    ACTIVE
        .with(|stack| stack.borrow().last().cloned())
        .unwrap_or_else(|| NOOP.with(Clone::clone))
}

/// Run `f` with `strategy` active, restoring the prior strategy on exit.
pub fn scope<R>(strategy: Rc<dyn BindingStrategy>, f: impl FnOnce() -> R) -> R {
    let _guard = enter(strategy);
    f()
}

/// Push a strategy for the current scope. The returned guard pops it on
/// drop, including unwind paths. Guards must drop in reverse entry order.
#[must_use]
pub fn enter(strategy: Rc<dyn BindingStrategy>) -> ScopeGuard {
    tracing::debug!(strategy = strategy.name(), "binding strategy entered");
    ACTIVE.with(|stack| stack.borrow_mut().push(strategy));

    ScopeGuard { _private: () }
}

///
/// ScopeGuard
/// RAII token for one strategy-stack level.
///

pub struct ScopeGuard {
    _private: (),
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let popped = ACTIVE.with(|stack| stack.borrow_mut().pop());
        if let Some(strategy) = popped {
            tracing::debug!(strategy = strategy.name(), "binding strategy exited");
        }
    }
}

// Build a fresh counterpart row for a registration: scalar fields plus
// empty resolved relation slots for every declared relation.
pub(crate) fn new_counterpart_row(
    target: &str,
    model: &'static ModelDescriptor,
    fields: &[(&'static str, Value)],
) -> RowRef {
    let mut row = Row::with_fields(
        target,
        fields
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone())),
    );
    for relation in model.relations {
        row.set_relation(relation.name, crate::row::RelationSlot::empty(relation.shape));
    }

    row.into_ref()
}
