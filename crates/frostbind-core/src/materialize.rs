//! Materialize-or-reuse: turning a persisted row into a validated record
//! instance through the active strategy, deduplicated per validation
//! episode.

use crate::{
    assoc::{AssocError, OwnerLink},
    context,
    row::RowRef,
    strategy::{self, AttributeSnapshot, StrategyError},
    traits::Record,
    validate::{self, ValidateError},
};
use std::{any::Any, rc::Rc};
use thiserror::Error as ThisError;

///
/// MaterializeError
///

#[derive(Debug, ThisError)]
pub enum MaterializeError {
    /// The row's target is registered to a different model than requested.
    #[error("target '{target}' is registered to '{registered}', not '{requested}'")]
    ModelMismatch {
        target: String,
        registered: &'static str,
        requested: &'static str,
    },

    #[error("failed to decode persisted snapshot for {model}: {source}")]
    Decode {
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validate(#[from] ValidateError),

    #[error("failed to prepare relation '{field}' on {model}: {source}")]
    Prepare {
        model: &'static str,
        field: &'static str,
        #[source]
        source: Box<AssocError>,
    },
}

/// Materialize-or-reuse one persisted row as a validated record.
///
/// Within an active validation episode a given row identity yields the
/// identical instance on every call; across episodes, fresh instances.
/// The resident-attribute snapshot never touches relation slots, so
/// materialization cannot trigger unrelated lazy loads.
pub fn record<T: Record>(row: &RowRef) -> Result<Rc<T>, MaterializeError> {
    let strategy = strategy::active();

    // The bidirectional registry guards against adapting a row into the
    // wrong schema class.
    let target = row.borrow().target().to_string();
    if let Some(registered) = strategy.model_for_target(&target) {
        if registered != T::PATH {
            return Err(MaterializeError::ModelMismatch {
                target,
                registered,
                requested: T::PATH,
            });
        }
    }

    let key = strategy.identity_of(T::MODEL, row);
    if let Some(hit) = context::lookup::<T>(&key) {
        tracing::trace!(model = T::PATH, "materialize: episode cache hit");
        return Ok(hit);
    }

    let snapshot = strategy.before_materialize(T::MODEL, row);
    let instance = decode::<T>(&snapshot)?;
    validate::validate(&instance)?;

    // Bind before preparing relations: prepared wrappers observe the
    // owner's counterpart through the shared binding cell.
    instance.provided().bind(row.clone());
    for (name, relation) in instance.relations() {
        relation
            .prepare(OwnerLink::for_field::<T>(name, instance.provided()))
            .map_err(|err| MaterializeError::Prepare {
                model: T::MODEL.path,
                field: name,
                source: Box::new(err),
            })?;
    }

    let instance = Rc::new(instance);
    strategy.after_materialize(T::MODEL, row, &(Rc::clone(&instance) as Rc<dyn Any>));
    context::insert::<T>(key, &instance);

    tracing::debug!(model = T::PATH, "record materialized");

    Ok(instance)
}

/// The persisted counterpart of a record value, creating one through the
/// active strategy when the value is not yet bound.
pub fn counterpart<T: Record>(value: &T) -> Result<Option<RowRef>, StrategyError> {
    if let Some(row) = value.provided().row() {
        return Ok(Some(row));
    }

    let row = strategy::active().create_counterpart(T::MODEL, &value.field_values())?;
    if let Some(row) = &row {
        value.provided().bind(row.clone());
    }

    Ok(row)
}

fn decode<T: Record>(snapshot: &AttributeSnapshot) -> Result<T, MaterializeError> {
    let object = serde_json::Value::Object(snapshot.to_json_object());

    serde_json::from_value(object).map_err(|source| MaterializeError::Decode {
        model: T::MODEL.path,
        source,
    })
}
