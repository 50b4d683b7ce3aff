//! Query/result adaptation: translate store query results back into
//! validated records through the active strategy and episode context.
//! Deliberately thin; planning and execution belong to the Store.

use crate::{
    materialize::{self, MaterializeError},
    store::{Query, StoreError},
    strategy,
    traits::Record,
    value::Value,
};
use std::rc::Rc;
use thiserror::Error as ThisError;

///
/// QueryError
///

#[derive(Debug, ThisError)]
pub enum QueryError {
    /// A must-exist lookup found nothing.
    #[error("no result for query on '{target}'")]
    NoResult { target: String },

    #[error("query on '{target}' cannot execute: {reason}")]
    NotExecutable { target: String, reason: String },

    #[error("store failure on '{target}': {source}")]
    Store {
        target: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

fn active_store(target: &str) -> Result<Rc<dyn crate::store::RecordStore>, QueryError> {
    strategy::active()
        .store()
        .ok_or_else(|| QueryError::NotExecutable {
            target: target.to_string(),
            reason: "no store-backed strategy in scope".to_string(),
        })
}

fn adapt<T: Record>(rows: &[crate::row::RowRef]) -> Result<Vec<Rc<T>>, QueryError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(materialize::record::<T>(row)?);
    }

    Ok(out)
}

/// Execute a query and re-validate every row.
pub fn fetch_all<T: Record>(query: &Query) -> Result<Vec<Rc<T>>, QueryError> {
    let store = active_store(query.target())?;
    let rows = store.execute(query).map_err(|source| QueryError::Store {
        target: query.target().to_string(),
        source,
    })?;

    adapt(&rows)
}

/// Async twin of [`fetch_all`].
pub async fn fetch_all_async<T: Record>(query: &Query) -> Result<Vec<Rc<T>>, QueryError> {
    let store = active_store(query.target())?;
    let rows = store
        .execute_async(query)
        .await
        .map_err(|source| QueryError::Store {
            target: query.target().to_string(),
            source,
        })?;

    adapt(&rows)
}

/// Optional-result variant: empty results are `None`, not an error.
pub fn fetch_optional<T: Record>(query: &Query) -> Result<Option<Rc<T>>, QueryError> {
    let limited = query.clone().limit(1);
    let mut all = fetch_all::<T>(&limited)?;

    Ok(if all.is_empty() {
        None
    } else {
        Some(all.remove(0))
    })
}

/// Must-exist variant: an empty result is a `NoResult` failure.
pub fn fetch_one<T: Record>(query: &Query) -> Result<Rc<T>, QueryError> {
    fetch_optional::<T>(query)?.ok_or_else(|| QueryError::NoResult {
        target: query.target().to_string(),
    })
}

/// Get-by-identity through the active strategy's registration.
pub fn lookup<T: Record>(key: &Value) -> Result<Option<Rc<T>>, QueryError> {
    let strategy = strategy::active();
    let Some(registration) = strategy.registration(T::PATH) else {
        return Err(QueryError::NotExecutable {
            target: T::MODEL.model_name.to_string(),
            reason: "model not registered with the active strategy".to_string(),
        });
    };

    let store = active_store(&registration.target)?;
    match store.get(&registration.target, key) {
        Ok(Some(row)) => Ok(Some(materialize::record::<T>(&row)?)),
        Ok(None) => Ok(None),
        Err(source) => Err(QueryError::Store {
            target: registration.target,
            source,
        }),
    }
}

/// Async twin of [`lookup`].
pub async fn lookup_async<T: Record>(key: &Value) -> Result<Option<Rc<T>>, QueryError> {
    let strategy = strategy::active();
    let Some(registration) = strategy.registration(T::PATH) else {
        return Err(QueryError::NotExecutable {
            target: T::MODEL.model_name.to_string(),
            reason: "model not registered with the active strategy".to_string(),
        });
    };

    let store = active_store(&registration.target)?;
    match store.get_async(&registration.target, key).await {
        Ok(Some(row)) => Ok(Some(materialize::record::<T>(&row)?)),
        Ok(None) => Ok(None),
        Err(source) => Err(QueryError::Store {
            target: registration.target,
            source,
        }),
    }
}
