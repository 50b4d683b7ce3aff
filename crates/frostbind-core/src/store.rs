//! Collaborator interfaces consumed by the core: the record store and the
//! external cache tier. The core never owns query planning, transactions,
//! or eviction policy; it only routes through these traits and re-validates
//! what comes back.

use crate::{
    row::{RelationSlot, RowRef},
    value::Value,
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error as ThisError;

///
/// StoreError
///
/// Failures surfaced by a record store. `AwaitRequired` and
/// `LoadForbidden` are the two suspension kinds the association layer
/// distinguishes; everything else passes through wrapped.
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    /// The operation needs the asynchronous path to complete.
    #[error("operation requires the async path: {context}")]
    AwaitRequired { context: String },

    /// The store's loading policy disallows implicit loading here.
    #[error("implicit load disallowed by store policy: {context}")]
    LoadForbidden { context: String },

    #[error("row not found: {key}")]
    NotFound { key: String },

    #[error("store backend failure: {message}")]
    Backend { message: String },
}

///
/// Query
///
/// Thin query shape handed to the store: a target plus conjunctive
/// field-equality filters. Planning and dialects are the store's concern.
///

#[derive(Clone, Debug)]
pub struct Query {
    target: String,
    filters: Vec<(String, Value)>,
    limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            filters: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    #[must_use]
    pub const fn limit_hint(&self) -> Option<usize> {
        self.limit
    }
}

///
/// RecordStore
///
/// Store surface consumed by the core. The async methods default to the
/// synchronous implementations: awaiting performs exactly the synchronous
/// work plus the host scheduler handoff. Async-only stores override the
/// async methods and fail the sync ones with `AwaitRequired`.
///

#[async_trait(?Send)]
pub trait RecordStore {
    /// Whether this store can persist rows for `target`.
    /// Checked at strategy registration time, never per instance.
    fn has_target(&self, target: &str) -> bool;

    /// Register a freshly created row for persistence on the next flush.
    fn add(&self, row: &RowRef) -> Result<(), StoreError>;

    fn get(&self, target: &str, key: &Value) -> Result<Option<RowRef>, StoreError>;

    fn execute(&self, query: &Query) -> Result<Vec<RowRef>, StoreError>;

    /// Resolve one deferred relation slot on `row`.
    fn fetch_relation(&self, row: &RowRef, field: &str) -> Result<RelationSlot, StoreError>;

    fn flush(&self) -> Result<(), StoreError>;

    fn commit(&self) -> Result<(), StoreError>;

    fn rollback(&self) -> Result<(), StoreError>;

    /// Reload `row`'s resident attributes from the backing store.
    fn refresh(&self, row: &RowRef) -> Result<(), StoreError>;

    /// Detach `row` from this store's tracking.
    fn expunge(&self, row: &RowRef) -> Result<(), StoreError>;

    /// Re-enable implicit lazy loading on a row whose relation slots were
    /// handed out under a no-load policy.
    fn enable_lazy_loads(&self, row: &RowRef) -> Result<(), StoreError>;

    async fn get_async(&self, target: &str, key: &Value) -> Result<Option<RowRef>, StoreError> {
        self.get(target, key)
    }

    async fn execute_async(&self, query: &Query) -> Result<Vec<RowRef>, StoreError> {
        self.execute(query)
    }

    async fn fetch_relation_async(
        &self,
        row: &RowRef,
        field: &str,
    ) -> Result<RelationSlot, StoreError> {
        self.fetch_relation(row, field)
    }
}

///
/// CacheError
///

#[derive(Debug, ThisError)]
pub enum CacheError {
    #[error("cache backend failure: {message}")]
    Backend { message: String },
}

///
/// CacheService
///
/// Key/value cache tier consumed by the cache-backed binding strategy.
/// Keys follow `"{prefix}:{model-name}:{identity}"`.
///

pub trait CacheService {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn set(&self, key: &str, bytes: &[u8], ttl: Option<Duration>) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key matching `pattern` (trailing-`*` glob).
    fn delete_matching(&self, pattern: &str) -> Result<(), CacheError>;
}
