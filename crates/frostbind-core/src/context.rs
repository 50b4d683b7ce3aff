//! Module: context
//! Responsibility: the identity-consistent validation context — a scoped
//! cache from persisted-row identity to the record instance already
//! materialized for it within one validation episode.
//! Does not own: conversion rules (see `strategy`).
//!
//! Invariants:
//! - At most one live instance per (row identity, record type) inside one
//!   episode; lookups return it reference-identical.
//! - Entries never outlive their episode: the frame is dropped on scope
//!   exit, including unwind.
//! - Episodes nest; only the innermost frame is consulted.

use crate::{row::RowIdentity, traits::Record};
use std::{any::Any, cell::RefCell, collections::BTreeMap, rc::Rc};

type Frame = BTreeMap<(RowIdentity, &'static str), Rc<dyn Any>>;

thread_local! {
    static CONTEXTS: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` inside a fresh validation episode.
pub fn scope<R>(f: impl FnOnce() -> R) -> R {
    let _guard = enter();
    f()
}

/// Open a validation episode. The returned guard tears the episode down
/// on drop, including unwind paths.
#[must_use]
pub fn enter() -> ContextGuard {
    CONTEXTS.with(|stack| stack.borrow_mut().push(Frame::new()));

    ContextGuard { _private: () }
}

/// Whether a validation episode is active on this thread.
#[must_use]
pub fn is_active() -> bool {
    CONTEXTS.with(|stack| !stack.borrow().is_empty())
}

///
/// ContextGuard
/// RAII token for one validation episode.
///

pub struct ContextGuard {
    _private: (),
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXTS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The cached instance for `key` in the innermost episode, if any.
pub(crate) fn lookup<T: Record>(key: &RowIdentity) -> Option<Rc<T>> {
    CONTEXTS.with(|stack| {
        let stack = stack.borrow();
        let frame = stack.last()?;
        frame
            .get(&(key.clone(), T::PATH))
            .and_then(|entry| Rc::clone(entry).downcast::<T>().ok())
    })
}

/// Insert an instance into the innermost episode. A no-op when no episode
/// is active (each materialization then yields a fresh instance).
pub(crate) fn insert<T: Record>(key: RowIdentity, instance: &Rc<T>) {
    CONTEXTS.with(|stack| {
        if let Some(frame) = stack.borrow_mut().last_mut() {
            frame.insert((key, T::PATH), Rc::clone(instance) as Rc<dyn Any>);
        }
    });
}
