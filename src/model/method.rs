//! Bound-method handles.
//!
//! The source of a model's mutators is the instance derived from state,
//! which is replaced on every commit. Callers that want a stable handle
//! to "the increase method of this store" get one here: a small closure
//! over the owning store and the method name, memoized per store so that
//! repeated lookups return the same identity.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use super::store::StoreInner;
use super::{Model, ModelStore};
use crate::error::StoreError;

/// A durable, referentially stable handle to one named mutator of one
/// store.
///
/// Holds the store weakly: a method handle never keeps a torn-down store
/// alive. Calling through a handle whose store is gone reports
/// [`StoreError::Destroyed`].
pub struct Method<M: Model> {
    store: Weak<Mutex<StoreInner<M>>>,
    name: Arc<str>,
}

impl<M: Model> Clone for Method<M> {
    fn clone(&self) -> Self {
        Self {
            store: Weak::clone(&self.store),
            name: Arc::clone(&self.name),
        }
    }
}

impl<M: Model> Method<M> {
    pub(super) fn bind(store: Weak<Mutex<StoreInner<M>>>, name: &str) -> Self {
        Self {
            store,
            name: Arc::from(name),
        }
    }

    /// The method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the bound method on the owning store.
    pub fn call(&self, args: &[Value]) -> Result<M::State, StoreError> {
        let inner = self.store.upgrade().ok_or(StoreError::Destroyed)?;
        ModelStore::from_inner(inner).mutate_via(&self.name, args)
    }
}

impl<M: Model> PartialEq for Method<M> {
    /// Identity comparison: handles are equal only when they came from
    /// the same store's method cache for the same name.
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.store, &other.store) && Arc::ptr_eq(&self.name, &other.name)
    }
}

impl<M: Model> std::fmt::Debug for Method<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}
