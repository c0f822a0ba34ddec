//! Reactive model store primitives.
//!
//! This module provides the versioned state container at the heart of the
//! crate.
//!
//! # Architecture
//!
//! ```text
//! Method call ──→ Model::invoke ──→ next State ──→ commit + version bump
//!                                                      │
//!                        listeners ←── Action queue ←──┘
//! ```
//!
//! - **State**: immutable value owned by the store
//! - **Model**: pure derivation of an instance from state; its named
//!   methods are the only mutators
//! - **Action**: a record of one state transition delivered to listeners
//!
//! Notification delivery is reentrant-safe: a listener may mutate the same
//! store and its action is queued strictly after the in-flight one.

mod action;
mod method;
mod store;

use serde_json::Value;

pub use action::{Action, ActionKind};
pub use method::Method;
pub use store::{Listener, ModelStore, ReplaceOptions, Subscription};

/// A pure reducer: derives a live instance from a state value.
///
/// The instance's named methods are pure transitions from the captured
/// state (plus arguments) to a next state. A new instance is derived on
/// every commit; instances are never mutated in place.
pub trait Model: Send + Sync + 'static {
    /// The state type this model derives from.
    type State: Clone + PartialEq + Send + Sync + 'static;

    /// Derive a fresh instance from a state value.
    ///
    /// Must be pure: same state in, equivalent instance out.
    fn derive(state: &Self::State) -> Self;

    /// Invoke a named mutator, returning the next state.
    ///
    /// Returns `None` when the method does not exist; the store converts
    /// that into [`StoreError::UnknownMethod`](crate::error::StoreError).
    fn invoke(&self, method: &str, args: &[Value]) -> Option<Self::State>;
}
