//! The session store: a model store over [`SessionState`] plus the
//! durable strategy slot that survives across invocations.

use serde_json::Value;

use super::state::SessionState;
use crate::model::{Listener, Model, ModelStore, ReplaceOptions, Subscription};
use crate::strategy::Slot;

/// Whether a session represents a query (read) or a mutation (write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Query,
    Mutation,
}

/// The model backing a session store.
///
/// Sessions have no named mutators: settled results are pushed in via
/// direct state replacement by the pipeline, which is the only writer.
pub struct SessionModel {
    state: SessionState,
}

impl SessionModel {
    /// Read access for listeners holding the derived instance.
    pub fn state(&self) -> &SessionState {
        &self.state
    }
}

impl Model for SessionModel {
    type State = SessionState;

    fn derive(state: &SessionState) -> Self {
        Self {
            state: state.clone(),
        }
    }

    fn invoke(&self, _method: &str, _args: &[Value]) -> Option<SessionState> {
        None
    }
}

/// One query/mutation session: state container plus the root strategy
/// slot. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct SessionStore {
    store: ModelStore<SessionModel>,
    kind: SessionKind,
    slot: Slot,
}

impl SessionStore {
    /// Create a query session.
    pub fn query() -> Self {
        Self::with_state(SessionKind::Query, SessionState::default())
    }

    /// Create a mutation session. Mutations only run on manual triggers.
    pub fn mutation() -> Self {
        Self::with_state(SessionKind::Mutation, SessionState::default())
    }

    /// Create a session seeded with a specific state (e.g. a persisted
    /// default restored by the binding layer).
    pub fn with_state(kind: SessionKind, initial: SessionState) -> Self {
        Self {
            store: ModelStore::new(initial),
            kind,
            slot: Slot::new(),
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    /// The backing model store, for binding layers that want version
    /// numbers or instance access.
    pub fn model_store(&self) -> ModelStore<SessionModel> {
        self.store.clone()
    }

    /// Subscribe to session state changes.
    pub fn subscribe(&self, listener: Listener<SessionModel>) -> Subscription<SessionModel> {
        self.store.subscribe(listener)
    }

    pub fn is_destroyed(&self) -> bool {
        self.store.is_destroyed()
    }

    /// Tear the session down: the store goes inert and the strategy slot
    /// is cleared, which runs any pending response-effect cleanups.
    pub fn destroy(&self) {
        self.store.destroy();
        self.slot.clear();
    }

    pub(crate) fn slot(&self) -> Slot {
        self.slot.clone()
    }

    pub(crate) fn replace(&self, state: SessionState) -> Result<(), crate::error::StoreError> {
        self.store.replace_state(state, ReplaceOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fresh_session_is_idle() {
        let session = SessionStore::query();
        let state = session.state();
        assert!(!state.is_fetching);
        assert!(!state.loaded);
        assert_eq!(state.round, 0);
    }

    #[test]
    fn test_subscribers_see_replacements() {
        let session = SessionStore::query();
        let seen = Arc::new(parking_lot::Mutex::new(0u64));
        let sink = Arc::clone(&seen);
        session.subscribe(Arc::new(move |action| {
            *sink.lock() = action.state.round;
        }));
        let mut next = session.state();
        next.round = 3;
        session.replace(next).unwrap();
        assert_eq!(*seen.lock(), 3);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let session = SessionStore::mutation();
        session.destroy();
        session.destroy();
        assert!(session.is_destroyed());
    }
}
