//! Action records delivered to store listeners.

use std::sync::Arc;

use super::Model;

/// What produced an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// A named method on the instance computed the next state.
    Method(String),
    /// State was replaced directly, not via a method call.
    Replace,
    /// Synthetic no-op delivered to listeners that subscribed while a
    /// dispatch loop was running, so they can synchronize to the final
    /// state.
    Sync,
}

/// A record of one state transition.
///
/// Carries both old and new state and instance so listeners can
/// reconstruct either view without re-deriving them.
pub struct Action<M: Model> {
    pub kind: ActionKind,
    pub prev_state: M::State,
    pub state: M::State,
    pub prev_instance: Arc<M>,
    pub instance: Arc<M>,
}

impl<M: Model> Clone for Action<M> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            prev_state: self.prev_state.clone(),
            state: self.state.clone(),
            prev_instance: Arc::clone(&self.prev_instance),
            instance: Arc::clone(&self.instance),
        }
    }
}

impl<M: Model> Action<M> {
    /// The method name for method-originated actions.
    pub fn method(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Method(name) => Some(name),
            _ => None,
        }
    }
}
