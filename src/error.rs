//! Error types for stores, scopes, and sessions.
//!
//! Producer failures are never represented here: a failing producer is
//! recovered into `SessionState::error` and handed to the interception
//! strategies. The variants below cover programming-contract violations,
//! which fail fast instead of being swallowed.

use thiserror::Error;

/// Errors raised by [`ModelStore`](crate::model::ModelStore) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The named method does not exist on the current instance.
    #[error("Model has no method '{method}'")]
    UnknownMethod { method: String },

    /// The store was destroyed and can no longer commit state.
    #[error("Model store is destroyed")]
    Destroyed,
}

/// Errors raised by [`Scope`](crate::scope::Scope) lookups and updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// No scope in the chain holds a store for the requested factory.
    #[error("No store registered for the requested model factory in this scope chain")]
    NotFound,

    /// A store was found but its concrete model type does not match.
    /// Indicates two distinct factories sharing one identity, which is
    /// an integration mistake.
    #[error("Registered store has a different model type than requested")]
    TypeMismatch,
}

/// Errors raised by [`run_session`](crate::session::run_session).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Mutation sessions may only be triggered manually; automatic
    /// (initial/refresh) triggers indicate a miswired binding layer.
    #[error("Mutation sessions can only be triggered manually, got '{trigger}'")]
    MutationRequiresManual { trigger: String },

    /// The session store backing this run was destroyed.
    #[error("Session store is destroyed")]
    StoreDestroyed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_method_message() {
        let err = StoreError::UnknownMethod {
            method: "increase".to_string(),
        };
        assert_eq!(err.to_string(), "Model has no method 'increase'");
    }

    #[test]
    fn test_mutation_trigger_message() {
        let err = SessionError::MutationRequiresManual {
            trigger: "initial".to_string(),
        };
        assert!(err.to_string().contains("initial"));
    }
}
