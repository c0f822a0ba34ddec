//! Driving one session invocation through the strategy pipeline.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use uuid::Uuid;

use super::state::{SessionState, TriggerType};
use super::store::{SessionKind, SessionStore};
use crate::error::SessionError;
use crate::model::ReplaceOptions;
use crate::strategy::{compose, RuntimeCache, Strategy, StrategyContext};

/// The wrapped asynchronous work: a remote call, a computation. The
/// rejection value is data, recovered into `SessionState::error`.
pub type Producer =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Value>> + Send + Sync>;

/// Wrap an async closure into a [`Producer`].
pub fn producer<F, Fut>(f: F) -> Producer
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Value>> + Send + 'static,
{
    Arc::new(move |variables| f(variables).boxed())
}

/// Run one invocation of a session through the given strategies.
///
/// The returned state is also written back into the session store unless
/// it is abandoned: superseded results are computed to completion but
/// discarded at write-back time. There is no true cancellation of an
/// in-flight producer.
///
/// Producer failures never surface as `Err`; they settle into an
/// `is_error = true` state. `Err` is reserved for programming-contract
/// violations: triggering a mutation session automatically, or running
/// against a destroyed store.
pub async fn run_session(
    strategies: Vec<Strategy>,
    session: &SessionStore,
    producer: Producer,
    variables: Vec<Value>,
    trigger: TriggerType,
) -> Result<SessionState, SessionError> {
    if session.kind() == SessionKind::Mutation && trigger != TriggerType::Manual {
        return Err(SessionError::MutationRequiresManual {
            trigger: trigger.as_str().to_string(),
        });
    }
    if session.is_destroyed() {
        return Err(SessionError::StoreDestroyed);
    }

    let key = Uuid::new_v4();
    let store = session.model_store();

    let current_state: crate::strategy::CurrentState = {
        let store = store.clone();
        Arc::new(move || store.state())
    };
    let resolve: crate::strategy::Resolver = {
        let store = store.clone();
        let variables = variables.clone();
        // Settling without a producer run is still a settlement of this
        // call: take ownership first so any older in-flight call is
        // condemned to abandonment.
        Arc::new(move |outcome| {
            store
                .state()
                .start_fetch(key, trigger, variables.clone())
                .settle(key, outcome)
        })
    };
    let runner: crate::strategy::Runner = {
        let store = store.clone();
        let producer = Arc::clone(&producer);
        let variables = variables.clone();
        Arc::new(move || {
            let store = store.clone();
            let producer = Arc::clone(&producer);
            let variables = variables.clone();
            async move {
                let fetching = store.state().start_fetch(key, trigger, variables.clone());
                if store
                    .replace_state(fetching, ReplaceOptions::default())
                    .is_err()
                {
                    // Torn down before the fetch began: finish quietly,
                    // never commit.
                    let mut state = store.state();
                    state.abandon = true;
                    return state;
                }
                let outcome = producer(variables).await;
                store.state().settle(key, outcome)
            }
            .boxed()
        })
    };

    let ctx = StrategyContext {
        variables,
        current_state,
        resolve,
        runner,
        slot: session.slot(),
        runtime_cache: RuntimeCache::new(),
    };
    let result = compose(strategies).invoke(ctx).await;

    if result.abandon {
        tracing::debug!(round = result.round, "Session result abandoned");
    } else if let Err(err) = session.replace(result.clone()) {
        tracing::warn!(error = %err, "Session result dropped: store destroyed mid-flight");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_producer() -> Producer {
        producer(|variables: Vec<Value>| async move {
            Ok(variables.into_iter().next().unwrap_or(Value::Null))
        })
    }

    #[tokio::test]
    async fn test_successful_run_commits_and_loads() {
        let session = SessionStore::query();
        let state = run_session(
            vec![],
            &session,
            echo_producer(),
            vec![Value::from(5)],
            TriggerType::Initial,
        )
        .await
        .unwrap();
        assert_eq!(state.data, Some(Value::from(5)));
        assert!(state.loaded);
        assert_eq!(session.state(), state);
    }

    #[tokio::test]
    async fn test_producer_failure_is_data_not_err() {
        let session = SessionStore::query();
        let failing = producer(|_| async { Err(Value::from("down")) });
        let state = run_session(vec![], &session, failing, vec![], TriggerType::Manual)
            .await
            .unwrap();
        assert!(state.is_error);
        assert_eq!(state.error, Some(Value::from("down")));
        assert!(!state.loaded);
    }

    #[tokio::test]
    async fn test_mutation_rejects_automatic_trigger() {
        let session = SessionStore::mutation();
        let result = run_session(
            vec![],
            &session,
            echo_producer(),
            vec![],
            TriggerType::Initial,
        )
        .await;
        assert!(matches!(
            result,
            Err(SessionError::MutationRequiresManual { .. })
        ));
    }

    #[tokio::test]
    async fn test_mutation_allows_manual_trigger() {
        let session = SessionStore::mutation();
        let state = run_session(
            vec![],
            &session,
            echo_producer(),
            vec![Value::from(1)],
            TriggerType::Manual,
        )
        .await
        .unwrap();
        assert_eq!(state.data, Some(Value::from(1)));
    }

    #[tokio::test]
    async fn test_destroyed_session_errors() {
        let session = SessionStore::query();
        session.destroy();
        let result = run_session(
            vec![],
            &session,
            echo_producer(),
            vec![],
            TriggerType::Manual,
        )
        .await;
        assert_eq!(result, Err(SessionError::StoreDestroyed));
    }
}
