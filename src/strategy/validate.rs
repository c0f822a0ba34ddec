//! Validate: gate the runner behind a predicate over the variables.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::context::{Strategy, StrategyContext};

/// Run only when the predicate holds; otherwise short-circuit to the
/// current state, abandoned.
pub fn validate<F>(predicate: F) -> Strategy
where
    F: Fn(&[Value]) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    Strategy::new(move |ctx: StrategyContext| {
        let predicate = Arc::clone(&predicate);
        async move {
            if !predicate(&ctx.variables) {
                let mut state = (ctx.current_state)();
                state.abandon = true;
                return state;
            }
            (ctx.runner)().await
        }
        .boxed()
    })
}

/// Async-predicate variant; a resolved `false` short-circuits the same
/// way as [`validate`].
pub fn validate_async<F>(predicate: F) -> Strategy
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, bool> + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    Strategy::new(move |ctx: StrategyContext| {
        let predicate = Arc::clone(&predicate);
        async move {
            if !predicate(ctx.variables.clone()).await {
                let mut state = (ctx.current_state)();
                state.abandon = true;
                return state;
            }
            (ctx.runner)().await
        }
        .boxed()
    })
}
