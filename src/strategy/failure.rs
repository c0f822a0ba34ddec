//! Error and failure interception.
//!
//! Stacked interceptors coordinate through the per-invocation runtime
//! cache so exactly one of them handles a given settlement. The outermost
//! strategy enters the chain first and therefore drives; the innermost
//! registered handler gets the first shot at the error, and a rethrow
//! walks outward to earlier-registered handlers.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use uuid::Uuid;

use super::context::{Strategy, StrategyContext};

/// What a `failure` handler did with the error.
pub enum FailureOutcome {
    /// Handled: the error state is cleared; optionally substitute data.
    Resolved(Option<Value>),
    /// Not handled here; pass to the next handler up the chain.
    Rethrow,
}

type ErrorHandler = Arc<dyn Fn(&Value) + Send + Sync>;
type FailureHandler = Arc<dyn Fn(&Value) -> FailureOutcome + Send + Sync>;

#[derive(Default)]
struct ErrorOwner {
    owner: Option<Uuid>,
}

/// Observe producer failures. When several `on_error` strategies are
/// stacked, only the outermost one invokes its callback.
pub fn on_error<F>(handler: F) -> Strategy
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    let handler: ErrorHandler = Arc::new(handler);
    let id = Uuid::new_v4();
    Strategy::new(move |ctx: StrategyContext| {
        let handler = Arc::clone(&handler);
        async move {
            ctx.runtime_cache.with::<ErrorOwner, _>("error.owner", |o| {
                o.owner.get_or_insert(id);
            });
            let result = (ctx.runner)().await;
            if result.is_error && !result.abandon {
                let owns = ctx
                    .runtime_cache
                    .with::<ErrorOwner, _>("error.owner", |o| o.owner == Some(id));
                if owns {
                    if let Some(error) = &result.error {
                        handler(error);
                    }
                }
            }
            result
        }
        .boxed()
    })
}

#[derive(Default)]
struct FailureChain {
    handlers: Vec<(Uuid, FailureHandler)>,
}

/// Intercept producer failures with recovery. A handler may resolve the
/// error (clearing the error state, optionally substituting data) or
/// rethrow to an earlier-registered `failure` strategy's handler.
pub fn failure<F>(handler: F) -> Strategy
where
    F: Fn(&Value) -> FailureOutcome + Send + Sync + 'static,
{
    let handler: FailureHandler = Arc::new(handler);
    let id = Uuid::new_v4();
    Strategy::new(move |ctx: StrategyContext| {
        let handler = Arc::clone(&handler);
        async move {
            ctx.runtime_cache.with::<FailureChain, _>("failure.chain", |chain| {
                chain.handlers.push((id, Arc::clone(&handler)));
            });
            let mut result = (ctx.runner)().await;
            if result.is_error && !result.abandon {
                let (drives, handlers) = ctx
                    .runtime_cache
                    .with::<FailureChain, _>("failure.chain", |chain| {
                        (
                            chain.handlers.first().map(|(i, _)| *i) == Some(id),
                            chain
                                .handlers
                                .iter()
                                .map(|(_, h)| Arc::clone(h))
                                .collect::<Vec<_>>(),
                        )
                    });
                if drives {
                    if let Some(error) = result.error.clone() {
                        for handler in handlers.iter().rev() {
                            match handler(&error) {
                                FailureOutcome::Resolved(data) => {
                                    result.is_error = false;
                                    result.error = None;
                                    if let Some(data) = data {
                                        result.data = Some(data);
                                    }
                                    break;
                                }
                                FailureOutcome::Rethrow => continue,
                            }
                        }
                    }
                }
            }
            result
        }
        .boxed()
    })
}
