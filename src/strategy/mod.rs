//! Strategy pipeline.
//!
//! Composes an ordered list of strategies into one effective executor
//! around a base runner. The chain is built right to left: the last
//! strategy wraps the base runner, each earlier strategy wraps the next.
//! Every position gets its own durable slot, so stateful strategies
//! (debounce timers, in-flight promises, cache tables) never collide,
//! even when the same constructor is used twice with different
//! configuration.

mod cache;
mod context;
mod debounce;
mod failure;
mod latest;
mod memo;
mod reduce;
mod response;
mod single_flight;
mod throttle;
mod validate;

use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

use crate::session::SessionState;

pub use cache::{cache, CacheConfig};
pub use context::{
    CurrentState, Resolver, Runner, RuntimeCache, Slot, Strategy, StrategyContext, StrategyFuture,
};
pub use debounce::{debounce, debounce_lead};
pub use failure::{failure, on_error, FailureOutcome};
pub use latest::latest;
pub use memo::{memo, memo_with};
pub use reduce::reduce;
pub use response::{response, response_failure, response_success, Cleanup};
pub use single_flight::{block, once};
pub use throttle::throttle;
pub use validate::{validate, validate_async};

/// Slot table for a composed chain: one child slot per position.
#[derive(Default)]
struct ComposedSlots {
    slots: Vec<Slot>,
}

/// Compose strategies into a single strategy.
///
/// After the full chain settles, the composer recomputes the monotone
/// loaded flags; individual strategies are not responsible for that
/// bookkeeping. Composition nests: a composed strategy occupies one
/// position (and one slot) of an outer chain.
pub fn compose(strategies: Vec<Strategy>) -> Strategy {
    Strategy::new(move |ctx: StrategyContext| {
        let slots = ctx.slot.with::<ComposedSlots, _>(|table| {
            while table.slots.len() < strategies.len() {
                table.slots.push(Slot::new());
            }
            table.slots.clone()
        });
        let mut runner = Arc::clone(&ctx.runner);
        for (position, strategy) in strategies.iter().enumerate().rev() {
            let link = StrategyContext {
                variables: ctx.variables.clone(),
                current_state: Arc::clone(&ctx.current_state),
                resolve: Arc::clone(&ctx.resolve),
                runner,
                slot: slots[position].clone(),
                runtime_cache: ctx.runtime_cache.clone(),
            };
            let strategy = strategy.clone();
            runner = Arc::new(move || strategy.invoke(link.clone()));
        }
        runner().map(SessionState::finalize_loaded).boxed()
    })
}

/// Default fingerprint of call variables: structural stringification.
/// The failure fallback is not valid JSON, so it can never collide with
/// a real fingerprint.
pub(crate) fn fingerprint(variables: &[Value]) -> String {
    serde_json::to_string(variables).unwrap_or_else(|_| String::from("<unserializable>"))
}

#[cfg(test)]
pub(crate) mod testkit {
    //! Shared scaffolding for strategy unit tests: a real session store
    //! wired to a scripted producer.

    use std::sync::Arc;

    use futures::FutureExt;
    use parking_lot::Mutex;
    use serde_json::Value;

    use super::*;
    use crate::session::{run_session, Producer, SessionState, SessionStore, TriggerType};

    /// Producer resolving to successive integers, counting invocations.
    pub fn counting_producer() -> (Producer, Arc<Mutex<u64>>) {
        let calls = Arc::new(Mutex::new(0u64));
        let seen = Arc::clone(&calls);
        let producer: Producer = Arc::new(move |_vars: Vec<Value>| {
            let seen = Arc::clone(&seen);
            async move {
                let mut count = seen.lock();
                *count += 1;
                Ok(Value::from(*count))
            }
            .boxed()
        });
        (producer, calls)
    }

    /// Run one manual trigger against a query session.
    pub async fn run(
        session: &SessionStore,
        strategies: Vec<Strategy>,
        producer: Producer,
        variables: Vec<Value>,
    ) -> SessionState {
        run_session(
            strategies,
            session,
            producer,
            variables,
            TriggerType::Manual,
        )
        .await
        .expect("contract-clean session run")
    }
}
