//! Single-flight deduplication: `once` and `block`.
//!
//! Both share one core: when the slot already holds an in-flight (or,
//! for `once`, completed) shared promise, join it instead of invoking
//! the runner, tagging the joined result as abandoned. They differ only
//! in when the slot re-arms.

use futures::future::Shared;
use futures::FutureExt;

use super::context::{Strategy, StrategyContext, StrategyFuture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RearmPolicy {
    /// Re-arm after any settlement: dedups concurrent calls only.
    Always,
    /// Re-arm only after an error: a success is served forever, a
    /// failure lets the next call retry.
    OnError,
}

#[derive(Default)]
struct SingleFlightSlot {
    inflight: Option<Shared<StrategyFuture>>,
}

enum Role {
    Run(Shared<StrategyFuture>),
    Join(Shared<StrategyFuture>),
}

fn single_flight(policy: RearmPolicy) -> Strategy {
    Strategy::new(move |ctx: StrategyContext| {
        async move {
            let role = ctx.slot.with::<SingleFlightSlot, _>(|slot| {
                if let Some(shared) = &slot.inflight {
                    Role::Join(shared.clone())
                } else {
                    let shared = (ctx.runner)().shared();
                    slot.inflight = Some(shared.clone());
                    Role::Run(shared)
                }
            });
            match role {
                Role::Join(shared) => {
                    let mut result = shared.await;
                    result.abandon = true;
                    result
                }
                Role::Run(shared) => {
                    let result = shared.await;
                    let rearm = policy == RearmPolicy::Always || result.is_error;
                    if rearm {
                        ctx.slot
                            .with::<SingleFlightSlot, _>(|slot| slot.inflight = None);
                    }
                    result
                }
            }
        }
        .boxed()
    })
}

/// Run at most once per session: subsequent calls are served the first
/// successful result, abandoned. An error re-arms so the next call can
/// retry.
pub fn once() -> Strategy {
    single_flight(RearmPolicy::OnError)
}

/// Block concurrent calls while one is in flight; any settlement
/// re-arms.
pub fn block() -> Strategy {
    single_flight(RearmPolicy::Always)
}
