//! Response effects: run a side effect once per settled round.
//!
//! An effect may hand back a cleanup closure. The cleanup runs before
//! the next firing of the same effect, or on slot teardown when the
//! session store is destroyed, whichever comes first.

use std::sync::Arc;

use futures::FutureExt;

use super::context::{Strategy, StrategyContext};
use crate::session::SessionState;

/// Teardown handler returned by a response effect.
pub type Cleanup = Box<dyn FnOnce() + Send>;

type Effect = Arc<dyn Fn(&SessionState) -> Option<Cleanup> + Send + Sync>;

#[derive(Clone, Copy)]
enum Filter {
    Any,
    Success,
    Failure,
}

impl Filter {
    fn applies(self, state: &SessionState) -> bool {
        match self {
            Filter::Any => true,
            Filter::Success => !state.is_error,
            Filter::Failure => state.is_error,
        }
    }
}

#[derive(Default)]
struct ResponseSlot {
    last_round: Option<u64>,
    cleanup: Option<Cleanup>,
}

impl Drop for ResponseSlot {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

fn respond(filter: Filter, effect: Effect) -> Strategy {
    Strategy::new(move |ctx: StrategyContext| {
        let effect = Arc::clone(&effect);
        async move {
            let result = (ctx.runner)().await;
            if !result.abandon && result.round > 0 {
                let changed = ctx
                    .slot
                    .with::<ResponseSlot, _>(|slot| slot.last_round != Some(result.round));
                if changed {
                    ctx.slot
                        .with::<ResponseSlot, _>(|slot| slot.last_round = Some(result.round));
                    if filter.applies(&result) {
                        let pending = ctx.slot.with::<ResponseSlot, _>(|slot| slot.cleanup.take());
                        if let Some(cleanup) = pending {
                            cleanup();
                        }
                        let next = effect(&result);
                        ctx.slot.with::<ResponseSlot, _>(|slot| slot.cleanup = next);
                    }
                }
            }
            result
        }
        .boxed()
    })
}

/// Run the effect on every settled round, success or failure.
pub fn response<F>(effect: F) -> Strategy
where
    F: Fn(&SessionState) -> Option<Cleanup> + Send + Sync + 'static,
{
    respond(Filter::Any, Arc::new(effect))
}

/// Run the effect only on successful settlements.
pub fn response_success<F>(effect: F) -> Strategy
where
    F: Fn(&SessionState) -> Option<Cleanup> + Send + Sync + 'static,
{
    respond(Filter::Success, Arc::new(effect))
}

/// Run the effect only on failed settlements.
pub fn response_failure<F>(effect: F) -> Strategy
where
    F: Fn(&SessionState) -> Option<Cleanup> + Send + Sync + 'static,
{
    respond(Filter::Failure, Arc::new(effect))
}
