//! Reduce: accumulate successive results instead of replacing them.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

use super::context::{Strategy, StrategyContext};
use crate::session::SessionState;

/// On every non-error, non-abandoned success, replace `data` with
/// `accumulator(previous_data, new_data, (previous_state, new_state))`.
/// Enables accumulation patterns such as infinite-scroll append.
pub fn reduce<F>(accumulator: F) -> Strategy
where
    F: Fn(Option<&Value>, &Value, (&SessionState, &SessionState)) -> Value + Send + Sync + 'static,
{
    let accumulator = Arc::new(accumulator);
    Strategy::new(move |ctx: StrategyContext| {
        let accumulator = Arc::clone(&accumulator);
        async move {
            let previous = (ctx.current_state)();
            let mut result = (ctx.runner)().await;
            if !result.is_error && !result.abandon {
                if let Some(new_data) = result.data.clone() {
                    let folded = accumulator(previous.data.as_ref(), &new_data, (&previous, &result));
                    result.data = Some(folded);
                }
            }
            result
        }
        .boxed()
    })
}
