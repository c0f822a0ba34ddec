//! Throttle: short-circuit repeated identical calls inside a cool-down
//! window.

use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;

use super::context::{Strategy, StrategyContext};
use super::fingerprint;

#[derive(Default)]
struct ThrottleSlot {
    fingerprint: Option<String>,
    deadline: Option<Instant>,
}

/// If the call's variables are structurally unchanged from the last
/// accepted call and the cool-down window is still open, resolve to the
/// current state without abandonment noise. Otherwise run and refresh
/// the window. Changed variables always run, window or not.
pub fn throttle(duration: Duration) -> Strategy {
    Strategy::new(move |ctx: StrategyContext| {
        async move {
            let print = fingerprint(&ctx.variables);
            let now = Instant::now();
            let hold = ctx.slot.with::<ThrottleSlot, _>(|slot| {
                matches!(
                    (&slot.fingerprint, &slot.deadline),
                    (Some(prev), Some(deadline)) if *prev == print && now < *deadline
                )
            });
            if hold {
                return (ctx.current_state)();
            }
            let result = (ctx.runner)().await;
            ctx.slot.with::<ThrottleSlot, _>(|slot| {
                slot.fingerprint = Some(print);
                slot.deadline = Some(Instant::now() + duration);
            });
            result
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;

    use super::super::testkit::{counting_producer, run};
    use super::*;
    use crate::session::SessionStore;

    #[tokio::test(start_paused = true)]
    async fn test_repeat_call_in_window_short_circuits() {
        let session = SessionStore::query();
        let (producer, calls) = counting_producer();
        let vars = vec![Value::from("q")];
        let first = run(
            &session,
            vec![throttle(Duration::from_millis(50))],
            producer.clone(),
            vars.clone(),
        )
        .await;
        let second = run(
            &session,
            vec![throttle(Duration::from_millis(50))],
            producer,
            vars,
        )
        .await;
        assert_eq!(*calls.lock(), 1);
        assert!(!second.abandon);
        assert_eq!(second.data, first.data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_variables_bypass_window() {
        let session = SessionStore::query();
        let (producer, calls) = counting_producer();
        run(
            &session,
            vec![throttle(Duration::from_millis(50))],
            producer.clone(),
            vec![Value::from(1)],
        )
        .await;
        run(
            &session,
            vec![throttle(Duration::from_millis(50))],
            producer,
            vec![Value::from(2)],
        )
        .await;
        assert_eq!(*calls.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_allows_rerun() {
        let session = SessionStore::query();
        let (producer, calls) = counting_producer();
        let vars = vec![Value::from("q")];
        run(
            &session,
            vec![throttle(Duration::from_millis(20))],
            producer.clone(),
            vars.clone(),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        run(
            &session,
            vec![throttle(Duration::from_millis(20))],
            producer,
            vars,
        )
        .await;
        assert_eq!(*calls.lock(), 2);
    }
}
