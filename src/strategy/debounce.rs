//! Debounce: collapse call bursts into one producer invocation.

use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::context::{Strategy, StrategyContext};
use crate::session::SessionState;

/// All callers of one burst share the winner's result through this
/// future. `None` means the burst was torn down before settling.
type BurstResult = Shared<BoxFuture<'static, Option<SessionState>>>;

struct Burst {
    shared: BurstResult,
    sender: Option<oneshot::Sender<SessionState>>,
}

fn new_burst() -> Burst {
    let (sender, receiver) = oneshot::channel::<SessionState>();
    Burst {
        shared: receiver.map(|result| result.ok()).boxed().shared(),
        sender: Some(sender),
    }
}

#[derive(Default)]
struct DebounceSlot {
    generation: u64,
    burst: Option<Burst>,
}

/// Trailing debounce: every call resets the timer; only the final call
/// after `duration` of silence invokes the runner. All earlier calls in
/// the burst resolve to the same shared result, tagged abandoned.
pub fn debounce(duration: Duration) -> Strategy {
    Strategy::new(move |ctx: StrategyContext| {
        async move {
            let (my_generation, shared) = ctx.slot.with::<DebounceSlot, _>(|slot| {
                slot.generation += 1;
                let burst = slot.burst.get_or_insert_with(new_burst);
                (slot.generation, burst.shared.clone())
            });
            tokio::time::sleep(duration).await;
            let winner = ctx.slot.with::<DebounceSlot, _>(|slot| {
                if slot.generation == my_generation {
                    slot.burst.take().and_then(|burst| burst.sender)
                } else {
                    None
                }
            });
            match winner {
                Some(sender) => {
                    let result = (ctx.runner)().await;
                    let _ = sender.send(result.clone());
                    result
                }
                None => abandoned(shared.await, &ctx),
            }
        }
        .boxed()
    })
}

#[derive(Default)]
struct DebounceLeadSlot {
    deadline: Option<Instant>,
    last: Option<BurstResult>,
}

/// Leading debounce: the first call in a burst invokes immediately;
/// calls inside the cool-down window are suppressed and share the
/// leading call's result, abandoned. Suppressed calls extend the window.
pub fn debounce_lead(duration: Duration) -> Strategy {
    Strategy::new(move |ctx: StrategyContext| {
        async move {
            let now = Instant::now();
            let suppressed = ctx.slot.with::<DebounceLeadSlot, _>(|slot| {
                let inside_window = slot
                    .deadline
                    .map(|deadline| now < deadline)
                    .unwrap_or(false);
                slot.deadline = Some(now + duration);
                if inside_window {
                    slot.last.clone()
                } else {
                    None
                }
            });
            match suppressed {
                Some(shared) => abandoned(shared.await, &ctx),
                None => {
                    let burst = new_burst();
                    let sender = burst.sender;
                    ctx.slot
                        .with::<DebounceLeadSlot, _>(|slot| slot.last = Some(burst.shared));
                    let result = (ctx.runner)().await;
                    if let Some(sender) = sender {
                        let _ = sender.send(result.clone());
                    }
                    result
                }
            }
        }
        .boxed()
    })
}

fn abandoned(settled: Option<SessionState>, ctx: &StrategyContext) -> SessionState {
    let mut state = settled.unwrap_or_else(|| (ctx.current_state)());
    state.abandon = true;
    state
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::super::testkit::{counting_producer, run};
    use super::*;
    use crate::session::SessionStore;

    #[tokio::test(start_paused = true)]
    async fn test_trailing_burst_collapses_to_one_invocation() {
        let session = SessionStore::query();
        let (producer, calls) = counting_producer();
        let burst = (0..5).map(|i| {
            let session = session.clone();
            let producer = producer.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(2 * i)).await;
                run(&session, vec![debounce(Duration::from_millis(50))], producer, vec![]).await
            }
        });
        let results = futures::future::join_all(burst).await;

        assert_eq!(*calls.lock(), 1);
        let abandoned: Vec<_> = results.iter().filter(|r| r.abandon).collect();
        assert_eq!(abandoned.len(), 4);
        // Every result, abandoned or not, carries the single shared value.
        for result in &results {
            assert_eq!(result.data, Some(Value::from(1)));
        }
        assert_eq!(session.state().data, Some(Value::from(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_separate_bursts_each_run() {
        let session = SessionStore::query();
        let (producer, calls) = counting_producer();
        run(&session, vec![debounce(Duration::from_millis(10))], producer.clone(), vec![]).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        run(&session, vec![debounce(Duration::from_millis(10))], producer, vec![]).await;
        assert_eq!(*calls.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leading_runs_first_and_suppresses_rest() {
        let session = SessionStore::query();
        let (producer, calls) = counting_producer();
        let burst = (0..3).map(|i| {
            let session = session.clone();
            let producer = producer.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(2 * i)).await;
                run(
                    &session,
                    vec![debounce_lead(Duration::from_millis(50))],
                    producer,
                    vec![],
                )
                .await
            }
        });
        let results = futures::future::join_all(burst).await;
        assert_eq!(*calls.lock(), 1);
        assert!(!results[0].abandon);
        assert!(results[1].abandon);
        assert!(results[2].abandon);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leading_rearms_after_window() {
        let session = SessionStore::query();
        let (producer, calls) = counting_producer();
        run(
            &session,
            vec![debounce_lead(Duration::from_millis(10))],
            producer.clone(),
            vec![],
        )
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        run(
            &session,
            vec![debounce_lead(Duration::from_millis(10))],
            producer,
            vec![],
        )
        .await;
        assert_eq!(*calls.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_call_wins_its_own_burst() {
        let session = SessionStore::query();
        let (producer, calls) = counting_producer();
        let state = run(
            &session,
            vec![debounce(Duration::from_millis(5))],
            producer,
            vec![],
        )
        .await;
        assert!(!state.abandon);
        assert_eq!(*calls.lock(), 1);
    }
}
