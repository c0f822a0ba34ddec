//! Latest-wins: superseded calls keep their data but are abandoned.

use futures::FutureExt;

use super::context::{Strategy, StrategyContext};

#[derive(Default)]
struct LatestSlot {
    counter: u64,
    current: u64,
}

/// Assign each call a monotonically increasing id; when the runner
/// resolves, a call that is no longer the newest is tagged abandoned.
/// The data is still returned so the caller can inspect it, but it is
/// never committed.
pub fn latest() -> Strategy {
    Strategy::new(|ctx: StrategyContext| {
        async move {
            let my_id = ctx.slot.with::<LatestSlot, _>(|slot| {
                slot.counter += 1;
                slot.current = slot.counter;
                slot.counter
            });
            let mut result = (ctx.runner)().await;
            let superseded = ctx.slot.with::<LatestSlot, _>(|slot| slot.current != my_id);
            if superseded {
                result.abandon = true;
            }
            result
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::FutureExt;
    use serde_json::Value;

    use super::super::testkit::run;
    use super::*;
    use crate::session::{Producer, SessionStore};

    fn delayed_producer() -> Producer {
        Arc::new(move |vars: Vec<Value>| {
            async move {
                let delay = vars
                    .first()
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(vars.into_iter().next().unwrap_or(Value::Null))
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_first_call_is_superseded() {
        let session = SessionStore::query();
        let producer = delayed_producer();
        let slow = run(
            &session,
            vec![latest()],
            producer.clone(),
            vec![Value::from(50u64)],
        );
        let fast = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            run(
                &session,
                vec![latest()],
                producer.clone(),
                vec![Value::from(10u64)],
            )
            .await
        };
        let (slow, fast) = tokio::join!(slow, fast);
        assert!(slow.abandon);
        assert!(!fast.abandon);
        assert_eq!(session.state().data, Some(Value::from(10u64)));
    }
}
