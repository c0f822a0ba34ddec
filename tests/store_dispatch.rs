//! Integration tests for the model store's reentrant dispatch queue.
//!
//! Listeners here deliberately mutate the store they observe; the queue
//! must deliver every action exactly once, in production order, without
//! recursing.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde_json::Value;

use flowstate::model::{Action, Model, ModelStore};

#[derive(Clone, PartialEq, Debug, Default)]
struct CounterState {
    count: i64,
}

struct Counter {
    state: CounterState,
}

impl Model for Counter {
    type State = CounterState;

    fn derive(state: &CounterState) -> Self {
        Self {
            state: state.clone(),
        }
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Option<CounterState> {
        match method {
            "increase" => Some(CounterState {
                count: self.state.count + 1,
            }),
            "add" => {
                let delta = args.first().and_then(Value::as_i64)?;
                Some(CounterState {
                    count: self.state.count + delta,
                })
            }
            "same" => Some(self.state.clone()),
            _ => None,
        }
    }
}

fn counter() -> ModelStore<Counter> {
    ModelStore::new(CounterState::default())
}

#[test]
fn thousand_reentrant_mutations_stay_ordered() {
    let store = counter();
    let seen = Arc::new(Mutex::new(Vec::with_capacity(1000)));
    let sink = Arc::clone(&seen);
    let reentrant = store.clone();
    store.subscribe(Arc::new(move |action: &Action<Counter>| {
        sink.lock().push(action.state.count);
        if action.state.count < 1000 {
            reentrant.mutate_via("increase", &[]).unwrap();
        }
    }));
    store.mutate_via("increase", &[]).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1000);
    assert_eq!(*seen, (1..=1000).collect::<Vec<i64>>());
    assert_eq!(store.state().count, 1000);
    assert_eq!(store.version(), 1000);
}

#[test]
fn version_counts_observable_changes_only() {
    let store = counter();
    store.mutate_via("increase", &[]).unwrap();
    store.mutate_via("same", &[]).unwrap();
    store.mutate_via("add", &[Value::from(0)]).unwrap();
    store.mutate_via("add", &[Value::from(2)]).unwrap();
    assert_eq!(store.state().count, 3);
    assert_eq!(store.version(), 2);
}

#[test]
fn unsubscribed_listener_still_sees_in_flight_action() {
    // Delivery iterates a frozen snapshot per action: removing a peer
    // mid-dispatch affects the next action, not the current one.
    let store = counter();
    let observed = Arc::new(Mutex::new(0u64));

    let sink = Arc::clone(&observed);
    let observer: flowstate::model::Listener<Counter> = Arc::new(move |_action| {
        *sink.lock() += 1;
    });
    let remover_store = store.clone();
    let target = Arc::clone(&observer);
    store.subscribe(Arc::new(move |_action: &Action<Counter>| {
        remover_store.unsubscribe(&target);
    }));
    store.subscribe(Arc::clone(&observer));

    store.mutate_via("increase", &[]).unwrap();
    assert_eq!(*observed.lock(), 1);
    store.mutate_via("increase", &[]).unwrap();
    assert_eq!(*observed.lock(), 1);
}

#[test]
fn subscription_handle_unsubscribes() {
    let store = counter();
    let hits = Arc::new(Mutex::new(0u64));
    let sink = Arc::clone(&hits);
    let subscription = store.subscribe(Arc::new(move |_action: &Action<Counter>| {
        *sink.lock() += 1;
    }));
    store.mutate_via("increase", &[]).unwrap();
    subscription.unsubscribe();
    store.mutate_via("increase", &[]).unwrap();
    assert_eq!(*hits.lock(), 1);
}

#[test]
fn concurrent_mutators_deliver_every_action_exactly_once() {
    let store = counter();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.subscribe(Arc::new(move |action: &Action<Counter>| {
        sink.lock().push(action.state.count);
    }));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    store.mutate_via("increase", &[]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut seen = seen.lock().clone();
    assert_eq!(store.state().count, 200);
    assert_eq!(store.version(), 200);
    // Interleaving across threads is unordered, but every committed
    // action is delivered exactly once.
    seen.sort_unstable();
    assert_eq!(seen, (1..=200).collect::<Vec<i64>>());
}

#[test]
fn notification_is_never_stranded_behind_a_finishing_drain() {
    // Two racing mutators on a fresh store, many rounds: if one drain
    // loop exits while the other thread's action is being enqueued, that
    // action must still be delivered, by one thread or the other.
    for round in 0..2000 {
        let store = counter();
        let delivered = Arc::new(Mutex::new(0u64));
        let sink = Arc::clone(&delivered);
        store.subscribe(Arc::new(move |_action: &Action<Counter>| {
            *sink.lock() += 1;
        }));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    store.mutate_via("increase", &[]).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.version(), 2, "round {round}: commit lost");
        assert_eq!(*delivered.lock(), 2, "round {round}: notification lost");
    }
}

#[test]
fn destroyed_store_answers_reads_but_commits_nothing() {
    let store = counter();
    store.mutate_via("add", &[Value::from(5)]).unwrap();
    store.destroy();

    let computed = store.mutate_via("increase", &[]).unwrap();
    assert_eq!(computed.count, 6);
    assert_eq!(store.state().count, 5);
    assert_eq!(store.version(), 1);
    assert!(store.is_destroyed());
}
