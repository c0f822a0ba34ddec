//! Strategy invocation context: durable slots, the per-call runtime
//! cache, and the runner chain types.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;

use crate::session::SessionState;

/// The future every strategy and runner resolves to.
pub type StrategyFuture = BoxFuture<'static, SessionState>;

/// "Everything after me" in the chain: calling it runs the rest of the
/// pipeline down to the base producer.
pub type Runner = Arc<dyn Fn() -> StrategyFuture + Send + Sync>;

/// Reads the session store's current state.
pub type CurrentState = Arc<dyn Fn() -> SessionState + Send + Sync>;

/// Settles the current state with an outcome on behalf of the invoking
/// call, without running the producer. Used by short-circuiting
/// strategies such as the cache.
pub type Resolver = Arc<dyn Fn(Result<Value, Value>) -> SessionState + Send + Sync>;

/// A composable policy wrapping an asynchronous runner.
#[derive(Clone)]
pub struct Strategy {
    run: Arc<dyn Fn(StrategyContext) -> StrategyFuture + Send + Sync>,
}

impl Strategy {
    pub fn new(run: impl Fn(StrategyContext) -> StrategyFuture + Send + Sync + 'static) -> Self {
        Self { run: Arc::new(run) }
    }

    pub fn invoke(&self, ctx: StrategyContext) -> StrategyFuture {
        (self.run)(ctx)
    }
}

/// Everything one strategy sees for one invocation.
#[derive(Clone)]
pub struct StrategyContext {
    /// The variables of this call.
    pub variables: Vec<Value>,
    pub current_state: CurrentState,
    pub runner: Runner,
    pub resolve: Resolver,
    /// Durable slot exclusively owned by this strategy's position in the
    /// chain; survives across invocations of the session.
    pub slot: Slot,
    /// Ephemeral key-value store created fresh per top-level invocation
    /// and shared read/write across all strategies of that one call.
    pub runtime_cache: RuntimeCache,
}

/// A typed single-value cell.
///
/// Each pipeline position owns exactly one slot; two strategies never
/// share one. A type mismatch therefore means two strategies were wired
/// to the same position, which is a programming error and panics with a
/// descriptive message instead of silently defaulting.
#[derive(Clone, Default)]
pub struct Slot {
    inner: Arc<Mutex<Option<Box<dyn Any + Send>>>>,
}

impl Slot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the slot's typed state, initializing it on first
    /// access.
    pub fn with<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Any + Default + Send,
    {
        let mut cell = self.inner.lock();
        let boxed = cell.get_or_insert_with(|| Box::new(T::default()) as Box<dyn Any + Send>);
        match boxed.downcast_mut::<T>() {
            Some(state) => f(state),
            None => panic!(
                "strategy slot corruption: expected {}, found other state; \
                 each pipeline position owns exactly one slot",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Drop the slot's state. Runs the state's `Drop`, which is how
    /// pending response-effect cleanups fire on teardown.
    pub fn clear(&self) {
        self.inner.lock().take();
    }
}

/// The shared per-invocation cache, keyed by strategy-defined strings.
/// Typed the same way as [`Slot`]; used for cross-strategy coordination
/// such as "has a higher-priority error handler already claimed this
/// settlement".
#[derive(Clone, Default)]
pub struct RuntimeCache {
    inner: Arc<Mutex<HashMap<String, Box<dyn Any + Send>>>>,
}

impl RuntimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Any + Default + Send,
    {
        let mut map = self.inner.lock();
        let boxed = map
            .entry(key.to_string())
            .or_insert_with(|| Box::new(T::default()) as Box<dyn Any + Send>);
        match boxed.downcast_mut::<T>() {
            Some(state) => f(state),
            None => panic!(
                "runtime cache corruption: key '{key}' holds a different type than {}",
                std::any::type_name::<T>()
            ),
        }
    }
}
