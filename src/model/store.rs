//! The versioned model store and its reentrant dispatch queue.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::action::{Action, ActionKind};
use super::method::Method;
use super::Model;
use crate::error::StoreError;

/// A store listener. Identity is reference-based: the same `Arc` clone
/// counts as the same listener for subscribe/unsubscribe purposes.
pub type Listener<M> = Arc<dyn Fn(&Action<M>) + Send + Sync>;

/// Options for [`ModelStore::replace_state`].
#[derive(Debug, Clone)]
pub struct ReplaceOptions {
    /// Record the new state as the cached state. On by default.
    pub cache: bool,
    /// First-write-wins default: a no-op once any cached state exists.
    pub is_default: bool,
    /// Suppress notification even though state changed. Used for fully
    /// externally-driven updates where the caller notifies through its
    /// own channel.
    pub ignore_dispatch: bool,
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        Self {
            cache: true,
            is_default: false,
            ignore_dispatch: false,
        }
    }
}

pub(super) struct StoreInner<M: Model> {
    pub(super) state: M::State,
    pub(super) version: u64,
    pub(super) current: Arc<M>,
    pub(super) cache_state: Option<M::State>,
    pub(super) dispatches: Vec<Listener<M>>,
    pub(super) temporary_dispatches: Vec<Listener<M>>,
    pub(super) queue: VecDeque<Action<M>>,
    pub(super) dispatching: bool,
    pub(super) controlled: bool,
    pub(super) destroyed: bool,
    pub(super) methods: HashMap<String, Method<M>>,
}

/// The mutable container owning one state value, its model, and its
/// subscribers.
///
/// Cheap to clone: all clones share the same underlying store. Uses the
/// same handle-over-lock pattern as the rest of the crate; listeners are
/// always invoked with the lock released so they may freely call back
/// into the store.
pub struct ModelStore<M: Model> {
    inner: Arc<Mutex<StoreInner<M>>>,
}

impl<M: Model> std::fmt::Debug for ModelStore<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore").finish_non_exhaustive()
    }
}

impl<M: Model> Clone for ModelStore<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Model> ModelStore<M> {
    /// Create a store owning its own state.
    pub fn new(initial: M::State) -> Self {
        Self::build(initial, false)
    }

    /// Create a controlled store: method calls notify listeners with the
    /// computed next state but never commit it. State is owned by an
    /// external controller that feeds new state back asynchronously via
    /// [`replace_state`](Self::replace_state).
    pub fn new_controlled(initial: M::State) -> Self {
        Self::build(initial, true)
    }

    fn build(initial: M::State, controlled: bool) -> Self {
        let current = Arc::new(M::derive(&initial));
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                state: initial,
                version: 0,
                current,
                cache_state: None,
                dispatches: Vec::new(),
                temporary_dispatches: Vec::new(),
                queue: VecDeque::new(),
                dispatching: false,
                controlled,
                destroyed: false,
                methods: HashMap::new(),
            })),
        }
    }

    /// The current state.
    pub fn state(&self) -> M::State {
        self.inner.lock().state.clone()
    }

    /// The current version. Increments exactly once per externally
    /// observable state change.
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    /// The instance derived from the current state. Never stale: every
    /// commit replaces it before any listener observes the change.
    pub fn instance(&self) -> Arc<M> {
        Arc::clone(&self.inner.lock().current)
    }

    /// The cached state recorded by the last commit, if any.
    pub fn cache_state(&self) -> Option<M::State> {
        self.inner.lock().cache_state.clone()
    }

    /// Whether this store is controlled by an external owner.
    pub fn is_controlled(&self) -> bool {
        self.inner.lock().controlled
    }

    /// Whether this store has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// A bound method handle, memoized by name.
    ///
    /// Repeated calls with the same name return handles that compare
    /// equal and share backing storage, so callers holding onto a handle
    /// across re-derives keep a stable identity.
    pub fn method(&self, name: &str) -> Method<M> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.methods.get(name) {
            return existing.clone();
        }
        let method = Method::bind(Arc::downgrade(&self.inner), name);
        inner.methods.insert(name.to_string(), method.clone());
        method
    }

    pub(super) fn from_inner(inner: Arc<Mutex<StoreInner<M>>>) -> Self {
        Self { inner }
    }

    /// Invoke the named method on the current instance and commit the
    /// result.
    ///
    /// Destroyed stores are inert: the next state is still computed and
    /// returned, but nothing is committed and nobody is notified.
    /// Controlled stores notify without committing. Identical next state
    /// commits nothing and bumps no version.
    pub fn mutate_via(&self, method: &str, args: &[Value]) -> Result<M::State, StoreError> {
        let action = {
            let mut inner = self.inner.lock();
            let next = inner
                .current
                .invoke(method, args)
                .ok_or_else(|| StoreError::UnknownMethod {
                    method: method.to_string(),
                })?;
            if inner.destroyed {
                return Ok(next);
            }
            if inner.controlled {
                // The external controller owns the state; hand it the
                // computed transition and leave the store untouched.
                let instance = Arc::clone(&inner.current);
                Some(Action {
                    kind: ActionKind::Method(method.to_string()),
                    prev_state: inner.state.clone(),
                    state: next.clone(),
                    prev_instance: Arc::clone(&instance),
                    instance,
                })
            } else if next == inner.state {
                None
            } else {
                let prev_state = mem::replace(&mut inner.state, next.clone());
                let prev_instance = Arc::clone(&inner.current);
                inner.current = Arc::new(M::derive(&inner.state));
                inner.version += 1;
                inner.cache_state = Some(inner.state.clone());
                tracing::debug!(method = %method, version = inner.version, "Model store committed");
                Some(Action {
                    kind: ActionKind::Method(method.to_string()),
                    prev_state,
                    state: next.clone(),
                    prev_instance,
                    instance: Arc::clone(&inner.current),
                })
            }
        };

        let next = match &action {
            Some(a) => a.state.clone(),
            None => return Ok(self.state()),
        };
        if let Some(action) = action {
            self.notify(action);
        }
        Ok(next)
    }

    /// Replace state directly, not via a method call.
    ///
    /// Replacing with an identical value never bumps the version and
    /// never notifies. Errors on destroyed stores: direct replacement on
    /// a torn-down store is a wiring mistake.
    pub fn replace_state(&self, state: M::State, opts: ReplaceOptions) -> Result<(), StoreError> {
        let action = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return Err(StoreError::Destroyed);
            }
            if opts.is_default && inner.cache_state.is_some() {
                return Ok(());
            }
            if state == inner.state {
                if opts.cache && inner.cache_state.is_none() {
                    inner.cache_state = Some(state);
                }
                return Ok(());
            }
            let prev_state = mem::replace(&mut inner.state, state);
            let prev_instance = Arc::clone(&inner.current);
            inner.current = Arc::new(M::derive(&inner.state));
            inner.version += 1;
            if opts.cache {
                inner.cache_state = Some(inner.state.clone());
            }
            if opts.ignore_dispatch {
                None
            } else {
                Some(Action {
                    kind: ActionKind::Replace,
                    prev_state,
                    state: inner.state.clone(),
                    prev_instance,
                    instance: Arc::clone(&inner.current),
                })
            }
        };
        if let Some(action) = action {
            self.notify(action);
        }
        Ok(())
    }

    /// Subscribe a listener.
    ///
    /// Duplicate subscription of the same `Arc` is a no-op. For a
    /// controlled store the listener set is replaced (single-owner
    /// semantics). Listeners subscribed while a dispatch loop is running
    /// are parked and synchronized with one synthetic action after the
    /// queue drains. Subscribing to a destroyed store is a no-op.
    pub fn subscribe(&self, listener: Listener<M>) -> Subscription<M> {
        let mut inner = self.inner.lock();
        let subscription = Subscription {
            store: self.clone(),
            listener: Arc::clone(&listener),
        };
        if inner.destroyed {
            return subscription;
        }
        if inner.controlled {
            inner.dispatches.clear();
            inner.temporary_dispatches.clear();
            inner.dispatches.push(listener);
            return subscription;
        }
        let already = inner
            .dispatches
            .iter()
            .chain(inner.temporary_dispatches.iter())
            .any(|l| listener_eq(l, &listener));
        if already {
            return subscription;
        }
        if inner.dispatching {
            inner.temporary_dispatches.push(listener);
        } else {
            inner.dispatches.push(listener);
        }
        subscription
    }

    /// Unsubscribe a listener by identity.
    pub fn unsubscribe(&self, listener: &Listener<M>) {
        let mut inner = self.inner.lock();
        inner.dispatches.retain(|l| !listener_eq(l, listener));
        inner
            .temporary_dispatches
            .retain(|l| !listener_eq(l, listener));
    }

    /// Destroy the store. Idempotent. Destroyed stores keep answering
    /// reads and method computations but commit and notify nothing.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return;
        }
        inner.destroyed = true;
        inner.dispatches.clear();
        inner.temporary_dispatches.clear();
        inner.queue.clear();
        inner.cache_state = None;
        tracing::debug!(version = inner.version, "Model store destroyed");
    }

    /// Append the action to the queue and drain it unless a drain is
    /// already running higher up the stack.
    ///
    /// Listener callbacks frequently trigger further mutations; the
    /// explicit queue guarantees actions are delivered in the order they
    /// were produced, exactly once, regardless of when subscribers run.
    fn notify(&self, action: Action<M>) {
        {
            let mut inner = self.inner.lock();
            inner.queue.push_back(action);
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }
        self.drain();
    }

    fn drain(&self) {
        let mut first_panic: Option<Box<dyn Any + Send>> = None;
        // The flag must clear even if something unexpected unwinds,
        // otherwise the queue is wedged forever. On the normal exit the
        // guard is defused: the flag clears inside the same critical
        // section that observes the empty queue, so a concurrent notify
        // either lands its action before the check or finds the flag
        // already down and drains itself.
        let guard = scopeguard::guard(self.inner.clone(), |inner| {
            inner.lock().dispatching = false;
        });
        loop {
            let (action, listeners) = {
                let mut inner = guard.lock();
                match inner.queue.pop_front() {
                    Some(action) => (action, inner.dispatches.clone()),
                    None => {
                        inner.dispatching = false;
                        break;
                    }
                }
            };
            // Frozen snapshot per action: concurrent subscribe and
            // unsubscribe during delivery cannot corrupt iteration.
            for listener in &listeners {
                let result = panic::catch_unwind(AssertUnwindSafe(|| listener(&action)));
                if let Err(payload) = result {
                    if first_panic.is_none() {
                        first_panic = Some(payload);
                    }
                }
            }
        }
        let _ = scopeguard::ScopeGuard::into_inner(guard);
        let flush_panic = self.flush_temporaries();
        if let Some(payload) = first_panic.or(flush_panic) {
            panic::resume_unwind(payload);
        }
    }

    /// Deliver one synthetic no-op action to listeners that subscribed
    /// during the drain, then merge them into the main list. Returns the
    /// first panic so the caller can re-raise it alongside drain panics.
    fn flush_temporaries(&self) -> Option<Box<dyn Any + Send>> {
        let (parked, action) = {
            let mut inner = self.inner.lock();
            if inner.temporary_dispatches.is_empty() {
                return None;
            }
            let parked = mem::take(&mut inner.temporary_dispatches);
            inner.dispatches.extend(parked.iter().cloned());
            let instance = Arc::clone(&inner.current);
            let action = Action {
                kind: ActionKind::Sync,
                prev_state: inner.state.clone(),
                state: inner.state.clone(),
                prev_instance: Arc::clone(&instance),
                instance,
            };
            (parked, action)
        };
        let mut first_panic = None;
        for listener in &parked {
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener(&action)));
            if let Err(payload) = result {
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
        }
        first_panic
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.dispatches.len() + inner.temporary_dispatches.len()
    }
}

fn listener_eq<M: Model>(a: &Listener<M>, b: &Listener<M>) -> bool {
    // Fat-pointer comparison; cast through the data pointer to avoid
    // vtable-identity false negatives.
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Handle returned by [`ModelStore::subscribe`]. Unsubscribing is
/// explicit; dropping the handle keeps the listener alive.
pub struct Subscription<M: Model> {
    store: ModelStore<M>,
    listener: Listener<M>,
}

impl<M: Model> Subscription<M> {
    /// Remove the listener from the store.
    pub fn unsubscribe(self) {
        self.store.unsubscribe(&self.listener);
    }
}
