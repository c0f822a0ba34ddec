//! Hierarchical store registry.
//!
//! Maps a model factory's identity to its live store. Scopes form a tree:
//! a lookup that misses in the invoking scope falls back to the parent,
//! so logically shared stores are found by identity without any global
//! singleton. Lifecycle is tied to the creating context and torn down
//! explicitly.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ScopeError;
use crate::model::{Model, ModelStore, ReplaceOptions};

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one model factory. Clones of a factory
/// share the identity; two separately constructed factories never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactoryId(u64);

impl FactoryId {
    fn next() -> Self {
        Self(NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A declaration of "a store for model `M` seeded with this state".
///
/// The factory itself is inert; a [`Scope`] instantiates it. Identity, not
/// structure, keys the registry: cloning preserves identity.
pub struct ModelFactory<M: Model> {
    id: FactoryId,
    initial: M::State,
}

impl<M: Model> Clone for ModelFactory<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            initial: self.initial.clone(),
        }
    }
}

/// Declare a factory for model `M` with the given initial state.
pub fn factory<M: Model>(initial: M::State) -> ModelFactory<M> {
    ModelFactory {
        id: FactoryId::next(),
        initial,
    }
}

impl<M: Model> ModelFactory<M> {
    /// This factory's identity.
    pub fn id(&self) -> FactoryId {
        self.id
    }

    /// Wrap into a scope entry.
    pub fn entry(&self) -> ScopeEntry {
        ScopeEntry::Factory(Arc::new(self.clone()))
    }
}

/// Type-erased view of a factory, so one registry can hold stores of
/// heterogeneous model types.
pub trait AnyFactory: Send + Sync {
    fn id(&self) -> FactoryId;
    fn create(&self) -> Box<dyn AnyStore>;
    /// Re-seed a retained store with this factory's initial state as a
    /// first-write-wins default, preserving any state it already holds.
    fn reseed(&self, store: &dyn AnyStore) -> Result<(), ScopeError>;
}

impl<M: Model> AnyFactory for ModelFactory<M> {
    fn id(&self) -> FactoryId {
        self.id
    }

    fn create(&self) -> Box<dyn AnyStore> {
        Box::new(ModelStore::<M>::new(self.initial.clone()))
    }

    fn reseed(&self, store: &dyn AnyStore) -> Result<(), ScopeError> {
        let store = store
            .as_any()
            .downcast_ref::<ModelStore<M>>()
            .ok_or(ScopeError::TypeMismatch)?;
        // Destroyed retained stores stay inert; nothing to re-seed.
        if store.is_destroyed() {
            return Ok(());
        }
        store
            .replace_state(
                self.initial.clone(),
                ReplaceOptions {
                    is_default: true,
                    ..ReplaceOptions::default()
                },
            )
            .map_err(|_| ScopeError::TypeMismatch)?;
        Ok(())
    }
}

/// Type-erased view of a live store held by a scope.
pub trait AnyStore: Send + Sync {
    fn destroy(&self);
    fn as_any(&self) -> &dyn Any;
}

impl<M: Model> AnyStore for ModelStore<M> {
    fn destroy(&self) {
        ModelStore::destroy(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A possibly nested declaration of factories. Nesting is organizational
/// only; the scope flattens it into one registry.
pub enum ScopeEntry {
    Factory(Arc<dyn AnyFactory>),
    Group(Vec<ScopeEntry>),
}

impl ScopeEntry {
    fn flatten_into(&self, out: &mut Vec<Arc<dyn AnyFactory>>) {
        match self {
            ScopeEntry::Factory(factory) => out.push(Arc::clone(factory)),
            ScopeEntry::Group(entries) => {
                for entry in entries {
                    entry.flatten_into(out);
                }
            }
        }
    }
}

fn flatten(entries: &[ScopeEntry]) -> Vec<Arc<dyn AnyFactory>> {
    let mut out = Vec::new();
    for entry in entries {
        entry.flatten_into(&mut out);
    }
    out
}

struct ScopeInner {
    registry: Mutex<HashMap<FactoryId, Box<dyn AnyStore>>>,
    parent: Option<Scope>,
}

/// A node in the scope tree. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Build a scope from factory declarations, optionally chained to a
    /// parent for fallback lookup.
    pub fn new(entries: &[ScopeEntry], parent: Option<Scope>) -> Self {
        let mut registry = HashMap::new();
        for factory in flatten(entries) {
            registry.entry(factory.id()).or_insert_with(|| factory.create());
        }
        Self {
            inner: Arc::new(ScopeInner {
                registry: Mutex::new(registry),
                parent,
            }),
        }
    }

    /// Resolve the store for a factory, walking up the parent chain.
    ///
    /// Absence at the root is an error: mandatory lookups surface
    /// integration mistakes instead of silently defaulting.
    pub fn find<M: Model>(&self, factory: &ModelFactory<M>) -> Result<ModelStore<M>, ScopeError> {
        let mut cursor = Some(self.clone());
        while let Some(scope) = cursor {
            let registry = scope.inner.registry.lock();
            if let Some(store) = registry.get(&factory.id()) {
                return store
                    .as_any()
                    .downcast_ref::<ModelStore<M>>()
                    .cloned()
                    .ok_or(ScopeError::TypeMismatch);
            }
            drop(registry);
            cursor = scope.inner.parent.clone();
        }
        Err(ScopeError::NotFound)
    }

    /// Diff the registry against a new declaration list.
    ///
    /// Removed factories have their stores destroyed, added ones are
    /// created, retained ones keep their store and state (the new initial
    /// state is applied as a first-write-wins default). This supports
    /// dynamic re-scoping without losing in-flight state.
    pub fn update(&self, entries: &[ScopeEntry]) -> Result<(), ScopeError> {
        let next = flatten(entries);
        let mut registry = self.inner.registry.lock();

        let keep: HashMap<FactoryId, &Arc<dyn AnyFactory>> =
            next.iter().map(|f| (f.id(), f)).collect();
        let removed: Vec<FactoryId> = registry
            .keys()
            .filter(|id| !keep.contains_key(id))
            .copied()
            .collect();
        for id in removed {
            if let Some(store) = registry.remove(&id) {
                store.destroy();
                tracing::debug!(factory = id.0, "Scope store destroyed on update");
            }
        }

        for factory in &next {
            match registry.get(&factory.id()) {
                Some(store) => factory.reseed(store.as_ref())?,
                None => {
                    registry.insert(factory.id(), factory.create());
                    tracing::debug!(factory = factory.id().0, "Scope store created on update");
                }
            }
        }
        Ok(())
    }

    /// Destroy every store owned by this scope (parents untouched).
    /// Idempotent.
    pub fn destroy(&self) {
        let mut registry = self.inner.registry.lock();
        for store in registry.values() {
            store.destroy();
        }
        registry.clear();
    }
}
