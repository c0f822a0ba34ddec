//! Reactive state containers with an async session layer on top.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ strategy: compose(debounce, once, cache, ...)        │
//! │                      │                               │
//! │ session: run_session ├──→ producer (async work)      │
//! │                      ▼                               │
//! │ model: ModelStore ── versioned state + FIFO actions  │
//! │                      ▲                               │
//! │ scope: factory registry, parent-chain lookup         │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The [`model`] layer is a synchronous, reentrant-safe state container:
//! a [`model::Model`] derives an instance from a state value, named
//! methods produce the next state, and every commit bumps a version and
//! queues an action for listeners in strict FIFO order.
//!
//! The [`session`] layer tracks one asynchronous operation (a query or a
//! mutation) inside such a store, with abandonment instead of
//! cancellation: a superseded call runs to completion but its result is
//! never written back.
//!
//! The [`strategy`] layer composes policies around a session run.
//! Built-ins cover deduplication ([`strategy::once`],
//! [`strategy::block`]), timing ([`strategy::debounce`],
//! [`strategy::throttle`]), caching ([`strategy::cache`]), supersession
//! ([`strategy::latest`]), and result shaping ([`strategy::memo`],
//! [`strategy::reduce`]).
//!
//! [`scope`] ties store lifetimes to a registry with parent-chain lookup,
//! for tree-shaped ownership such as a widget hierarchy.

pub mod error;
pub mod model;
pub mod scope;
pub mod session;
pub mod strategy;

pub use error::{ScopeError, SessionError, StoreError};
pub use model::{Model, ModelStore};
pub use scope::{factory, Scope};
pub use session::{producer, run_session, SessionState, SessionStore, TriggerType};
pub use strategy::{compose, Strategy};
