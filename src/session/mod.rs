//! Asynchronous session orchestration.
//!
//! A session tracks one query or mutation's lifecycle: rounds, the
//! fetching key that decides which in-flight call owns write-back,
//! loaded flags, and a bounded result cache. The session store is a
//! [`ModelStore`](crate::model::ModelStore) over [`SessionState`];
//! settled results are pushed in via direct state replacement, never via
//! instance methods.
//!
//! ```text
//! trigger ──→ run_session ──→ strategy chain ──→ producer
//!                 │                                  │
//!       fetching write-back                 settled SessionState
//!                 │                                  │
//!                 └────── committed unless abandoned ┘
//! ```

mod machine;
mod run;
mod state;
mod store;

pub use run::{producer, run_session, Producer};
pub use state::{CacheEntry, SessionState, StaleData, TriggerType};
pub use store::{SessionKind, SessionModel, SessionStore};
