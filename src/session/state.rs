//! Session state shape.

use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

/// What kind of event triggered a session run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    /// First automatic run after mount.
    Initial,
    /// Automatic re-run (dependency change, window refocus, polling).
    Refresh,
    /// Explicit call from user code.
    Manual,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Initial => "initial",
            TriggerType::Refresh => "refresh",
            TriggerType::Manual => "manual",
        }
    }
}

/// One keyed entry in the session's bounded result cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub data: Value,
    pub last_update_time: Instant,
}

/// Best-effort display snapshot retained while a newer fetch replaces an
/// in-flight one.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleData {
    pub data: Value,
}

/// The full state of one query/mutation session.
///
/// `round` counts settled (non-fetching) transitions only. `loaded` and
/// `session_loaded` are monotone: once true they never revert for this
/// store's lifetime. A result carrying `abandon = true` is terminal and
/// informational; it is returned to the superseded caller but never
/// written back into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub data: Option<Value>,
    pub variables: Vec<Value>,
    pub error: Option<Value>,
    pub is_error: bool,
    pub is_fetching: bool,
    /// Key of the call that currently owns write-back.
    pub fetching_key: Option<Uuid>,
    /// Key recorded at fetch start; compared against the settling caller
    /// to decide abandonment.
    pub final_fetching_key: Option<Uuid>,
    pub trigger_type: Option<TriggerType>,
    pub loaded: bool,
    pub session_loaded: bool,
    pub abandon: bool,
    /// Set when the value was served from the session cache instead of
    /// the producer.
    pub visited: bool,
    pub round: u64,
    pub last_successful_round: u64,
    pub last_failed_round: u64,
    pub last_successful_variables: Option<Vec<Value>>,
    pub last_failed_variables: Option<Vec<Value>>,
    pub stale: Option<StaleData>,
    /// Keyed result cache, ordered by write recency (oldest first).
    pub cache: Vec<(String, CacheEntry)>,
    /// Cache capacity; a monotone ratchet, it can only grow.
    pub max_cache_capacity: usize,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            data: None,
            variables: Vec::new(),
            error: None,
            is_error: false,
            is_fetching: false,
            fetching_key: None,
            final_fetching_key: None,
            trigger_type: None,
            loaded: false,
            session_loaded: false,
            abandon: false,
            visited: false,
            round: 0,
            last_successful_round: 0,
            last_failed_round: 0,
            last_successful_variables: None,
            last_failed_variables: None,
            stale: None,
            cache: Vec::new(),
            max_cache_capacity: 1,
        }
    }
}
