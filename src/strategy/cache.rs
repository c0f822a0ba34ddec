//! Keyed, bounded, stale-time result cache.
//!
//! The table lives in `SessionState::cache`, so it survives exactly as
//! long as the session store does and is visible to the binding layer.
//! Eviction is by write recency (append and truncate oldest), not by
//! read recency: re-reading an entry does not protect it.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::time::Instant;

use super::context::{Strategy, StrategyContext};
use super::fingerprint;
use crate::session::CacheEntry;

/// Configuration for [`cache`].
#[derive(Clone)]
pub struct CacheConfig {
    /// Fingerprint of call variables; defaults to structural
    /// stringification.
    pub key: Option<Arc<dyn Fn(&[Value]) -> String + Send + Sync>>,
    /// How long an entry stays fresh. `None` means entries are never
    /// served without revalidation (they still back error fallback).
    pub stale_time: Option<Duration>,
    /// Requested table capacity. Capacity is a monotone ratchet: the
    /// effective capacity never shrinks across invocations.
    pub capacity: usize,
    /// Treat entries as permanently fresh regardless of age.
    pub static_data: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key: None,
            stale_time: None,
            capacity: 1,
            static_data: false,
        }
    }
}

/// Serve fresh entries without running the producer; write successful
/// results into the bounded table; fall back to the last known-good
/// data on error.
pub fn cache(config: CacheConfig) -> Strategy {
    Strategy::new(move |ctx: StrategyContext| {
        let config = config.clone();
        async move {
            let print = match &config.key {
                Some(key_fn) => key_fn(&ctx.variables),
                None => fingerprint(&ctx.variables),
            };
            let state = (ctx.current_state)();
            let capacity = config.capacity.max(state.max_cache_capacity);
            let hit = state
                .cache
                .iter()
                .find(|(key, _)| *key == print)
                .map(|(_, entry)| entry.clone());

            if let Some(entry) = &hit {
                let fresh = config.static_data
                    || config
                        .stale_time
                        .map(|window| Instant::now() < entry.last_update_time + window)
                        .unwrap_or(false);
                if fresh {
                    let mut result = (ctx.resolve)(Ok(entry.data.clone()));
                    result.visited = true;
                    result.max_cache_capacity = capacity;
                    return result;
                }
            }

            let mut result = (ctx.runner)().await;
            if result.abandon {
                return result;
            }
            result.max_cache_capacity = capacity;
            if !result.is_error {
                if let Some(data) = result.data.clone() {
                    result.cache.retain(|(key, _)| *key != print);
                    result.cache.push((
                        print,
                        CacheEntry {
                            data,
                            last_update_time: Instant::now(),
                        },
                    ));
                    while result.cache.len() > capacity {
                        result.cache.remove(0);
                    }
                }
            } else if let Some(entry) = hit {
                // Error settlement: keep showing the last known-good data.
                result.data = Some(entry.data);
            }
            result
        }
        .boxed()
    })
}
