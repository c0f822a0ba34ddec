//! Pure session transitions.
//!
//! The state machine is `idle → fetching → settled(success|error)`, with
//! abandonment as an orthogonal marker on result values rather than a
//! store state. All transitions consume the state and return a new one,
//! in the same style as the model reducers.

use serde_json::Value;
use uuid::Uuid;

use super::state::{SessionState, StaleData, TriggerType};

impl SessionState {
    /// Transition into fetching on behalf of `key`.
    ///
    /// The latest starter takes ownership of write-back: its key is
    /// stashed as both `fetching_key` and `final_fetching_key`, which is
    /// what later condemns any still-running older call to abandonment.
    /// If a fetch was already in flight, its visible data is retained as
    /// a stale snapshot for best-effort display during the new fetch.
    pub(crate) fn start_fetch(
        mut self,
        key: Uuid,
        trigger: TriggerType,
        variables: Vec<Value>,
    ) -> Self {
        if self.is_fetching {
            if let Some(data) = self.data.clone() {
                self.stale = Some(StaleData { data });
            }
        }
        self.is_fetching = true;
        self.fetching_key = Some(key);
        self.final_fetching_key = Some(key);
        self.trigger_type = Some(trigger);
        self.variables = variables;
        self.abandon = false;
        self.visited = false;
        self
    }

    /// Settle on behalf of `key` with the producer's outcome.
    ///
    /// A caller that no longer owns the fetching key gets its outcome
    /// merged into an `abandon = true` copy: informational for the caller,
    /// never committed. The owning caller clears fetching, bumps the
    /// round, and records the success/failure bookkeeping.
    pub(crate) fn settle(mut self, key: Uuid, outcome: Result<Value, Value>) -> Self {
        let superseded = self
            .final_fetching_key
            .map(|owner| owner != key)
            .unwrap_or(false);
        if superseded {
            self.abandon = true;
            match outcome {
                Ok(data) => {
                    self.data = Some(data);
                    self.error = None;
                    self.is_error = false;
                }
                Err(error) => {
                    self.error = Some(error);
                    self.is_error = true;
                }
            }
            return self;
        }

        self.abandon = false;
        self.is_fetching = false;
        self.fetching_key = None;
        // final_fetching_key stays: an older call settling after us must
        // still compare against the last starter and abandon.
        self.stale = None;
        self.round += 1;
        match outcome {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
                self.is_error = false;
                self.last_successful_round = self.round;
                self.last_successful_variables = Some(self.variables.clone());
            }
            Err(error) => {
                self.error = Some(error);
                self.is_error = true;
                self.last_failed_round = self.round;
                self.last_failed_variables = Some(self.variables.clone());
            }
        }
        self
    }

    /// Flip the monotone loaded flags on the first qualifying settlement.
    ///
    /// Applied universally by the pipeline composer; individual
    /// strategies are not responsible for this bookkeeping.
    pub(crate) fn finalize_loaded(mut self) -> Self {
        if !self.abandon && !self.is_error && !self.is_fetching && self.round > 0 {
            self.loaded = true;
            self.session_loaded = true;
        }
        self
    }
}
