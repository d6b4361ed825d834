//! Backoff decisions between attempts.
//!
//! Pure: decides whether and how long to wait. The blocking itself goes through
//! [`Sleeper`](crate::io::sleeper::Sleeper).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::task::TaskState;

/// Number of leading characters compared by [`CooldownHeuristic::RepeatedError`].
const ERROR_PREFIX_CHARS: usize = 50;

/// When a recorded error triggers the cooldown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownHeuristic {
    /// Any recorded error triggers the cooldown, whatever it says.
    #[default]
    AnyError,
    /// Only an error whose first 50 characters match the previous attempt's.
    RepeatedError,
}

/// Fixed waits applied by the retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitPolicy {
    /// Cooldown applied before an attempt that follows a recorded error.
    pub cooldown_secs: u64,
    /// Wait after an attempt that succeeded without meeting its conditions.
    pub success_retry_secs: u64,
    /// Wait after a failed attempt when no cooldown will follow.
    pub failure_retry_secs: u64,
    /// Wait after a corrective sub-task succeeded.
    pub improvement_retry_secs: u64,
    pub heuristic: CooldownHeuristic,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            cooldown_secs: 60,
            success_retry_secs: 10,
            failure_retry_secs: 30,
            improvement_retry_secs: 5,
            heuristic: CooldownHeuristic::AnyError,
        }
    }
}

impl WaitPolicy {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn improvement_wait(&self) -> Duration {
        Duration::from_secs(self.improvement_retry_secs)
    }

    /// Whether the next attempt must be preceded by a cooldown.
    pub fn should_cool_down(&self, state: &TaskState) -> bool {
        if state.attempts == 0 {
            return false;
        }
        let Some(current) = state.last_error.as_deref() else {
            return false;
        };
        match self.heuristic {
            CooldownHeuristic::AnyError => true,
            CooldownHeuristic::RepeatedError => state
                .previous_error
                .as_deref()
                .is_some_and(|previous| error_prefix(previous) == error_prefix(current)),
        }
    }

    /// Wait to apply while in `Waiting`, after an incomplete attempt.
    ///
    /// A failed attempt that will be followed by a cooldown gets no extra wait
    /// here; the cooldown is applied when the next attempt starts.
    pub fn retry_wait(&self, attempt_succeeded: bool, state: &TaskState) -> Option<Duration> {
        if attempt_succeeded {
            return Some(Duration::from_secs(self.success_retry_secs));
        }
        if self.should_cool_down(state) {
            return None;
        }
        Some(Duration::from_secs(self.failure_retry_secs))
    }
}

fn error_prefix(error: &str) -> &str {
    match error.char_indices().nth(ERROR_PREFIX_CHARS) {
        Some((index, _)) => &error[..index],
        None => error,
    }
}
