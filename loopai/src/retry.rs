//! Retry loop for plain command tasks.

use tracing::{info, info_span, warn};

use crate::assistant::Assistant;
use crate::core::task::Task;
use crate::core::types::LoopState;
use crate::engine::{Engine, transition};
use crate::io::sleeper::Sleeper;

impl<A: Assistant, S: Sleeper> Engine<A, S> {
    /// Attempt `task` until its conditions hold or its attempts run out.
    ///
    /// Never fails: command faults become failed attempts and condition faults
    /// become false verdicts. Resumes from the task's recorded attempt count,
    /// which never exceeds `max_retries`.
    pub fn run_until_complete(&mut self, task: &mut Task) -> bool {
        let span = info_span!("task", id = %task.id);
        let _guard = span.enter();

        let mut state = LoopState::NotStarted;
        if task.attempts_remaining() == 0 {
            transition(&mut state, LoopState::Exhausted);
            warn!(
                attempts = task.state.attempts,
                max_retries = task.max_retries,
                "no attempts remaining"
            );
            return false;
        }

        loop {
            transition(&mut state, LoopState::Attempting);
            let outcome = self.attempt(&task.command, task.timeout_secs, &mut task.state);

            transition(&mut state, LoopState::Evaluating);
            let verdict = self.evaluate(&task.conditions, &task.state);
            if verdict.complete() {
                transition(&mut state, LoopState::Completed);
                info!(attempts = task.state.attempts, "task completed");
                return true;
            }
            if task.attempts_remaining() == 0 {
                transition(&mut state, LoopState::Exhausted);
                warn!(attempts = task.state.attempts, "task exhausted its attempts");
                return false;
            }

            transition(&mut state, LoopState::Waiting);
            info!(
                attempt = task.state.attempts,
                max_retries = task.max_retries,
                satisfied = verdict.satisfied_count(),
                total = verdict.evaluations.len(),
                "conditions not met, retrying"
            );
            let wait = self
                .config()
                .waits
                .retry_wait(outcome.success, &task.state);
            self.wait(wait);
        }
    }
}
