//! Shared value types for the executor core.

use std::time::Duration;

use crate::core::fault::Fault;

/// Result of running one command. Folded into the task, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Exit code zero.
    pub success: bool,
    /// Exit code, when the command ran to completion.
    pub exit_code: Option<i32>,
    /// Captured stdout. Absent when the command never produced a result.
    pub output: Option<String>,
    /// Captured stderr on non-zero exit, or a synthesized fault description.
    pub error: Option<String>,
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl ExecOutcome {
    /// Failed outcome for a command that never produced an exit status.
    pub fn from_fault(fault: &Fault, elapsed: Duration) -> Self {
        Self {
            success: false,
            exit_code: None,
            output: None,
            error: Some(fault.to_string()),
            elapsed,
            timed_out: matches!(fault, Fault::ActionTimeout { .. }),
        }
    }
}

/// Retry loop states.
///
/// `NotStarted -> Attempting -> Evaluating -> {Completed | Waiting | Exhausted}`,
/// with `Waiting -> Attempting` looping back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Attempting,
    Evaluating,
    Waiting,
    Completed,
    Exhausted,
}

impl LoopState {
    /// Whether `self -> next` is a legal edge of the loop.
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::{Attempting, Completed, Evaluating, Exhausted, NotStarted, Waiting};
        matches!(
            (self, next),
            (NotStarted, Attempting)
                | (NotStarted, Exhausted)
                | (Attempting, Evaluating)
                | (Evaluating, Completed)
                | (Evaluating, Waiting)
                | (Evaluating, Exhausted)
                | (Waiting, Attempting)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_fault_marks_outcome_timed_out() {
        let outcome = ExecOutcome::from_fault(
            &Fault::ActionTimeout { timeout_secs: 5 },
            Duration::from_secs(5),
        );
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert_eq!(outcome.output, None);
        assert_eq!(
            outcome.error.as_deref(),
            Some("command timed out after 5s")
        );
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for next in [
            LoopState::Attempting,
            LoopState::Evaluating,
            LoopState::Waiting,
        ] {
            assert!(!LoopState::Completed.can_transition_to(next));
            assert!(!LoopState::Exhausted.can_transition_to(next));
        }
        assert!(LoopState::Waiting.can_transition_to(LoopState::Attempting));
        assert!(!LoopState::Attempting.can_transition_to(LoopState::Completed));
    }
}
