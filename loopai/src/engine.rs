//! Shared context for the retry loops.
//!
//! An [`Engine`] bundles the collaborators every loop needs: the assistant,
//! the sleeper, the HTTP probe, the loop configuration, and the evaluation
//! history the loops append to. The loops themselves live in
//! [`retry`](crate::retry) and [`improve`](crate::improve).

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::assistant::Assistant;
use crate::core::condition::Condition;
use crate::core::task::TaskState;
use crate::core::types::{ExecOutcome, LoopState};
use crate::evaluate::{ConditionEvaluator, Verdict};
use crate::io::config::LoopConfig;
use crate::io::history::EvaluationHistory;
use crate::io::probe::HttpProbe;
use crate::io::process::run_shell;
use crate::io::sleeper::Sleeper;

pub struct Engine<A, S> {
    assistant: A,
    sleeper: S,
    config: LoopConfig,
    probe: HttpProbe,
    history: EvaluationHistory,
}

impl<A: Assistant, S: Sleeper> Engine<A, S> {
    pub fn new(assistant: A, sleeper: S, config: LoopConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            assistant,
            sleeper,
            config,
            probe: HttpProbe::new()?,
            history: EvaluationHistory::default(),
        })
    }

    pub fn assistant(&self) -> &A {
        &self.assistant
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn history(&self) -> &EvaluationHistory {
        &self.history
    }

    /// Evaluate `conditions` once and append every record to the history.
    pub fn evaluate(&mut self, conditions: &[Condition], state: &TaskState) -> Verdict {
        let evaluator =
            ConditionEvaluator::new(&self.assistant, &self.probe, self.config.output_limit_bytes);
        let verdict = evaluator.evaluate_all(conditions, state);
        for evaluation in &verdict.evaluations {
            self.history.push(evaluation.record.clone());
        }
        verdict
    }

    /// One attempt: optional cooldown, run the command, fold the outcome into `state`.
    #[instrument(skip_all, fields(attempt = state.attempts + 1))]
    pub(crate) fn attempt(
        &self,
        command: &str,
        timeout_secs: u64,
        state: &mut TaskState,
    ) -> ExecOutcome {
        if self.config.waits.should_cool_down(state) {
            info!(
                cooldown_secs = self.config.waits.cooldown_secs,
                "previous attempt recorded an error, cooling down"
            );
            self.sleeper.sleep(self.config.waits.cooldown());
        }

        info!(command = %command, timeout_secs, "running attempt");
        let outcome = run_shell(
            command,
            Duration::from_secs(timeout_secs),
            self.config.output_limit_bytes,
        );
        state.record(&outcome);
        info!(
            success = outcome.success,
            exit_code = ?outcome.exit_code,
            timed_out = outcome.timed_out,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "attempt finished"
        );
        outcome
    }

    pub(crate) fn wait(&self, duration: Option<Duration>) {
        if let Some(duration) = duration {
            self.sleeper.sleep(duration);
        }
    }
}

/// Move the loop to `next`, logging the edge.
pub(crate) fn transition(state: &mut LoopState, next: LoopState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal loop transition {state:?} -> {next:?}"
    );
    debug!(from = ?*state, to = ?next, "loop transition");
    *state = next;
}
