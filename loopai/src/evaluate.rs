//! Condition evaluation against a task's current state.
//!
//! The evaluator holds only shared references and no mutable state, so
//! evaluating the same condition against an unchanged task and environment
//! yields the same verdict. Faults never escape: an unevaluable condition is a
//! false verdict carrying a warning, and a failed probe is a false verdict
//! carrying a reason.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::assistant::Assistant;
use crate::core::condition::{
    Condition, DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_TEST_COMMAND_TIMEOUT_SECS,
    DEFAULT_WEBSITE_TIMEOUT_SECS,
};
use crate::core::fault::Fault;
use crate::core::task::TaskState;
use crate::io::history::{Diagnostics, EvaluationRecord};
use crate::io::probe::HttpProbe;
use crate::io::process::run_shell;

/// Verdict for a single condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub satisfied: bool,
    /// Set when the condition could not be evaluated at all.
    pub warning: Option<Fault>,
    pub record: EvaluationRecord,
}

/// Verdicts for a task's whole condition list, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub evaluations: Vec<Evaluation>,
}

impl Verdict {
    /// Every condition held. An empty list never completes.
    pub fn complete(&self) -> bool {
        !self.evaluations.is_empty() && self.evaluations.iter().all(|e| e.satisfied)
    }

    pub fn satisfied_count(&self) -> usize {
        self.evaluations.iter().filter(|e| e.satisfied).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Fault> {
        self.evaluations.iter().filter_map(|e| e.warning.as_ref())
    }
}

pub struct ConditionEvaluator<'a, A: ?Sized> {
    assistant: &'a A,
    probe: &'a HttpProbe,
    output_limit_bytes: usize,
}

impl<'a, A: Assistant + ?Sized> ConditionEvaluator<'a, A> {
    pub fn new(assistant: &'a A, probe: &'a HttpProbe, output_limit_bytes: usize) -> Self {
        Self {
            assistant,
            probe,
            output_limit_bytes,
        }
    }

    /// Evaluate every condition; no short circuit, so every verdict is recorded.
    pub fn evaluate_all(&self, conditions: &[Condition], state: &TaskState) -> Verdict {
        let evaluations: Vec<Evaluation> = conditions
            .iter()
            .map(|condition| self.evaluate(condition, state))
            .collect();
        let verdict = Verdict { evaluations };
        debug!(
            total = conditions.len(),
            satisfied = verdict.satisfied_count(),
            complete = verdict.complete(),
            "evaluated conditions"
        );
        verdict
    }

    pub fn evaluate(&self, condition: &Condition, state: &TaskState) -> Evaluation {
        let kind = condition.kind().to_string();
        let identifier = condition.identifier();
        match self.check(condition, state) {
            Ok((satisfied, diagnostics)) => {
                debug!(kind = %kind, identifier = %identifier, satisfied, "condition evaluated");
                Evaluation {
                    satisfied,
                    warning: None,
                    record: EvaluationRecord::now(kind, identifier, satisfied, diagnostics),
                }
            }
            Err(fault) => {
                warn!(kind = %kind, identifier = %identifier, %fault, "condition not evaluable");
                let diagnostics = Diagnostics::reason(fault.to_string());
                Evaluation {
                    satisfied: false,
                    warning: Some(fault),
                    record: EvaluationRecord::now(kind, identifier, false, diagnostics),
                }
            }
        }
    }

    /// `Err` only for conditions that cannot be evaluated at all.
    fn check(&self, condition: &Condition, state: &TaskState) -> Result<(bool, Diagnostics), Fault> {
        if let Some(problem) = condition.problem() {
            return Err(problem);
        }
        let output = state.last_output.as_deref();
        match condition {
            Condition::FileExists { path: Some(path) } => Ok(file_exists(Path::new(path))),
            Condition::OutputContains {
                pattern: Some(pattern),
            } => Ok(output_contains(output.unwrap_or(""), pattern)),
            Condition::OutputNotContains {
                pattern: Some(pattern),
            } => Ok(output_not_contains(output, pattern)),
            Condition::FileContains {
                path: Some(path),
                pattern: Some(pattern),
            } => Ok(file_contains(Path::new(path), pattern)),
            Condition::WebsiteExists {
                url: Some(url),
                timeout_secs,
            } => {
                let timeout =
                    Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_WEBSITE_TIMEOUT_SECS));
                Ok(self.website_exists(url, timeout))
            }
            Condition::TestCommand {
                command: Some(command),
                timeout_secs,
            } => {
                let timeout =
                    Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TEST_COMMAND_TIMEOUT_SECS));
                Ok(self.test_command(command, timeout))
            }
            Condition::AssistantConfirmation {
                prompt: Some(prompt),
                timeout_secs,
            } => {
                let timeout =
                    Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS));
                Ok(self.confirmation(prompt, timeout))
            }
            other => Err(Fault::ConditionKindUnknown(other.kind().to_string())),
        }
    }

    fn website_exists(&self, url: &str, timeout: Duration) -> (bool, Diagnostics) {
        match self.probe.status(url, timeout) {
            Ok(status) => (
                status == 200,
                Diagnostics {
                    status_code: Some(status),
                    ..Diagnostics::default()
                },
            ),
            Err(fault) => (false, Diagnostics::reason(fault.to_string())),
        }
    }

    fn test_command(&self, command: &str, timeout: Duration) -> (bool, Diagnostics) {
        let outcome = run_shell(command, timeout, self.output_limit_bytes);
        let reason = if outcome.timed_out {
            outcome.error.clone()
        } else {
            None
        };
        (
            outcome.success,
            Diagnostics {
                return_code: outcome.exit_code,
                output_length: outcome.output.as_deref().map(str::len),
                reason,
                ..Diagnostics::default()
            },
        )
    }

    fn confirmation(&self, prompt: &str, timeout: Duration) -> (bool, Diagnostics) {
        match self.assistant.confirm(prompt, timeout) {
            Ok(confirmation) => (
                confirmation.confirmed(),
                Diagnostics {
                    return_code: confirmation.exit_code,
                    output_length: Some(confirmation.output.len()),
                    ..Diagnostics::default()
                },
            ),
            Err(fault) => (false, Diagnostics::reason(fault.to_string())),
        }
    }
}

fn file_exists(path: &Path) -> (bool, Diagnostics) {
    match fs::metadata(path) {
        Ok(meta) => (
            true,
            Diagnostics {
                file_size: Some(meta.len()),
                ..Diagnostics::default()
            },
        ),
        Err(e) => (false, Diagnostics::reason(e.to_string())),
    }
}

fn output_contains(output: &str, pattern: &str) -> (bool, Diagnostics) {
    let line = match_line(output, pattern);
    (
        line.is_some(),
        Diagnostics {
            output_length: Some(output.len()),
            line,
            ..Diagnostics::default()
        },
    )
}

fn output_not_contains(output: Option<&str>, pattern: &str) -> (bool, Diagnostics) {
    let Some(output) = output else {
        return (true, Diagnostics::reason("no output captured"));
    };
    let line = match_line(output, pattern);
    (
        line.is_none(),
        Diagnostics {
            output_length: Some(output.len()),
            line,
            ..Diagnostics::default()
        },
    )
}

fn file_contains(path: &Path, pattern: &str) -> (bool, Diagnostics) {
    match fs::read_to_string(path) {
        Ok(text) => {
            let line = match_line(&text, pattern);
            (
                line.is_some(),
                Diagnostics {
                    file_size: Some(text.len() as u64),
                    line,
                    ..Diagnostics::default()
                },
            )
        }
        Err(e) => (false, Diagnostics::reason(format!("read {}: {e}", path.display()))),
    }
}

/// 1-based line where `pattern` first occurs.
fn match_line(haystack: &str, pattern: &str) -> Option<usize> {
    haystack
        .find(pattern)
        .map(|offset| haystack[..offset].matches('\n').count() + 1)
}
