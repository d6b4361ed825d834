//! Assistant abstraction used for synthesis and confirmation.
//!
//! The [`Assistant`] trait decouples the loops from the actual backend
//! (currently the `claude` CLI). Tests use scripted assistants that return
//! predetermined replies without spawning processes.

mod claude;
pub mod extract;

use std::time::Duration;

use crate::core::condition::Condition;
use crate::core::fault::Fault;
use crate::core::task::CorrectivePlan;

pub use claude::ClaudeCliAssistant;

/// Context handed to failure analysis.
#[derive(Debug, Clone, Copy)]
pub struct FailureReport<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub command: &'a str,
    pub last_output: Option<&'a str>,
    pub last_error: Option<&'a str>,
}

/// Raw result of a confirmation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub exit_code: Option<i32>,
    pub output: String,
}

impl Confirmation {
    /// Exit zero with `OK` somewhere in the output.
    pub fn confirmed(&self) -> bool {
        self.exit_code == Some(0) && self.output.contains("OK")
    }
}

/// Abstraction over assistant backends.
///
/// Every method reports failure as a [`Fault`]; callers decide whether it is
/// fatal or degrades to a default.
pub trait Assistant {
    /// Single-line shell command that performs `description`.
    ///
    /// `timeout` is the task's per-command timeout and bounds the request.
    fn synthesize_command(&self, description: &str, timeout: Duration) -> Result<String, Fault>;

    /// Completion conditions for `description` run via `command`.
    fn synthesize_conditions(
        &self,
        description: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<Vec<Condition>, Fault>;

    /// Single-line repaired command for a failed attempt.
    fn analyze_failure(
        &self,
        report: &FailureReport<'_>,
        timeout: Duration,
    ) -> Result<String, Fault>;

    /// Corrective sub-task proposal for `parent_name`, bounded by the
    /// configured assistant timeout.
    fn plan_improvement(&self, parent_name: &str, description: &str)
    -> Result<CorrectivePlan, Fault>;

    fn confirm(&self, prompt: &str, timeout: Duration) -> Result<Confirmation, Fault>;
}
