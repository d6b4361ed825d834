//! Task model: plain command tasks, natural-language tasks, and the corrective
//! sub-tasks the latter own.
//!
//! Tasks are plain owned values mutated through `&mut` by exactly one loop at a
//! time; they are not meant to be shared between concurrently running loops.

use serde::{Deserialize, Serialize};

use crate::core::condition::Condition;
use crate::core::types::ExecOutcome;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Mutable per-task bookkeeping, overwritten on every attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    /// Attempts taken so far. Never decreases, never exceeds the task's bound.
    #[serde(rename = "retry_count", default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_output: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Error recorded by the attempt before the last one.
    #[serde(skip)]
    pub previous_error: Option<String>,
}

impl TaskState {
    /// Fold an attempt's outcome into the task and count the attempt.
    pub fn record(&mut self, outcome: &ExecOutcome) {
        self.previous_error = self.last_error.take();
        self.last_output = outcome.output.clone();
        self.last_error = outcome.error.clone();
        self.attempts += 1;
    }
}

/// A command plus the conditions that decide when it is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub command: String,
    #[serde(rename = "completion_conditions", default)]
    pub conditions: Vec<Condition>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(rename = "timeout", default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(flatten)]
    pub state: TaskState,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            command: command.into(),
            conditions,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            state: TaskState::default(),
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.state.attempts)
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// A goal stated in prose. The command and conditions are synthesized on
/// first use and may be replaced by a repaired command later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalTask {
    pub id: String,
    pub name: String,
    pub description: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub command: Option<String>,
    pub conditions: Option<Vec<Condition>>,
    /// Improvement plan requested once and reused for later improvement runs.
    pub improvement: Option<CorrectivePlan>,
    pub subtasks: Vec<CorrectiveTask>,
    pub state: TaskState,
}

impl NaturalTask {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            command: None,
            conditions: None,
            improvement: None,
            subtasks: Vec::new(),
            state: TaskState::default(),
        }
    }

    pub fn with_budget(mut self, max_retries: u32, timeout_secs: u64) -> Self {
        self.max_retries = max_retries;
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Why a corrective sub-task was spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectiveKind {
    /// The attempt succeeded but its conditions were not met.
    Improvement,
    /// The attempt failed; the sub-task carries a repaired command.
    Repair,
}

/// Assistant-proposed fix, before it is turned into a runnable task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CorrectivePlan {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub command: String,
    #[serde(rename = "completion_conditions", default)]
    pub conditions: Vec<Condition>,
}

/// A corrective action owned by a [`NaturalTask`].
///
/// The inner task is a plain [`Task`] with no sub-task list of its own, so
/// corrective recursion is single-level by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectiveTask {
    pub kind: CorrectiveKind,
    pub description: String,
    pub task: Task,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(success: bool, output: Option<&str>, error: Option<&str>) -> ExecOutcome {
        ExecOutcome {
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            output: output.map(str::to_string),
            error: error.map(str::to_string),
            elapsed: Duration::from_millis(1),
            timed_out: false,
        }
    }

    #[test]
    fn record_overwrites_and_keeps_previous_error() {
        let mut state = TaskState::default();
        state.record(&outcome(false, Some("partial"), Some("boom")));
        state.record(&outcome(true, Some("done"), None));

        assert_eq!(state.attempts, 2);
        assert_eq!(state.last_output.as_deref(), Some("done"));
        assert_eq!(state.last_error, None);
        assert_eq!(state.previous_error.as_deref(), Some("boom"));
    }

    #[test]
    fn task_file_defaults_apply() {
        let task: Task = serde_json::from_str(
            r#"{"id": "t1", "name": "T", "command": "true", "completion_conditions": []}"#,
        )
        .expect("task");
        assert_eq!(task.max_retries, 3);
        assert_eq!(task.timeout_secs, 300);
        assert_eq!(task.state, TaskState::default());
    }

    #[test]
    fn task_serializes_state_with_legacy_names() {
        let mut task = Task::new("t1", "T", "true", Vec::new());
        task.state.attempts = 2;
        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["retry_count"], 2);
        assert_eq!(value["timeout"], 300);
        assert!(value.get("previous_error").is_none());
    }

    #[test]
    fn attempts_remaining_saturates() {
        let mut task = Task::new("t1", "T", "true", Vec::new());
        task.max_retries = 1;
        task.state.attempts = 4;
        assert_eq!(task.attempts_remaining(), 0);
    }
}
