//! Retry loop for natural-language tasks, with corrective sub-tasks.
//!
//! The command and conditions are synthesized lazily before the first attempt.
//! After an attempt that leaves the task incomplete, and only while main
//! attempts remain, one corrective sub-task runs through the plain retry loop:
//! an improvement when the attempt succeeded, a repair carrying a rewritten
//! command when it failed. Sub-tasks have their own budget and never count
//! against the main task's attempts.

use std::time::Duration;

use tracing::{error, info, info_span, warn};

use crate::assistant::{Assistant, FailureReport};
use crate::core::condition::Condition;
use crate::core::task::{CorrectiveKind, CorrectivePlan, CorrectiveTask, NaturalTask, Task};
use crate::core::types::LoopState;
use crate::engine::{Engine, transition};
use crate::io::config::BudgetConfig;
use crate::io::sleeper::Sleeper;

/// Goal handed to the assistant when an attempt succeeded without completing.
pub const IMPROVEMENT_GOAL: &str =
    "Analyze what has to change so this task meets its completion conditions, then make that change";
/// Goal handed to the assistant when an attempt failed.
pub const REPAIR_GOAL: &str = "Analyze why the task failed and apply a fix";

/// Pattern of the condition used when no conditions could be synthesized.
pub const FALLBACK_PATTERN: &str = "done";
/// Pattern of the condition used by sub-tasks whose plan has none.
pub const CORRECTIVE_FALLBACK_PATTERN: &str = "success";

impl<A: Assistant, S: Sleeper> Engine<A, S> {
    /// Drive `task` until its synthesized conditions hold or its attempts run out.
    ///
    /// Returns false without consuming an attempt when no command can be
    /// synthesized; the fault is recorded as the task's last error.
    pub fn run_natural_until_complete(&mut self, task: &mut NaturalTask) -> bool {
        let span = info_span!("natural_task", id = %task.id);
        let _guard = span.enter();

        let Some((command, conditions)) = self.synthesize(task) else {
            return false;
        };

        let mut state = LoopState::NotStarted;
        if task.state.attempts >= task.max_retries {
            transition(&mut state, LoopState::Exhausted);
            warn!(
                attempts = task.state.attempts,
                max_retries = task.max_retries,
                "no attempts remaining"
            );
            return false;
        }

        let mut command = command;
        loop {
            transition(&mut state, LoopState::Attempting);
            let outcome = self.attempt(&command, task.timeout_secs, &mut task.state);

            transition(&mut state, LoopState::Evaluating);
            let verdict = self.evaluate(&conditions, &task.state);
            if verdict.complete() {
                transition(&mut state, LoopState::Completed);
                info!(
                    attempts = task.state.attempts,
                    subtasks = task.subtasks.len(),
                    "task completed"
                );
                return true;
            }
            if task.state.attempts >= task.max_retries {
                transition(&mut state, LoopState::Exhausted);
                warn!(
                    attempts = task.state.attempts,
                    subtasks = task.subtasks.len(),
                    "task exhausted its attempts"
                );
                return false;
            }

            transition(&mut state, LoopState::Waiting);
            let corrected = if outcome.success {
                self.improve(task)
            } else {
                self.repair(task, &command)
            };
            if let Some(current) = &task.command {
                command.clone_from(current);
            }

            let waits = &self.config().waits;
            let wait = if !corrected {
                waits.retry_wait(outcome.success, &task.state)
            } else if waits.should_cool_down(&task.state) {
                None
            } else {
                Some(waits.improvement_wait())
            };
            self.wait(wait);
        }
    }

    /// Fill in the command and conditions if absent. `None` when the command
    /// cannot be synthesized.
    fn synthesize(&self, task: &mut NaturalTask) -> Option<(String, Vec<Condition>)> {
        let timeout = Duration::from_secs(task.timeout_secs);
        let command = match &task.command {
            Some(command) => command.clone(),
            None => match self.assistant().synthesize_command(&task.description, timeout) {
                Ok(command) => {
                    task.command = Some(command.clone());
                    command
                }
                Err(fault) => {
                    error!(%fault, "could not synthesize a command");
                    task.state.last_error = Some(fault.to_string());
                    return None;
                }
            },
        };

        let conditions = match &task.conditions {
            Some(conditions) => conditions.clone(),
            None => {
                let conditions = self
                    .assistant()
                    .synthesize_conditions(&task.description, &command, timeout)
                    .unwrap_or_else(|fault| {
                        warn!(%fault, "falling back to default completion condition");
                        vec![Condition::output_contains(FALLBACK_PATTERN)]
                    });
                task.conditions = Some(conditions.clone());
                conditions
            }
        };

        Some((command, conditions))
    }

    /// Run an improvement sub-task built from the cached (or newly requested) plan.
    fn improve(&mut self, task: &mut NaturalTask) -> bool {
        let plan = match &task.improvement {
            Some(plan) => plan.clone(),
            None => {
                let plan = self.request_plan(&task.name, IMPROVEMENT_GOAL);
                task.improvement = Some(plan.clone());
                plan
            }
        };
        let mut subtask = corrective_task(
            task,
            CorrectiveKind::Improvement,
            &plan,
            self.config().corrective,
        );
        info!(subtask = %subtask.task.id, "running improvement sub-task");
        let succeeded = self.run_until_complete(&mut subtask.task);
        task.subtasks.push(subtask);
        succeeded
    }

    /// Ask for a repaired command and prove it through a repair sub-task. On
    /// success the repaired command replaces the task's command.
    fn repair(&mut self, task: &mut NaturalTask, command: &str) -> bool {
        let report = FailureReport {
            id: &task.id,
            name: &task.name,
            description: &task.description,
            command,
            last_output: task.state.last_output.as_deref(),
            last_error: task.state.last_error.as_deref(),
        };
        let timeout = Duration::from_secs(task.timeout_secs);
        let repaired = match self.assistant().analyze_failure(&report, timeout) {
            Ok(repaired) => repaired,
            Err(fault) => {
                warn!(%fault, "failure analysis unavailable, skipping repair");
                return false;
            }
        };

        let plan = self.request_plan(&task.name, REPAIR_GOAL);
        let mut subtask = corrective_task(
            task,
            CorrectiveKind::Repair,
            &plan,
            self.config().corrective,
        );
        subtask.task.command = repaired.clone();
        info!(subtask = %subtask.task.id, command = %repaired, "running repair sub-task");
        let succeeded = self.run_until_complete(&mut subtask.task);
        task.subtasks.push(subtask);

        if succeeded {
            info!(command = %repaired, "repair succeeded, promoting command");
            task.command = Some(repaired);
        }
        succeeded
    }

    fn request_plan(&self, parent_name: &str, goal: &str) -> CorrectivePlan {
        self.assistant()
            .plan_improvement(parent_name, goal)
            .unwrap_or_else(|fault| {
                warn!(%fault, "using default corrective sub-task");
                CorrectivePlan {
                    name: String::new(),
                    description: goal.to_string(),
                    command: String::new(),
                    conditions: Vec::new(),
                }
            })
    }
}

/// Instantiate a sub-task of `parent` for its current attempt.
///
/// Blank plan fields fall back to defaults: a generated name, a command that
/// echoes the goal, and an `output_contains "success"` condition.
pub fn corrective_task(
    parent: &NaturalTask,
    kind: CorrectiveKind,
    plan: &CorrectivePlan,
    budget: BudgetConfig,
) -> CorrectiveTask {
    let n = parent.state.attempts;
    let description = if plan.description.trim().is_empty() {
        match kind {
            CorrectiveKind::Improvement => IMPROVEMENT_GOAL.to_string(),
            CorrectiveKind::Repair => REPAIR_GOAL.to_string(),
        }
    } else {
        plan.description.clone()
    };
    let name = if plan.name.trim().is_empty() {
        match kind {
            CorrectiveKind::Improvement => format!("Improvement sub-task {n}"),
            CorrectiveKind::Repair => format!("Repair sub-task {n}"),
        }
    } else {
        plan.name.clone()
    };
    let command = if plan.command.trim().is_empty() {
        format!("echo {}", shell_quote(&format!("Running corrective step: {description}")))
    } else {
        plan.command.clone()
    };
    let conditions = if plan.conditions.is_empty() {
        vec![Condition::output_contains(CORRECTIVE_FALLBACK_PATTERN)]
    } else {
        plan.conditions.clone()
    };

    let mut task = Task::new(format!("{}_sub_{n}", parent.id), name, command, conditions);
    task.max_retries = budget.max_retries;
    task.timeout_secs = budget.timeout_secs;
    CorrectiveTask {
        kind,
        description,
        task,
    }
}

/// Single-quote `text` for `sh`.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fault::Fault;
    use crate::test_support::{engine_with, natural_task, plan};

    #[test]
    fn synthesizes_and_completes() {
        let mut engine = engine_with(|assistant| {
            assistant.push_command("echo done");
            assistant.push_conditions(vec![Condition::output_contains("done")]);
        });
        let mut task = natural_task("n1", "print done");
        assert!(engine.run_natural_until_complete(&mut task));
        assert_eq!(task.command.as_deref(), Some("echo done"));
        assert_eq!(task.state.attempts, 1);
        assert!(task.subtasks.is_empty());
        assert_eq!(
            engine.assistant().calls(),
            vec!["synthesize_command", "synthesize_conditions"]
        );
    }

    #[test]
    fn synthesis_is_bounded_by_task_timeout() {
        let mut engine = engine_with(|assistant| {
            assistant.push_command("echo done");
            assistant.push_conditions(vec![Condition::output_contains("done")]);
        });
        let mut task = natural_task("n1", "print done").with_budget(3, 42);
        assert!(engine.run_natural_until_complete(&mut task));
        assert_eq!(
            engine.assistant().request_timeouts(),
            vec![Duration::from_secs(42), Duration::from_secs(42)]
        );
    }

    #[test]
    fn command_synthesis_failure_is_fatal_without_attempt() {
        let mut engine = engine_with(|_| {});
        let mut task = natural_task("n1", "do something");
        assert!(!engine.run_natural_until_complete(&mut task));
        assert_eq!(task.state.attempts, 0);
        assert!(
            task.state
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("assistant"))
        );
        assert_eq!(engine.assistant().calls(), vec!["synthesize_command"]);
    }

    #[test]
    fn condition_synthesis_failure_degrades_to_default() {
        let mut engine = engine_with(|assistant| {
            assistant.push_command("echo done");
            assistant.push_conditions_fault(Fault::ResponseMalformed("not json".to_string()));
        });
        let mut task = natural_task("n1", "print done");
        assert!(engine.run_natural_until_complete(&mut task));
        assert_eq!(
            task.conditions,
            Some(vec![Condition::output_contains(FALLBACK_PATTERN)])
        );
    }

    #[test]
    fn never_met_spawns_at_most_one_subtask_per_attempt() {
        let mut engine = engine_with(|assistant| {
            assistant.push_command("echo working");
            assistant.push_conditions(vec![Condition::output_contains("finished")]);
        });
        let mut task = natural_task("n1", "finish");
        assert!(!engine.run_natural_until_complete(&mut task));
        assert_eq!(task.state.attempts, task.max_retries);
        assert_eq!(task.subtasks.len(), 2);
        assert!(task.subtasks.len() <= task.state.attempts as usize);
        assert_eq!(task.subtasks[0].task.id, "n1_sub_1");
        assert_eq!(task.subtasks[1].task.id, "n1_sub_2");
        assert!(
            task.subtasks
                .iter()
                .all(|s| s.kind == CorrectiveKind::Improvement)
        );
        // Plan requested once, reused for the second improvement.
        let plan_requests = engine
            .assistant()
            .calls()
            .into_iter()
            .filter(|c| *c == "plan_improvement")
            .count();
        assert_eq!(plan_requests, 1);
    }

    #[test]
    fn default_subtask_uses_echo_and_success_condition() {
        let parent = {
            let mut task = natural_task("n1", "finish");
            task.state.attempts = 2;
            task
        };
        let subtask = corrective_task(
            &parent,
            CorrectiveKind::Improvement,
            &CorrectivePlan {
                name: String::new(),
                description: "it's broken".to_string(),
                command: String::new(),
                conditions: Vec::new(),
            },
            BudgetConfig {
                max_retries: 2,
                timeout_secs: 120,
            },
        );
        assert_eq!(subtask.task.id, "n1_sub_2");
        assert_eq!(subtask.task.name, "Improvement sub-task 2");
        assert_eq!(
            subtask.task.command,
            r"echo 'Running corrective step: it'\''s broken'"
        );
        assert_eq!(
            subtask.task.conditions,
            vec![Condition::output_contains("success")]
        );
        assert_eq!(subtask.task.max_retries, 2);
        assert_eq!(subtask.task.timeout_secs, 120);
    }

    #[test]
    fn successful_improvement_waits_briefly_and_retries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("fixed");
        let mut engine = engine_with(|assistant| {
            assistant.push_command(&format!("cat {}", marker.display()));
            assistant.push_conditions(vec![Condition::output_contains("fixed")]);
            assistant.push_plan(plan(
                "Create marker",
                &format!("echo fixed > {} && echo success", marker.display()),
                vec![Condition::output_contains("success")],
            ));
        });
        // Empty marker: the first attempt succeeds but prints nothing.
        std::fs::write(&marker, "").expect("write");
        let mut task = natural_task("n1", "make it fixed");

        assert!(engine.run_natural_until_complete(&mut task));
        assert_eq!(task.state.attempts, 2);
        assert_eq!(task.subtasks.len(), 1);
        assert_eq!(task.subtasks[0].kind, CorrectiveKind::Improvement);
        assert_eq!(engine.sleeper().waits(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn successful_repair_promotes_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("out.txt");
        let mut engine = engine_with(|assistant| {
            assistant.push_command("exit 1");
            assistant.push_conditions(vec![Condition::file_exists(out.display().to_string())]);
            assistant.push_analysis(&format!("touch {} && echo success", out.display()));
        });
        let mut task = natural_task("n1", "create out.txt");
        assert!(engine.run_natural_until_complete(&mut task));

        assert_eq!(task.state.attempts, 2);
        assert_eq!(task.subtasks.len(), 1);
        let repair = &task.subtasks[0];
        assert_eq!(repair.kind, CorrectiveKind::Repair);
        assert_eq!(repair.task.id, "n1_sub_1");
        assert_eq!(task.command, Some(repair.task.command.clone()));
        // The repair is proven by the default "success" condition, and the
        // first attempt's error triggers a cooldown instead of the short wait.
        assert_eq!(engine.sleeper().waits(), vec![Duration::from_secs(60)]);
    }

    #[test]
    fn failed_repair_does_not_promote() {
        let mut engine = engine_with(|assistant| {
            assistant.push_command("exit 1");
            assistant.push_conditions(vec![Condition::output_contains("done")]);
            assistant.push_analysis("exit 2");
        });
        let mut task = natural_task("n1", "never works").with_budget(2, 5);
        assert!(!engine.run_natural_until_complete(&mut task));

        assert_eq!(task.state.attempts, 2);
        assert_eq!(task.subtasks.len(), 1);
        let repair = &task.subtasks[0];
        assert_eq!(repair.kind, CorrectiveKind::Repair);
        assert_eq!(repair.task.command, "exit 2");
        assert_eq!(task.command.as_deref(), Some("exit 1"));
        assert_eq!(engine.assistant().failure_commands(), vec!["exit 1"]);
        assert_eq!(
            engine.assistant().request_timeouts().last(),
            Some(&Duration::from_secs(5))
        );
        // One wait between the repair's two attempts, then the main task's
        // failure cooldown.
        assert_eq!(
            engine.sleeper().waits(),
            vec![Duration::from_secs(60), Duration::from_secs(60)]
        );
    }

    #[test]
    fn failed_analysis_falls_through_to_normal_wait() {
        let mut engine = engine_with(|assistant| {
            assistant.push_command("exit 1");
            assistant.push_conditions(vec![Condition::output_contains("done")]);
        });
        let mut task = natural_task("n1", "never works").with_budget(2, 5);
        assert!(!engine.run_natural_until_complete(&mut task));
        assert_eq!(task.state.attempts, 2);
        assert!(task.subtasks.is_empty());
        assert_eq!(task.command.as_deref(), Some("exit 1"));
        assert_eq!(engine.sleeper().waits(), vec![Duration::from_secs(60)]);
    }

    #[test]
    fn no_corrective_branch_after_final_attempt() {
        let mut engine = engine_with(|assistant| {
            assistant.push_command("echo working");
            assistant.push_conditions(vec![Condition::output_contains("finished")]);
        });
        let mut task = natural_task("n1", "finish").with_budget(1, 5);
        assert!(!engine.run_natural_until_complete(&mut task));
        assert_eq!(task.state.attempts, 1);
        assert!(task.subtasks.is_empty());
        assert!(engine.sleeper().waits().is_empty());
    }
}
