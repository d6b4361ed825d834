//! Semantic checks for task definitions.

use std::collections::BTreeSet;

use crate::core::task::Task;

/// Findings from [`validate_tasks`]. Errors make a file unusable; warnings
/// describe tasks that will run but can never complete on their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFindings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TaskFindings {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate task-level invariants and every condition's parameters.
pub fn validate_tasks(tasks: &[Task]) -> TaskFindings {
    let mut findings = TaskFindings::default();
    let mut seen = BTreeSet::new();

    for task in tasks {
        let label = if task.name.trim().is_empty() {
            task.id.as_str()
        } else {
            task.name.as_str()
        };

        if task.id.trim().is_empty() {
            findings.errors.push(format!("task '{label}' has no id"));
        } else if !seen.insert(task.id.as_str()) {
            findings
                .errors
                .push(format!("duplicate task id '{}'", task.id));
        }
        if task.name.trim().is_empty() {
            findings
                .errors
                .push(format!("task '{}' has no name", task.id));
        }
        if task.command.trim().is_empty() {
            findings
                .errors
                .push(format!("task '{label}' has no command"));
        }
        if task.timeout_secs == 0 {
            findings
                .errors
                .push(format!("task '{label}' timeout must be > 0"));
        }
        if task.max_retries == 0 {
            findings
                .warnings
                .push(format!("task '{label}' has max_retries = 0 and will never run"));
        }
        if task.state.attempts > task.max_retries {
            findings.warnings.push(format!(
                "task '{label}' retry_count {} exceeds max_retries {}",
                task.state.attempts, task.max_retries
            ));
        }
        if task.conditions.is_empty() {
            findings.warnings.push(format!(
                "task '{label}' has no completion conditions and can never complete"
            ));
        }
        for (index, condition) in task.conditions.iter().enumerate() {
            if let Some(problem) = condition.problem() {
                findings
                    .errors
                    .push(format!("task '{label}' condition {}: {problem}", index + 1));
            }
        }
    }

    findings
}
