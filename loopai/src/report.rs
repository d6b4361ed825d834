//! Human-readable summaries printed by the binary.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::batch::BatchSummary;
use crate::core::condition::Condition;
use crate::core::invariants::TaskFindings;
use crate::core::task::Task;
use crate::evaluate::Verdict;

const RULE: &str = "==================================================";

/// Join report lines, always ending with a newline.
fn finish(lines: Vec<String>) -> String {
    let mut buf = lines.join("\n");
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf
}

pub fn batch_summary(title: &str, summary: &BatchSummary) -> String {
    let mut lines = vec![
        RULE.to_string(),
        title.to_string(),
        RULE.to_string(),
        format!("total: {}", summary.total),
        format!("succeeded: {}", summary.succeeded),
        format!("failed: {}", summary.failed),
        format!("success_rate: {:.1}%", summary.success_rate * 100.0),
    ];
    if !summary.tasks.is_empty() {
        lines.push(String::new());
    }
    for stat in &summary.tasks {
        let status = if stat.succeeded { "ok" } else { "FAILED" };
        let mut line = format!("  {}: {} - {status}", stat.id, stat.name);
        if stat.attempts > 0 {
            line.push_str(&format!(" (attempts: {})", stat.attempts));
        }
        if stat.subtasks > 0 {
            line.push_str(&format!(" (subtasks: {})", stat.subtasks));
        }
        lines.push(line);
    }
    finish(lines)
}

/// Per-condition verdicts for one task, in declared order.
pub fn condition_summary(task_name: &str, conditions: &[Condition], verdict: &Verdict) -> String {
    let total = verdict.evaluations.len();
    let met = verdict.satisfied_count();
    let mut lines = vec![
        RULE.to_string(),
        format!("conditions: {task_name}"),
        RULE.to_string(),
        format!("total: {total}"),
        format!("met: {met}"),
        format!("unmet: {}", total - met),
    ];
    if total > 0 {
        lines.push(format!("ratio: {:.1}%", met as f64 / total as f64 * 100.0));
    }
    let warnings = verdict.warnings().count();
    if warnings > 0 {
        lines.push(format!("warnings: {warnings}"));
    }
    lines.push(String::new());
    for (condition, evaluation) in conditions.iter().zip(&verdict.evaluations) {
        let mark = if evaluation.satisfied { "[x]" } else { "[ ]" };
        let mut line = format!("  {mark} {}: {}", condition.kind(), condition.identifier());
        if let Some(warning) = &evaluation.warning {
            line.push_str(&format!(" (warning: {warning})"));
        } else if let Some(reason) = &evaluation.record.diagnostics.reason {
            line.push_str(&format!(" ({reason})"));
        }
        lines.push(line);
    }
    finish(lines)
}

pub fn task_table(tasks: &[Task]) -> String {
    let mut lines = vec![
        format!(
            "{:<15} {:<20} {:<10} {:<11} {:<8}",
            "ID", "NAME", "CONDITIONS", "MAX_RETRIES", "TIMEOUT"
        ),
        "-".repeat(68),
    ];
    for task in tasks {
        let name: String = task.name.chars().take(19).collect();
        lines.push(format!(
            "{:<15} {:<20} {:<10} {:<11} {:<8}",
            task.id,
            name,
            task.conditions.len(),
            task.max_retries,
            task.timeout_secs
        ));
    }
    finish(lines)
}

#[derive(Serialize)]
struct TaskListing<'a> {
    id: &'a str,
    name: &'a str,
    command: &'a str,
    completion_conditions_count: usize,
    max_retries: u32,
    timeout: u64,
}

pub fn task_list_json(tasks: &[Task]) -> Result<String> {
    let listing: Vec<TaskListing<'_>> = tasks
        .iter()
        .map(|task| TaskListing {
            id: &task.id,
            name: &task.name,
            command: &task.command,
            completion_conditions_count: task.conditions.len(),
            max_retries: task.max_retries,
            timeout: task.timeout_secs,
        })
        .collect();
    serde_json::to_string_pretty(&listing).context("serialize task list")
}

/// What `run --dry-run` would execute, without executing it.
pub fn dry_run(tasks: &[Task]) -> String {
    let mut lines = vec!["dry run: nothing is executed".to_string()];
    for task in tasks {
        lines.push(String::new());
        lines.push(format!("task: {} ({})", task.name, task.id));
        lines.push(format!("command: {}", task.command));
        lines.push(format!(
            "budget: {} attempts, {}s per attempt",
            task.max_retries, task.timeout_secs
        ));
        lines.push(format!("conditions: {}", task.conditions.len()));
        for (index, condition) in task.conditions.iter().enumerate() {
            let mut line = format!(
                "  {}. {}: {}",
                index + 1,
                condition.kind(),
                condition.identifier()
            );
            if let Some(timeout) = condition.timeout() {
                line.push_str(&format!(" (timeout {}s)", timeout.as_secs()));
            }
            lines.push(line);
        }
    }
    finish(lines)
}

pub fn findings(task_count: usize, findings: &TaskFindings) -> String {
    let mut lines = vec![format!("tasks: {task_count}")];
    if !findings.errors.is_empty() {
        lines.push(String::new());
        lines.push(format!("errors ({}):", findings.errors.len()));
        for error in &findings.errors {
            lines.push(format!("  - {error}"));
        }
    }
    if !findings.warnings.is_empty() {
        lines.push(String::new());
        lines.push(format!("warnings ({}):", findings.warnings.len()));
        for warning in &findings.warnings {
            lines.push(format!("  - {warning}"));
        }
    }
    if findings.is_valid() {
        lines.push(String::new());
        lines.push("valid".to_string());
    }
    finish(lines)
}
