//! Task file load/save helpers with schema validation.
//!
//! Only structure is enforced here. Semantic findings (duplicate ids, missing
//! condition parameters, ...) come from
//! [`validate_tasks`](crate::core::invariants::validate_tasks) so they can be
//! reported without refusing the file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::condition::Condition;
use crate::core::task::Task;
use crate::io::config::write_atomic;

const TASKS_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/tasks/v1.schema.json"
));

/// On-disk shape: `{"tasks": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFile {
    pub tasks: Vec<Task>,
}

/// Parse and schema-check task file contents. `origin` names the source in errors.
pub fn parse_tasks(raw: &str, origin: &str) -> Result<Vec<Task>> {
    let value: Value = serde_json::from_str(raw).with_context(|| format!("parse {origin}"))?;
    validate_schema(&value).with_context(|| format!("validate {origin}"))?;
    let file: TaskFile =
        serde_json::from_value(value).with_context(|| format!("deserialize {origin}"))?;
    Ok(file.tasks)
}

/// Load tasks from a JSON task file.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    if !path.exists() {
        bail!("task file not found: {}", path.display());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let tasks = parse_tasks(&raw, &path.display().to_string())?;
    debug!(path = %path.display(), tasks = tasks.len(), "loaded task file");
    Ok(tasks)
}

/// Write tasks, including their runtime state, as pretty JSON (temp file + rename).
pub fn save_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    let file = TaskFile {
        tasks: tasks.to_vec(),
    };
    let mut buf = serde_json::to_string_pretty(&file).context("serialize task file")?;
    buf.push('\n');
    write_atomic(path, &buf, "json.tmp")
}

/// Example task file written by `create-template`.
pub fn template() -> TaskFile {
    let hello = Task::new(
        "sample_task_1",
        "Sample task 1",
        "echo 'Hello, World!'",
        vec![Condition::output_contains("Hello")],
    );
    let mut file_task = Task::new(
        "sample_task_2",
        "Sample task 2",
        "touch sample.txt && echo 'Sample content' > sample.txt",
        vec![
            Condition::file_exists("sample.txt"),
            Condition::file_contains("sample.txt", "Sample content"),
        ],
    );
    file_task.max_retries = 5;
    file_task.timeout_secs = 600;
    TaskFile {
        tasks: vec![hello, file_task],
    }
}

/// Write [`template`] to `path`, creating parent directories.
pub fn write_template(path: &Path) -> Result<()> {
    save_tasks(path, &template().tasks)
}

/// Task with the given id.
pub fn find_task<'a>(tasks: &'a mut [Task], id: &str) -> Result<&'a mut Task> {
    tasks
        .iter_mut()
        .find(|task| task.id == id)
        .ok_or_else(|| anyhow!("task id '{id}' not found"))
}

/// Validate JSON instance against the task file schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TASKS_SCHEMA).context("parse task file schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile task file schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
