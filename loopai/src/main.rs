//! Completion-gated retry executor CLI.
//!
//! Runs the tasks of a JSON task file (or a single natural-language goal)
//! until their completion conditions hold, and offers helpers to inspect,
//! validate, and scaffold task files.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use sha2::{Digest, Sha256};
use tracing::warn;

use loopai::assistant::ClaudeCliAssistant;
use loopai::core::invariants::validate_tasks;
use loopai::core::task::{NaturalTask, Task};
use loopai::engine::Engine;
use loopai::exit_codes;
use loopai::io::config::{CONFIG_FILE_NAME, LoopConfig, load_config};
use loopai::io::sleeper::ThreadSleeper;
use loopai::io::task_file::{find_task, load_tasks, write_template};
use loopai::logging;
use loopai::report;

#[derive(Parser)]
#[command(
    name = "loopai",
    version,
    about = "Run commands until their completion conditions hold"
)]
struct Cli {
    /// Loop configuration file (defaults to `loopai.toml` when present).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log debug events to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run tasks from a task file until each completes or exhausts its attempts.
    Run {
        file: PathBuf,
        /// Run only the task with this id.
        #[arg(long)]
        task_id: Option<String>,
        /// Print what would run without running it.
        #[arg(long)]
        dry_run: bool,
        /// Write every condition evaluation to this JSON file.
        #[arg(long, value_name = "PATH")]
        export_history: Option<PathBuf>,
    },
    /// Run a task described in natural language.
    RunNatural {
        description: String,
        /// Display name (defaults to the description).
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        max_retries: Option<u32>,
        /// Per-attempt timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long, value_name = "PATH")]
        export_history: Option<PathBuf>,
    },
    /// Evaluate one task's conditions once, without running its command.
    Check {
        file: PathBuf,
        #[arg(long)]
        task_id: String,
        #[arg(long, value_name = "PATH")]
        export_history: Option<PathBuf>,
    },
    /// List the tasks in a task file.
    List {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ListFormat::Table)]
        format: ListFormat,
    },
    /// Check a task file against the schema and task invariants.
    Validate { file: PathBuf },
    /// Write an example task file.
    CreateTemplate { file: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ListFormat {
    Table,
    Json,
}

type CliEngine = Engine<ClaudeCliAssistant, ThreadSleeper>;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Run {
            file,
            task_id,
            dry_run,
            export_history,
        } => cmd_run(
            config,
            &file,
            task_id.as_deref(),
            dry_run,
            export_history.as_deref(),
        ),
        Command::RunNatural {
            description,
            name,
            max_retries,
            timeout,
            export_history,
        } => cmd_run_natural(
            config,
            &description,
            name,
            max_retries,
            timeout,
            export_history.as_deref(),
        ),
        Command::Check {
            file,
            task_id,
            export_history,
        } => cmd_check(config, &file, &task_id, export_history.as_deref()),
        Command::List { file, format } => cmd_list(&file, format),
        Command::Validate { file } => cmd_validate(&file),
        Command::CreateTemplate { file } => cmd_create_template(&file),
    }
}

fn cmd_run(
    config: Option<&Path>,
    file: &Path,
    task_id: Option<&str>,
    dry_run: bool,
    export_history: Option<&Path>,
) -> Result<i32> {
    let mut tasks = load_tasks(file)?;
    let selected: &mut [Task] = match task_id {
        Some(id) => std::slice::from_mut(find_task(&mut tasks, id)?),
        None => &mut tasks,
    };

    let findings = validate_tasks(selected);
    for problem in findings.errors.iter().chain(&findings.warnings) {
        warn!("{problem}");
    }

    if dry_run {
        print!("{}", report::dry_run(selected));
        return Ok(exit_codes::OK);
    }

    let mut engine = build_engine(config)?;
    let summary = engine.run_batch(selected);
    print!("{}", report::batch_summary("run summary", &summary));
    export(&engine, export_history)?;

    Ok(if summary.all_succeeded() {
        exit_codes::OK
    } else {
        exit_codes::INCOMPLETE
    })
}

fn cmd_run_natural(
    config: Option<&Path>,
    description: &str,
    name: Option<String>,
    max_retries: Option<u32>,
    timeout: Option<u64>,
    export_history: Option<&Path>,
) -> Result<i32> {
    if description.trim().is_empty() {
        bail!("description must not be empty");
    }
    let mut engine = build_engine(config)?;
    let defaults = engine.config().defaults;
    let name = name.unwrap_or_else(|| description.chars().take(40).collect());
    let task = NaturalTask::new(natural_task_id(description), name, description).with_budget(
        max_retries.unwrap_or(defaults.max_retries),
        timeout.unwrap_or(defaults.timeout_secs),
    );
    if task.timeout_secs == 0 {
        bail!("--timeout must be > 0");
    }

    let mut tasks = [task];
    let summary = engine.run_natural_batch(&mut tasks);
    let [task] = &tasks;
    if let Some(command) = &task.command {
        println!("command: {command}");
    } else if let Some(error) = &task.state.last_error {
        println!("no command: {error}");
    }
    print!(
        "{}",
        report::batch_summary("natural-language run summary", &summary)
    );
    export(&engine, export_history)?;

    Ok(if summary.all_succeeded() {
        exit_codes::OK
    } else {
        exit_codes::INCOMPLETE
    })
}

fn cmd_check(
    config: Option<&Path>,
    file: &Path,
    task_id: &str,
    export_history: Option<&Path>,
) -> Result<i32> {
    let mut tasks = load_tasks(file)?;
    let task = find_task(&mut tasks, task_id)?;
    let mut engine = build_engine(config)?;
    let verdict = engine.evaluate(&task.conditions, &task.state);
    print!(
        "{}",
        report::condition_summary(&task.name, &task.conditions, &verdict)
    );
    export(&engine, export_history)?;

    Ok(if verdict.complete() {
        exit_codes::OK
    } else {
        exit_codes::INCOMPLETE
    })
}

fn cmd_list(file: &Path, format: ListFormat) -> Result<i32> {
    let tasks = load_tasks(file)?;
    match format {
        ListFormat::Table => print!("{}", report::task_table(&tasks)),
        ListFormat::Json => println!("{}", report::task_list_json(&tasks)?),
    }
    Ok(exit_codes::OK)
}

fn cmd_validate(file: &Path) -> Result<i32> {
    let tasks = load_tasks(file)?;
    let findings = validate_tasks(&tasks);
    print!("{}", report::findings(tasks.len(), &findings));
    Ok(if findings.is_valid() {
        exit_codes::OK
    } else {
        exit_codes::INVALID
    })
}

fn cmd_create_template(file: &Path) -> Result<i32> {
    write_template(file)?;
    println!("created template {}", file.display());
    Ok(exit_codes::OK)
}

/// Explicit `--config` must exist; the implicit `loopai.toml` may not.
fn resolve_config(path: Option<&Path>) -> Result<LoopConfig> {
    match path {
        Some(path) if !path.exists() => bail!("config file not found: {}", path.display()),
        Some(path) => load_config(path),
        None => load_config(Path::new(CONFIG_FILE_NAME)),
    }
}

fn build_engine(config: Option<&Path>) -> Result<CliEngine> {
    let config = resolve_config(config)?;
    let assistant = ClaudeCliAssistant::new(&config.assistant, config.output_limit_bytes)?;
    Engine::new(assistant, ThreadSleeper, config)
}

fn export(engine: &CliEngine, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        engine.history().export(path)?;
        println!("exported evaluation history to {}", path.display());
    }
    Ok(())
}

/// Stable id for a CLI-created task: `natural_` plus a description digest prefix.
fn natural_task_id(description: &str) -> String {
    let digest = hex::encode(Sha256::digest(description.as_bytes()));
    format!("natural_{}", &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_flags() {
        let cli = Cli::parse_from([
            "loopai",
            "run",
            "tasks.json",
            "--task-id",
            "build",
            "--dry-run",
            "-v",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Run {
                file,
                task_id,
                dry_run,
                export_history,
            } => {
                assert_eq!(file, PathBuf::from("tasks.json"));
                assert_eq!(task_id.as_deref(), Some("build"));
                assert!(dry_run);
                assert_eq!(export_history, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_run_natural() {
        let cli = Cli::parse_from([
            "loopai",
            "--config",
            "custom.toml",
            "run-natural",
            "make a file",
            "--max-retries",
            "5",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(
            cli.command,
            Command::RunNatural {
                max_retries: Some(5),
                timeout: None,
                ..
            }
        ));
    }

    #[test]
    fn parse_list_format() {
        let cli = Cli::parse_from(["loopai", "list", "tasks.json", "--format", "json"]);
        assert!(matches!(
            cli.command,
            Command::List {
                format: ListFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn check_requires_task_id() {
        assert!(Cli::try_parse_from(["loopai", "check", "tasks.json"]).is_err());
    }

    #[test]
    fn natural_task_id_is_stable() {
        let id = natural_task_id("make a file");
        assert_eq!(id, natural_task_id("make a file"));
        assert_ne!(id, natural_task_id("make two files"));
        assert!(id.starts_with("natural_"));
        assert_eq!(id.len(), "natural_".len() + 8);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = resolve_config(Some(&temp.path().join("nope.toml"))).expect_err("missing");
        assert!(err.to_string().contains("config file not found"));
    }
}
