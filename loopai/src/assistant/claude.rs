use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use minijinja::{Environment, Value, context};
use tracing::{debug, info, instrument, warn};

use super::{Assistant, Confirmation, FailureReport, extract};
use crate::core::condition::Condition;
use crate::core::fault::Fault;
use crate::core::task::CorrectivePlan;
use crate::io::config::AssistantConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};

const COMMAND_TEMPLATE: &str = include_str!("prompts/command.md");
const CONDITIONS_TEMPLATE: &str = include_str!("prompts/conditions.md");
const FAILURE_TEMPLATE: &str = include_str!("prompts/failure.md");
const IMPROVEMENT_TEMPLATE: &str = include_str!("prompts/improvement.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("command", COMMAND_TEMPLATE)?;
        env.add_template("conditions", CONDITIONS_TEMPLATE)?;
        env.add_template("failure", FAILURE_TEMPLATE)?;
        env.add_template("improvement", IMPROVEMENT_TEMPLATE)?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: Value) -> Result<String, Fault> {
        self.env
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .map_err(|e| Fault::SynthesisFault(format!("render {name} prompt: {e}")))
    }
}

/// Assistant that shells out to a CLI (`claude -p <prompt>` by default).
pub struct ClaudeCliAssistant {
    program: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptEngine,
}

impl ClaudeCliAssistant {
    pub fn new(config: &AssistantConfig, output_limit_bytes: usize) -> Result<Self> {
        if config.program.is_empty() {
            return Err(anyhow!("assistant program must not be empty"));
        }
        Ok(Self {
            program: config.program.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes,
            prompts: PromptEngine::new()?,
        })
    }

    /// Run the program with `prompt` appended as its last argument.
    fn invoke(&self, prompt: &str, timeout: Duration) -> Result<CommandOutput, Fault> {
        let Some((program, args)) = self.program.split_first() else {
            return Err(Fault::ActionFault("assistant program is empty".to_string()));
        };
        let mut cmd = Command::new(program);
        cmd.args(args).arg(prompt);
        debug!(program = %program, prompt_bytes = prompt.len(), "invoking assistant");

        let output = run_command_with_timeout(cmd, timeout, self.output_limit_bytes)
            .map_err(|e| Fault::ActionFault(format!("run {program}: {e:#}")))?;
        if output.timed_out {
            return Err(Fault::ActionTimeout {
                timeout_secs: timeout.as_secs(),
            });
        }
        Ok(output)
    }

    /// Render a synthesis prompt and return the reply text of a successful run.
    fn ask(&self, template: &str, ctx: Value, timeout: Duration) -> Result<String, Fault> {
        let prompt = self.prompts.render(template, ctx)?;
        let output = self
            .invoke(&prompt, timeout)
            .map_err(|fault| Fault::SynthesisFault(fault.to_string()))?;
        if !output.status.success() {
            warn!(template, exit_code = ?output.status.code(), "assistant request failed");
            return Err(Fault::SynthesisFault(format!(
                "assistant exited with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            )));
        }
        Ok(output.stdout_text())
    }
}

impl Assistant for ClaudeCliAssistant {
    #[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
    fn synthesize_command(&self, description: &str, timeout: Duration) -> Result<String, Fault> {
        let reply = self.ask(
            "command",
            context! { description => description.trim(), timeout_secs => timeout.as_secs() },
            timeout,
        )?;
        let command = extract::command_line(&reply)?;
        info!(command = %command, "synthesized command");
        Ok(command)
    }

    #[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
    fn synthesize_conditions(
        &self,
        description: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<Vec<Condition>, Fault> {
        let reply = self.ask(
            "conditions",
            context! { description => description.trim(), command => command },
            timeout,
        )?;
        let conditions = extract::conditions(&reply)?;
        info!(count = conditions.len(), "synthesized conditions");
        Ok(conditions)
    }

    #[instrument(skip_all, fields(task_id = report.id, timeout_secs = timeout.as_secs()))]
    fn analyze_failure(
        &self,
        report: &FailureReport<'_>,
        timeout: Duration,
    ) -> Result<String, Fault> {
        let reply = self.ask(
            "failure",
            context! {
                id => report.id,
                name => report.name,
                description => report.description.trim(),
                command => report.command,
                last_output => report.last_output.map(str::trim).filter(|s| !s.is_empty()),
                last_error => report.last_error.map(str::trim).filter(|s| !s.is_empty()),
            },
            timeout,
        )?;
        let command = extract::command_line(&reply)?;
        info!(command = %command, "proposed repaired command");
        Ok(command)
    }

    #[instrument(skip_all)]
    fn plan_improvement(
        &self,
        parent_name: &str,
        description: &str,
    ) -> Result<CorrectivePlan, Fault> {
        let reply = self.ask(
            "improvement",
            context! { parent_name => parent_name, description => description },
            self.timeout,
        )?;
        extract::plan(&reply)
    }

    #[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
    fn confirm(&self, prompt: &str, timeout: Duration) -> Result<Confirmation, Fault> {
        let output = self.invoke(prompt, timeout)?;
        Ok(Confirmation {
            exit_code: output.status.code(),
            output: output.stdout_text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(program: &[&str]) -> ClaudeCliAssistant {
        let config = AssistantConfig {
            program: program.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 5,
        };
        ClaudeCliAssistant::new(&config, 64 * 1024).expect("assistant")
    }

    #[test]
    fn prompts_render() {
        let engine = PromptEngine::new().expect("engine");
        let rendered = engine
            .render(
                "failure",
                context! {
                    id => "t1",
                    name => "Build",
                    description => "build it",
                    command => "make",
                    last_output => None::<&str>,
                    last_error => Some("make: *** No rule"),
                },
            )
            .expect("render");
        assert!(rendered.contains("make: *** No rule"));
        assert!(!rendered.contains("## Last output"));
    }

    #[test]
    fn command_comes_from_first_reply_line() {
        // `sh -c <script> <prompt>` ignores the prompt argument.
        let assistant = assistant(&["sh", "-c", "printf '# note\\nls -la\\n'"]);
        assert_eq!(
            assistant
                .synthesize_command("list", Duration::from_secs(5))
                .expect("command"),
            "ls -la"
        );
    }

    #[test]
    fn non_zero_exit_is_a_synthesis_fault() {
        let assistant = assistant(&["sh", "-c", "echo nope >&2; exit 1"]);
        let fault = assistant
            .synthesize_command("list", Duration::from_secs(5))
            .expect_err("fault");
        assert!(fault.is_synthesis());
        assert!(fault.to_string().contains("nope"));
    }

    #[test]
    fn missing_program_is_a_synthesis_fault() {
        let assistant = assistant(&["loopai-no-such-assistant"]);
        let fault = assistant
            .synthesize_conditions("x", "true", Duration::from_secs(5))
            .expect_err("fault");
        assert!(fault.is_synthesis());
    }

    #[test]
    fn synthesis_is_bounded_by_caller_timeout() {
        // Configured timeout is 5s; the caller's 1s wins.
        let assistant = assistant(&["sh", "-c", "sleep 5"]);
        let fault = assistant
            .synthesize_command("list", Duration::from_secs(1))
            .expect_err("timeout");
        assert!(fault.is_synthesis());
        assert!(fault.to_string().contains("timed out after 1s"));
    }

    #[test]
    fn confirm_passes_prompt_and_reports_exit() {
        let assistant = assistant(&["sh", "-c", "echo \"$0\""]);
        let confirmation = assistant
            .confirm("reply OK", Duration::from_secs(5))
            .expect("confirm");
        assert!(confirmation.confirmed());
        assert_eq!(confirmation.output, "reply OK\n");
    }

    #[test]
    fn confirm_timeout_is_reported() {
        let assistant = assistant(&["sh", "-c", "sleep 5"]);
        let fault = assistant
            .confirm("x", Duration::from_secs(1))
            .expect_err("timeout");
        assert_eq!(fault, Fault::ActionTimeout { timeout_secs: 1 });
    }
}
