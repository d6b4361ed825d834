//! Test-only collaborators and builders for tasks and engines.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use crate::assistant::{Assistant, Confirmation, FailureReport};
use crate::core::condition::Condition;
use crate::core::fault::Fault;
use crate::core::task::{CorrectivePlan, NaturalTask, Task, TaskState};
use crate::engine::Engine;
use crate::io::config::LoopConfig;
use crate::io::sleeper::Sleeper;

/// Assistant that replays queued replies. An empty queue answers with a
/// synthesis fault (or an action fault for confirmations).
#[derive(Debug, Default)]
pub struct ScriptedAssistant {
    commands: RefCell<VecDeque<Result<String, Fault>>>,
    conditions: RefCell<VecDeque<Result<Vec<Condition>, Fault>>>,
    analyses: RefCell<VecDeque<Result<String, Fault>>>,
    plans: RefCell<VecDeque<Result<CorrectivePlan, Fault>>>,
    confirmations: RefCell<VecDeque<Confirmation>>,
    calls: RefCell<Vec<&'static str>>,
    confirm_prompts: RefCell<Vec<String>>,
    failure_commands: RefCell<Vec<String>>,
    request_timeouts: RefCell<Vec<Duration>>,
}

impl ScriptedAssistant {
    pub fn push_command(&self, command: &str) {
        self.commands.borrow_mut().push_back(Ok(command.to_string()));
    }

    pub fn push_conditions(&self, conditions: Vec<Condition>) {
        self.conditions.borrow_mut().push_back(Ok(conditions));
    }

    pub fn push_conditions_fault(&self, fault: Fault) {
        self.conditions.borrow_mut().push_back(Err(fault));
    }

    pub fn push_analysis(&self, command: &str) {
        self.analyses.borrow_mut().push_back(Ok(command.to_string()));
    }

    pub fn push_plan(&self, plan: CorrectivePlan) {
        self.plans.borrow_mut().push_back(Ok(plan));
    }

    pub fn push_confirmation(&self, exit_code: Option<i32>, output: &str) {
        self.confirmations.borrow_mut().push_back(Confirmation {
            exit_code,
            output: output.to_string(),
        });
    }

    /// Trait methods invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn confirm_prompts(&self) -> Vec<String> {
        self.confirm_prompts.borrow().clone()
    }

    /// Commands handed to failure analysis.
    pub fn failure_commands(&self) -> Vec<String> {
        self.failure_commands.borrow().clone()
    }

    /// Timeouts passed to synthesis and failure analysis, in call order.
    pub fn request_timeouts(&self) -> Vec<Duration> {
        self.request_timeouts.borrow().clone()
    }

    fn next<T>(
        &self,
        call: &'static str,
        queue: &RefCell<VecDeque<Result<T, Fault>>>,
    ) -> Result<T, Fault> {
        self.calls.borrow_mut().push(call);
        queue.borrow_mut().pop_front().unwrap_or_else(|| {
            Err(Fault::SynthesisFault(format!(
                "no scripted reply for {call}"
            )))
        })
    }
}

impl Assistant for ScriptedAssistant {
    fn synthesize_command(&self, _description: &str, timeout: Duration) -> Result<String, Fault> {
        self.request_timeouts.borrow_mut().push(timeout);
        self.next("synthesize_command", &self.commands)
    }

    fn synthesize_conditions(
        &self,
        _description: &str,
        _command: &str,
        timeout: Duration,
    ) -> Result<Vec<Condition>, Fault> {
        self.request_timeouts.borrow_mut().push(timeout);
        self.next("synthesize_conditions", &self.conditions)
    }

    fn analyze_failure(
        &self,
        report: &FailureReport<'_>,
        timeout: Duration,
    ) -> Result<String, Fault> {
        self.request_timeouts.borrow_mut().push(timeout);
        self.failure_commands
            .borrow_mut()
            .push(report.command.to_string());
        self.next("analyze_failure", &self.analyses)
    }

    fn plan_improvement(
        &self,
        _parent_name: &str,
        _description: &str,
    ) -> Result<CorrectivePlan, Fault> {
        self.next("plan_improvement", &self.plans)
    }

    fn confirm(&self, prompt: &str, _timeout: Duration) -> Result<Confirmation, Fault> {
        self.calls.borrow_mut().push("confirm");
        self.confirm_prompts.borrow_mut().push(prompt.to_string());
        self.confirmations
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| Fault::ActionFault("no scripted confirmation".to_string()))
    }
}

/// Sleeper that records requested waits instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}

pub type TestEngine = Engine<ScriptedAssistant, RecordingSleeper>;

/// Engine with default config, an empty script, and a recording sleeper.
pub fn engine() -> TestEngine {
    engine_with(|_| {})
}

/// Engine whose assistant is scripted by `script` before use.
pub fn engine_with(script: impl FnOnce(&ScriptedAssistant)) -> TestEngine {
    let assistant = ScriptedAssistant::default();
    script(&assistant);
    Engine::new(assistant, RecordingSleeper::default(), LoopConfig::default())
        .expect("test engine")
}

/// Create a task with default budget (3 attempts, 300s).
pub fn task(id: &str, command: &str, conditions: Vec<Condition>) -> Task {
    Task::new(id, format!("{id} name"), command, conditions)
}

/// Create a natural-language task with default budget.
pub fn natural_task(id: &str, description: &str) -> NaturalTask {
    NaturalTask::new(id, format!("{id} name"), description)
}

pub fn plan(name: &str, command: &str, conditions: Vec<Condition>) -> CorrectivePlan {
    CorrectivePlan {
        name: name.to_string(),
        description: format!("{name} description"),
        command: command.to_string(),
        conditions,
    }
}

/// Task state after one successful attempt that printed `output`.
pub fn state_with_output(output: &str) -> TaskState {
    TaskState {
        attempts: 1,
        last_output: Some(output.to_string()),
        last_error: None,
        previous_error: None,
    }
}
