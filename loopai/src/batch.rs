//! Sequential batch runs and their statistics.

use serde::Serialize;
use tracing::info;

use crate::assistant::Assistant;
use crate::core::task::{NaturalTask, Task};
use crate::engine::Engine;
use crate::io::sleeper::Sleeper;

/// Outcome of one task in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStat {
    pub id: String,
    pub name: String,
    pub succeeded: bool,
    pub attempts: u32,
    pub subtasks: usize,
}

/// Aggregate counts over a batch, with per-task detail in declared order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Fraction of tasks that succeeded, `0.0` for an empty batch.
    pub success_rate: f64,
    pub tasks: Vec<TaskStat>,
}

impl BatchSummary {
    pub fn from_stats(tasks: Vec<TaskStat>) -> Self {
        let total = tasks.len();
        let succeeded = tasks.iter().filter(|t| t.succeeded).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        };
        Self {
            total,
            succeeded,
            failed: total - succeeded,
            success_rate,
            tasks,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

impl<A: Assistant, S: Sleeper> Engine<A, S> {
    /// Run every task in order through the plain retry loop.
    pub fn run_batch(&mut self, tasks: &mut [Task]) -> BatchSummary {
        let stats = tasks
            .iter_mut()
            .map(|task| {
                let succeeded = self.run_until_complete(task);
                TaskStat {
                    id: task.id.clone(),
                    name: task.name.clone(),
                    succeeded,
                    attempts: task.state.attempts,
                    subtasks: 0,
                }
            })
            .collect();
        let summary = BatchSummary::from_stats(stats);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch finished"
        );
        summary
    }

    /// Run every natural-language task in order.
    pub fn run_natural_batch(&mut self, tasks: &mut [NaturalTask]) -> BatchSummary {
        let stats = tasks
            .iter_mut()
            .map(|task| {
                let succeeded = self.run_natural_until_complete(task);
                TaskStat {
                    id: task.id.clone(),
                    name: task.name.clone(),
                    succeeded,
                    attempts: task.state.attempts,
                    subtasks: task.subtasks.len(),
                }
            })
            .collect();
        let summary = BatchSummary::from_stats(stats);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "natural batch finished"
        );
        summary
    }
}
