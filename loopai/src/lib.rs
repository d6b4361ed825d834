//! Completion-gated retry executor.
//!
//! A task is a shell command plus declarative completion conditions. The
//! executor runs the command, checks every condition, and retries with
//! cooldowns until the conditions hold or the attempt budget is spent.
//! Natural-language tasks have their command and conditions synthesized by an
//! assistant and may spawn corrective sub-tasks between attempts.
//!
//! - **[`core`]**: Pure, deterministic logic (task model, conditions, faults,
//!   backoff decisions, validation). No I/O.
//! - **[`io`]**: Side-effecting operations (processes, HTTP, files, sleeping).
//! - **[`assistant`]**: The assistant seam and its CLI backend.
//!
//! [`Engine`](engine::Engine) ties these together; the loops are implemented
//! in [`retry`], [`improve`], and [`batch`].

pub mod assistant;
pub mod batch;
pub mod core;
pub mod engine;
pub mod evaluate;
pub mod exit_codes;
pub mod improve;
pub mod io;
pub mod logging;
pub mod report;
pub mod retry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
