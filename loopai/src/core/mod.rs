//! Deterministic, pure logic shared by the executor.
//!
//! Core modules must be free of I/O side effects. They define the task and
//! condition model, the fault taxonomy, and the backoff decisions, and return
//! deterministic outputs suitable for tests.

pub mod backoff;
pub mod condition;
pub mod fault;
pub mod invariants;
pub mod task;
pub mod types;
