//! Side-effecting helpers: processes, HTTP, files, clocks.

pub mod config;
pub mod history;
pub mod probe;
pub mod process;
pub mod sleeper;
pub mod task_file;
