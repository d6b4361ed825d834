//! Stable exit codes for `loopai` commands.

/// Every task completed, every condition held, or the file is valid.
pub const OK: i32 = 0;
/// A task exhausted its attempts or a condition did not hold.
pub const INCOMPLETE: i32 = 1;
/// Invalid input (task file, config, arguments) or a runtime error.
pub const INVALID: i32 = 2;
