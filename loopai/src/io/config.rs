//! Loop configuration stored in `loopai.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::core::backoff::WaitPolicy;
use crate::core::task::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::io::process::DEFAULT_OUTPUT_LIMIT_BYTES;

/// Default file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "loopai.toml";

/// Loop configuration (TOML).
///
/// Hand-edited; every field is optional and falls back to the built-in
/// defaults, so an empty file behaves exactly like no file at all.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    pub waits: WaitPolicy,

    /// Budget for natural-language tasks created from the command line.
    pub defaults: BudgetConfig,

    /// Budget for every corrective sub-task.
    pub corrective: BudgetConfig,

    pub assistant: AssistantConfig,

    /// Keep at most this many bytes of each command's stdout/stderr.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssistantConfig {
    /// Assistant argv; the rendered prompt is appended as the final argument
    /// (e.g. `["claude", "-p"]`).
    pub program: Vec<String>,

    /// Timeout for synthesis requests (command, conditions, analysis, plans).
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            program: vec!["claude".to_string(), "-p".to_string()],
            timeout_secs: 120,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            waits: WaitPolicy::default(),
            defaults: BudgetConfig::default(),
            corrective: BudgetConfig {
                max_retries: 2,
                timeout_secs: 120,
            },
            assistant: AssistantConfig::default(),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.defaults.timeout_secs == 0 {
            return Err(anyhow!("defaults.timeout_secs must be > 0"));
        }
        if self.corrective.timeout_secs == 0 {
            return Err(anyhow!("corrective.timeout_secs must be > 0"));
        }
        if self.assistant.timeout_secs == 0 {
            return Err(anyhow!("assistant.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.assistant.program.is_empty() || self.assistant.program[0].trim().is_empty() {
            return Err(anyhow!("assistant.program must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Write `contents` next to `path` first, then rename over it.
pub(crate) fn write_atomic(path: &Path, contents: &str, tmp_extension: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension(tmp_extension);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
