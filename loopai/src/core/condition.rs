//! Completion conditions and their wire format.
//!
//! A condition record on disk is `{"type": <kind>, ...params}`. Records are
//! mapped onto a closed enum at load time; unrecognized kinds are kept as
//! [`Condition::Unknown`] and absent parameters stay `None`, so both are
//! reported when the condition is evaluated instead of failing the whole file.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::fault::Fault;

pub const DEFAULT_WEBSITE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TEST_COMMAND_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCondition", into = "RawCondition")]
pub enum Condition {
    FileExists {
        path: Option<String>,
    },
    OutputContains {
        pattern: Option<String>,
    },
    OutputNotContains {
        pattern: Option<String>,
    },
    FileContains {
        path: Option<String>,
        pattern: Option<String>,
    },
    WebsiteExists {
        url: Option<String>,
        timeout_secs: Option<u64>,
    },
    TestCommand {
        command: Option<String>,
        timeout_secs: Option<u64>,
    },
    /// Asks the assistant to confirm; satisfied when it answers `OK`.
    AssistantConfirmation {
        prompt: Option<String>,
        timeout_secs: Option<u64>,
    },
    Unknown {
        kind: Option<String>,
        params: Map<String, Value>,
    },
}

impl Condition {
    pub fn output_contains(pattern: impl Into<String>) -> Self {
        Condition::OutputContains {
            pattern: Some(pattern.into()),
        }
    }

    pub fn output_not_contains(pattern: impl Into<String>) -> Self {
        Condition::OutputNotContains {
            pattern: Some(pattern.into()),
        }
    }

    pub fn file_exists(path: impl Into<String>) -> Self {
        Condition::FileExists {
            path: Some(path.into()),
        }
    }

    pub fn file_contains(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::FileContains {
            path: Some(path.into()),
            pattern: Some(pattern.into()),
        }
    }

    pub fn website_exists(url: impl Into<String>, timeout_secs: Option<u64>) -> Self {
        Condition::WebsiteExists {
            url: Some(url.into()),
            timeout_secs,
        }
    }

    pub fn test_command(command: impl Into<String>, timeout_secs: Option<u64>) -> Self {
        Condition::TestCommand {
            command: Some(command.into()),
            timeout_secs,
        }
    }

    pub fn confirmation(prompt: impl Into<String>, timeout_secs: Option<u64>) -> Self {
        Condition::AssistantConfirmation {
            prompt: Some(prompt.into()),
            timeout_secs,
        }
    }

    /// The wire `type` string (or the unrecognized one as written).
    pub fn kind(&self) -> &str {
        match self {
            Condition::FileExists { .. } => "file_exists",
            Condition::OutputContains { .. } => "output_contains",
            Condition::OutputNotContains { .. } => "output_not_contains",
            Condition::FileContains { .. } => "file_contains",
            Condition::WebsiteExists { .. } => "website_exists",
            Condition::TestCommand { .. } => "test_command",
            Condition::AssistantConfirmation { .. } => "claude_code_confirmation",
            Condition::Unknown { kind, .. } => kind.as_deref().unwrap_or("<missing>"),
        }
    }

    /// Short human-facing key for history records and summaries.
    pub fn identifier(&self) -> String {
        fn show(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("")
        }
        match self {
            Condition::FileExists { path } => show(path).to_string(),
            Condition::OutputContains { pattern } | Condition::OutputNotContains { pattern } => {
                show(pattern).to_string()
            }
            Condition::FileContains { path, pattern } => {
                format!("{}:{}", show(path), show(pattern))
            }
            Condition::WebsiteExists { url, .. } => show(url).to_string(),
            Condition::TestCommand { command, .. } => show(command).to_string(),
            Condition::AssistantConfirmation { prompt, .. } => show(prompt).to_string(),
            Condition::Unknown { kind, .. } => kind.clone().unwrap_or_default(),
        }
    }

    /// Effective timeout for kinds that perform bounded I/O.
    pub fn timeout(&self) -> Option<Duration> {
        let secs = match self {
            Condition::WebsiteExists { timeout_secs, .. } => {
                timeout_secs.unwrap_or(DEFAULT_WEBSITE_TIMEOUT_SECS)
            }
            Condition::TestCommand { timeout_secs, .. } => {
                timeout_secs.unwrap_or(DEFAULT_TEST_COMMAND_TIMEOUT_SECS)
            }
            Condition::AssistantConfirmation { timeout_secs, .. } => {
                timeout_secs.unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS)
            }
            _ => return None,
        };
        Some(Duration::from_secs(secs))
    }

    /// First structural problem that makes this condition unevaluable.
    pub fn problem(&self) -> Option<Fault> {
        let missing = |kind, param| {
            Some(Fault::ConditionParamMissing {
                kind,
                param,
            })
        };
        match self {
            Condition::FileExists { path } if is_blank(path) => missing("file_exists", "path"),
            Condition::OutputContains { pattern: None } => missing("output_contains", "pattern"),
            Condition::OutputNotContains { pattern: None } => {
                missing("output_not_contains", "pattern")
            }
            Condition::FileContains { path, .. } if is_blank(path) => {
                missing("file_contains", "path")
            }
            Condition::FileContains { pattern: None, .. } => missing("file_contains", "pattern"),
            Condition::WebsiteExists { url, .. } if is_blank(url) => {
                missing("website_exists", "url")
            }
            Condition::TestCommand { command, .. } if is_blank(command) => {
                missing("test_command", "command")
            }
            Condition::AssistantConfirmation { prompt, .. } if is_blank(prompt) => {
                missing("claude_code_confirmation", "prompt")
            }
            Condition::Unknown { kind, .. } => Some(Fault::ConditionKindUnknown(
                kind.clone().unwrap_or_else(|| "<missing>".to_string()),
            )),
            _ => None,
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Loose on-disk shape: a `type` tag plus arbitrary keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCondition {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl From<RawCondition> for Condition {
    fn from(raw: RawCondition) -> Self {
        let text = |key: &str| {
            raw.params
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let timeout_secs = raw.params.get("timeout").and_then(Value::as_u64);
        match raw.kind.as_deref() {
            Some("file_exists") => Condition::FileExists { path: text("path") },
            Some("output_contains") => Condition::OutputContains {
                pattern: text("pattern"),
            },
            Some("output_not_contains") => Condition::OutputNotContains {
                pattern: text("pattern"),
            },
            Some("file_contains") => Condition::FileContains {
                path: text("path"),
                pattern: text("pattern"),
            },
            Some("website_exists") => Condition::WebsiteExists {
                url: text("url"),
                timeout_secs,
            },
            Some("test_command") => Condition::TestCommand {
                command: text("command"),
                timeout_secs,
            },
            Some("claude_code_confirmation") => Condition::AssistantConfirmation {
                prompt: text("prompt"),
                timeout_secs,
            },
            _ => Condition::Unknown {
                kind: raw.kind,
                params: raw.params,
            },
        }
    }
}

impl From<Condition> for RawCondition {
    fn from(condition: Condition) -> Self {
        let kind = condition.kind().to_string();
        let mut params = Map::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                params.insert(key.to_string(), Value::String(value));
            }
        };
        let mut timeout = None;
        match condition {
            Condition::FileExists { path } => put("path", path),
            Condition::OutputContains { pattern } | Condition::OutputNotContains { pattern } => {
                put("pattern", pattern);
            }
            Condition::FileContains { path, pattern } => {
                put("path", path);
                put("pattern", pattern);
            }
            Condition::WebsiteExists { url, timeout_secs } => {
                put("url", url);
                timeout = timeout_secs;
            }
            Condition::TestCommand {
                command,
                timeout_secs,
            } => {
                put("command", command);
                timeout = timeout_secs;
            }
            Condition::AssistantConfirmation {
                prompt,
                timeout_secs,
            } => {
                put("prompt", prompt);
                timeout = timeout_secs;
            }
            Condition::Unknown { kind, params } => return RawCondition { kind, params },
        }
        if let Some(secs) = timeout {
            params.insert("timeout".to_string(), Value::from(secs));
        }
        RawCondition {
            kind: Some(kind),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Condition {
        serde_json::from_value(value).expect("condition")
    }

    #[test]
    fn parses_known_kinds_with_optional_timeout() {
        let condition = parse(json!({"type": "website_exists", "url": "http://x", "timeout": 3}));
        assert_eq!(
            condition,
            Condition::website_exists("http://x", Some(3))
        );
        assert_eq!(condition.timeout(), Some(Duration::from_secs(3)));

        let condition = parse(json!({"type": "test_command", "command": "true"}));
        assert_eq!(condition.timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn unknown_kind_is_preserved_for_round_trip() {
        let raw = json!({"type": "smoke_signal", "color": "white"});
        let condition = parse(raw.clone());
        assert_eq!(condition.kind(), "smoke_signal");
        assert_eq!(
            condition.problem(),
            Some(Fault::ConditionKindUnknown("smoke_signal".to_string()))
        );
        assert_eq!(serde_json::to_value(&condition).expect("serialize"), raw);
    }

    #[test]
    fn missing_params_are_reported_not_rejected() {
        let condition = parse(json!({"type": "file_contains", "path": "notes.txt"}));
        assert_eq!(
            condition.problem(),
            Some(Fault::ConditionParamMissing {
                kind: "file_contains",
                param: "pattern"
            })
        );

        let condition = parse(json!({"type": "test_command", "command": "   "}));
        assert!(matches!(
            condition.problem(),
            Some(Fault::ConditionParamMissing { param: "command", .. })
        ));
    }

    #[test]
    fn empty_pattern_is_a_valid_parameter() {
        let condition = parse(json!({"type": "output_contains", "pattern": ""}));
        assert_eq!(condition.problem(), None);
    }

    #[test]
    fn serializes_in_wire_shape() {
        let value = serde_json::to_value(Condition::file_contains("a.txt", "hello"))
            .expect("serialize");
        assert_eq!(
            value,
            json!({"type": "file_contains", "path": "a.txt", "pattern": "hello"})
        );
    }
}
