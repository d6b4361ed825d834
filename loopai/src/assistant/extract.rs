//! Pull structured answers out of free-form assistant replies.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::core::condition::Condition;
use crate::core::fault::Fault;
use crate::core::task::CorrectivePlan;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("fenced block regex")
});

/// First line that looks like a command: non-empty, not a fence, not a comment.
pub fn command_line(reply: &str) -> Result<String, Fault> {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```") && !line.starts_with('#'))
        .map(strip_inline_code)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Fault::ResponseMalformed("reply contains no command".to_string()))
}

fn strip_inline_code(line: &str) -> &str {
    match line.strip_prefix('`').and_then(|l| l.strip_suffix('`')) {
        Some(inner) => inner.trim(),
        None => line,
    }
}

/// Non-empty list of condition records.
pub fn conditions(reply: &str) -> Result<Vec<Condition>, Fault> {
    let conditions: Vec<Condition> = json_payload(reply, '[', ']')?;
    if conditions.is_empty() {
        return Err(Fault::ResponseMalformed(
            "reply contains an empty condition list".to_string(),
        ));
    }
    Ok(conditions)
}

pub fn plan(reply: &str) -> Result<CorrectivePlan, Fault> {
    json_payload(reply, '{', '}')
}

/// Decode the JSON value delimited by `open`/`close`.
///
/// A fenced block whose body starts with `open` wins; otherwise the span from
/// the first `open` to the last `close` in the reply is used.
fn json_payload<T: DeserializeOwned>(reply: &str, open: char, close: char) -> Result<T, Fault> {
    let fenced = FENCED_BLOCK
        .captures_iter(reply)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str().trim())
        .find(|body| body.starts_with(open));

    let payload = match fenced {
        Some(body) => body,
        None => {
            let start = reply.find(open);
            let end = reply.rfind(close);
            match (start, end) {
                (Some(start), Some(end)) if start < end => &reply[start..=end],
                _ => {
                    return Err(Fault::ResponseMalformed(format!(
                        "reply contains no JSON {}",
                        if open == '[' { "array" } else { "object" }
                    )));
                }
            }
        }
    };

    serde_json::from_str(payload).map_err(|e| Fault::ResponseMalformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_skips_fences_and_comments() {
        let reply = "# Generated command\n```sh\nls -la /tmp\n```\n";
        assert_eq!(command_line(reply).expect("command"), "ls -la /tmp");
        assert_eq!(command_line("  `echo hi`  ").expect("command"), "echo hi");
    }

    #[test]
    fn empty_reply_has_no_command() {
        assert!(matches!(
            command_line("\n```\n```\n"),
            Err(Fault::ResponseMalformed(_))
        ));
    }

    #[test]
    fn conditions_from_fenced_json() {
        let reply = "Here you go:\n```json\n[{\"type\": \"file_exists\", \"path\": \"out.txt\"}]\n```\nGood luck.";
        assert_eq!(
            conditions(reply).expect("conditions"),
            vec![Condition::file_exists("out.txt")]
        );
    }

    #[test]
    fn conditions_from_bare_array_in_prose() {
        let reply = "Conditions: [{\"type\": \"output_contains\", \"pattern\": \"ok\"}] as requested";
        assert_eq!(
            conditions(reply).expect("conditions"),
            vec![Condition::output_contains("ok")]
        );
    }

    #[test]
    fn malformed_or_empty_conditions_are_faults() {
        assert!(matches!(
            conditions("no json here"),
            Err(Fault::ResponseMalformed(_))
        ));
        assert!(matches!(
            conditions("[{\"type\": "),
            Err(Fault::ResponseMalformed(_))
        ));
        assert!(matches!(conditions("[]"), Err(Fault::ResponseMalformed(_))));
    }

    #[test]
    fn plan_with_missing_optional_fields() {
        let reply = "```json\n{\"name\": \"Install deps\", \"command\": \"npm ci\"}\n```";
        let plan = plan(reply).expect("plan");
        assert_eq!(plan.name, "Install deps");
        assert_eq!(plan.command, "npm ci");
        assert!(plan.conditions.is_empty());
    }
}
