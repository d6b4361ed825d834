//! In-memory log of condition evaluations, exportable as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::io::config::write_atomic;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind-specific evidence behind a verdict. Absent fields are not exported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// 1-based line of the first match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Diagnostics {
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationRecord {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
    #[serde(rename = "result")]
    pub satisfied: bool,
    #[serde(flatten)]
    pub diagnostics: Diagnostics,
}

impl EvaluationRecord {
    /// Record stamped with the local wall-clock time.
    pub fn now(
        kind: impl Into<String>,
        identifier: impl Into<String>,
        satisfied: bool,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            kind: kind.into(),
            identifier: identifier.into(),
            satisfied,
            diagnostics,
        }
    }
}

/// Evaluation records grouped by condition kind, in arrival order per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EvaluationHistory {
    by_kind: BTreeMap<String, Vec<EvaluationRecord>>,
}

impl EvaluationHistory {
    pub fn push(&mut self, record: EvaluationRecord) {
        self.by_kind
            .entry(record.kind.clone())
            .or_default()
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    pub fn kind(&self, kind: &str) -> &[EvaluationRecord] {
        self.by_kind.get(kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize evaluation history")
    }

    /// Write the history as pretty JSON (temp file + rename).
    pub fn export(&self, path: &Path) -> Result<()> {
        let mut buf = self.to_json_pretty()?;
        buf.push('\n');
        write_atomic(path, &buf, "json.tmp")?;
        info!(path = %path.display(), records = self.len(), "exported evaluation history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn groups_by_kind_and_flattens_diagnostics() {
        let mut history = EvaluationHistory::default();
        history.push(EvaluationRecord::now(
            "file_exists",
            "a.txt",
            false,
            Diagnostics::reason("not found"),
        ));
        history.push(EvaluationRecord::now(
            "test_command",
            "true",
            true,
            Diagnostics {
                return_code: Some(0),
                ..Diagnostics::default()
            },
        ));
        history.push(EvaluationRecord::now(
            "file_exists",
            "b.txt",
            true,
            Diagnostics {
                file_size: Some(3),
                ..Diagnostics::default()
            },
        ));

        assert_eq!(history.len(), 3);
        assert_eq!(history.kind("file_exists").len(), 2);
        assert!(history.kind("website_exists").is_empty());

        let value: Value = serde_json::from_str(&history.to_json_pretty().expect("json"))
            .expect("parse");
        let first = &value["file_exists"][0];
        assert_eq!(first["type"], "file_exists");
        assert_eq!(first["identifier"], "a.txt");
        assert_eq!(first["result"], false);
        assert_eq!(first["reason"], "not found");
        assert!(first.get("file_size").is_none());
        assert_eq!(value["test_command"][0]["return_code"], json!(0));
    }

    #[test]
    fn export_writes_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("history.json");
        let mut history = EvaluationHistory::default();
        history.push(EvaluationRecord::now(
            "output_contains",
            "done",
            true,
            Diagnostics::default(),
        ));
        history.export(&path).expect("export");

        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(value["output_contains"][0]["result"], true);
    }
}
