//! Closed fault taxonomy for the executor core.
//!
//! None of these ever escape the retry loops. Action faults are folded into a
//! failed [`ExecOutcome`](crate::core::types::ExecOutcome), condition faults into
//! a false verdict with a warning, and synthesis faults into either an aborted
//! task (initial command) or a safe default.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The command outlived its per-attempt timeout and was killed.
    #[error("command timed out after {timeout_secs}s")]
    ActionTimeout { timeout_secs: u64 },

    /// The command could not be run, or exited non-zero.
    #[error("command failed: {0}")]
    ActionFault(String),

    /// A known condition kind is missing one of its required parameters.
    #[error("{kind} condition is missing required parameter '{param}'")]
    ConditionParamMissing {
        kind: &'static str,
        param: &'static str,
    },

    /// The condition `type` is not one of the supported kinds.
    #[error("unknown condition type '{0}'")]
    ConditionKindUnknown(String),

    /// An HTTP probe or nested command failed while checking a condition.
    #[error("probe failed: {0}")]
    ProbeFault(String),

    /// The assistant could not be invoked or reported failure.
    #[error("assistant request failed: {0}")]
    SynthesisFault(String),

    /// The assistant answered, but the answer could not be parsed.
    #[error("assistant response malformed: {0}")]
    ResponseMalformed(String),
}

impl Fault {
    /// True for faults raised by the assistant collaborator.
    ///
    /// A malformed response is handled exactly like a failed request.
    pub fn is_synthesis(&self) -> bool {
        matches!(self, Fault::SynthesisFault(_) | Fault::ResponseMalformed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_parameter() {
        let fault = Fault::ConditionParamMissing {
            kind: "file_contains",
            param: "pattern",
        };
        assert_eq!(
            fault.to_string(),
            "file_contains condition is missing required parameter 'pattern'"
        );
    }

    #[test]
    fn malformed_responses_count_as_synthesis_faults() {
        assert!(Fault::ResponseMalformed("no json".to_string()).is_synthesis());
        assert!(Fault::SynthesisFault("exit 1".to_string()).is_synthesis());
        assert!(!Fault::ProbeFault("refused".to_string()).is_synthesis());
    }
}
