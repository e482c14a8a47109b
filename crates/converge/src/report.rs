//! Outcome reporting at the invocation boundary.
//!
//! [`Outcome`] is the stable `{changed, facts, error{kind, message}}`
//! shape handed to front-ends, whatever drives the engine.

use serde::Serialize;

use crate::error::{Error, ErrorKind};
use crate::types::{Facts, ReconciliationResult};

/// Serializable error of an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorInfo {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of one reconciliation as reported outward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub changed: bool,
    pub facts: Facts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Outcome {
    /// Outcome of an error raised before any reconciliation started.
    pub fn from_error(err: &Error) -> Self {
        Self {
            changed: false,
            facts: Facts::new(),
            error: Some(err.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<ReconciliationResult> for Outcome {
    fn from(result: ReconciliationResult) -> Self {
        Self {
            changed: result.changed,
            facts: result.facts,
            error: result.error.as_ref().map(ErrorInfo::from),
        }
    }
}

impl From<&ReconciliationResult> for Outcome {
    fn from(result: &ReconciliationResult) -> Self {
        Self {
            changed: result.changed,
            facts: result.facts.clone(),
            error: result.error.as_ref().map(ErrorInfo::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_omits_error() {
        let mut facts = Facts::new();
        facts.insert("sacloud_server_resource_id".to_string(), "123".into());
        let outcome = Outcome::from(ReconciliationResult::changed(facts));

        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "changed": true,
                "facts": { "sacloud_server_resource_id": "123" }
            })
        );
    }

    #[test]
    fn test_failure_carries_kind_and_message() {
        let result = ReconciliationResult::failed(
            false,
            Facts::new(),
            Error::validation("missing required arguments: vrid"),
        );
        let outcome = Outcome::from(&result);

        assert!(!outcome.is_success());
        assert_eq!(
            serde_json::to_value(&outcome).unwrap()["error"],
            json!({
                "kind": "ValidationError",
                "message": "invalid parameters: missing required arguments: vrid"
            })
        );
    }
}
