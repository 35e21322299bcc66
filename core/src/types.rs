use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::errors::CodeExecutionError;
use crate::runtime::Value;
use crate::trace::{LineMarker, Snapshot};

/// Default message of an aborted run without a caller-supplied reason
pub const DEFAULT_ABORT_REASON: &str = "Execution was aborted";

/// Soft interrupt raised by a host function. Ends the run as `Signaled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMSignal {
    pub message: String,
    /// Full source excerpt with the raising frames marked
    pub stack: String,
    /// Excerpt cut after the furthest marked line
    pub truncated_code: String,
    /// Script bindings in scope where the signal was raised
    pub variables: BTreeMap<String, Snapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Failed,
    Signaled,
    Aborted,
}

/// Result of one execution
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Completed {
        return_value: Value,
        /// Top-level declarations of the script
        rebindings: HashMap<String, Value>,
        line_trace: Vec<LineMarker>,
    },
    Failed {
        error: CodeExecutionError,
    },
    Signaled {
        signal: VMSignal,
    },
    Aborted {
        reason: String,
    },
}

impl ExecutionOutcome {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            ExecutionOutcome::Completed { .. } => OutcomeStatus::Completed,
            ExecutionOutcome::Failed { .. } => OutcomeStatus::Failed,
            ExecutionOutcome::Signaled { .. } => OutcomeStatus::Signaled,
            ExecutionOutcome::Aborted { .. } => OutcomeStatus::Aborted,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }

    pub fn return_value(&self) -> Option<&Value> {
        match self {
            ExecutionOutcome::Completed { return_value, .. } => Some(return_value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CodeExecutionError> {
        match self {
            ExecutionOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// JSON report of the outcome; live values are snapshotted
    pub fn to_json(&self) -> JsonValue {
        let status = serde_json::to_value(self.status()).unwrap_or(JsonValue::Null);
        let mut report = serde_json::Map::new();
        report.insert("status".into(), status);
        match self {
            ExecutionOutcome::Completed {
                return_value,
                rebindings,
                line_trace,
            } => {
                report.insert("return_value".into(), Snapshot::from(return_value).to_json());
                let sorted: BTreeMap<&String, JsonValue> = rebindings
                    .iter()
                    .map(|(name, value)| (name, Snapshot::from(value).to_json()))
                    .collect();
                report.insert("rebindings".into(), serde_json::to_value(sorted).unwrap_or_default());
                report.insert("line_trace".into(), serde_json::to_value(line_trace).unwrap_or_default());
            }
            ExecutionOutcome::Failed { error } => {
                report.insert("error".into(), serde_json::to_value(error).unwrap_or_default());
            }
            ExecutionOutcome::Signaled { signal } => {
                report.insert("signal".into(), serde_json::to_value(signal).unwrap_or_default());
            }
            ExecutionOutcome::Aborted { reason } => {
                report.insert("reason".into(), JsonValue::String(reason.clone()));
            }
        }
        JsonValue::Object(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_aborted_report() {
        let outcome = ExecutionOutcome::Aborted {
            reason: DEFAULT_ABORT_REASON.into(),
        };
        assert_eq!(outcome.status(), OutcomeStatus::Aborted);
        assert_eq!(
            outcome.to_json(),
            json!({"status": "aborted", "reason": "Execution was aborted"})
        );
    }

    #[test]
    fn test_completed_report_snapshots_values() {
        let outcome = ExecutionOutcome::Completed {
            return_value: Value::object([("a", Value::from(1))]),
            rebindings: HashMap::new(),
            line_trace: vec![LineMarker { line: 1, depth: 0 }],
        };
        let report = outcome.to_json();
        assert_eq!(report["return_value"], json!({"a": 1}));
        assert_eq!(report["line_trace"], json!([{"line": 1, "depth": 0}]));
    }
}
