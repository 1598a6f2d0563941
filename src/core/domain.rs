use std::time::Duration;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{ERROR_PREFIX, NOT_READY_MSG};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RuntimeState {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    pub id: Uuid,
    pub source_code: String,
    pub stdin_payload: Vec<String>,
}

impl ExecutionRequest {
    pub fn new<S, I, L>(source_code: S, stdin_payload: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            source_code: source_code.into(),
            stdin_payload: stdin_payload.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits a multi-line input box into one payload line per text line.
    pub fn from_text(source_code: impl Into<String>, input: &str) -> Self {
        let lines: Vec<&str> = if input.is_empty() {
            Vec::new()
        } else {
            input.split('\n').collect()
        };
        Self::new(source_code, lines)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Ok(String),
    RuntimeError(String),
    GuardRejected(String),
    RuntimeNotReady,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExecutionResult {
    pub request_id: Uuid,
    pub status: ExecutionStatus,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, ExecutionStatus::Ok(_))
    }

    /// Text shown in the output pane for this result.
    pub fn render(&self) -> String {
        match &self.status {
            ExecutionStatus::Ok(output) => output.clone(),
            ExecutionStatus::RuntimeError(msg) => format!("{ERROR_PREFIX}{msg}"),
            ExecutionStatus::GuardRejected(reason) => reason.clone(),
            ExecutionStatus::RuntimeNotReady => NOT_READY_MSG.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Example {
    pub id: String,
    #[serde(default)]
    pub input: Vec<String>,
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TestVerdict {
    pub example_id: String,
    pub actual_output: String,
    pub passed: bool,
}

impl TestVerdict {
    pub fn judge(example: &Example, result: &ExecutionResult) -> Self {
        let (actual_output, passed) = match &result.status {
            ExecutionStatus::Ok(output) => {
                let passed = output.trim() == example.expected_output.trim();
                (output.clone(), passed)
            }
            _ => (result.render(), false),
        };

        Self {
            example_id: example.id.clone(),
            actual_output,
            passed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AggregateVerdict {
    pub all_passed: bool,
    pub failed_ids: Vec<String>,
}

impl AggregateVerdict {
    pub fn from_verdicts(verdicts: &[TestVerdict]) -> Self {
        let failed_ids: Vec<String> = verdicts
            .iter()
            .filter(|v| !v.passed)
            .map(|v| v.example_id.clone())
            .collect();

        Self {
            all_passed: failed_ids.is_empty(),
            failed_ids,
        }
    }

    pub fn summary(&self) -> String {
        if self.all_passed {
            "all examples passed".to_string()
        } else {
            format!("failed: {}", self.failed_ids.iter().join(", "))
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Evaluation {
    pub verdicts: Vec<TestVerdict>,
    pub aggregate: AggregateVerdict,
    pub evaluated_at: chrono::DateTime<chrono::Utc>,
}

impl Evaluation {
    pub fn new(verdicts: Vec<TestVerdict>) -> Self {
        let aggregate = AggregateVerdict::from_verdicts(&verdicts);
        Self {
            verdicts,
            aggregate,
            evaluated_at: chrono::Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EvaluationEvent {
    Started { total: usize },
    Verdict { index: usize, verdict: TestVerdict },
    Finished(Evaluation),
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
